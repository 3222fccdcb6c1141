use std::collections::HashSet;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    models::{MovieSuggestion, TmdbMovie},
    services::catalog::CatalogFeed,
    state::AppState,
};

const SUGGESTION_LIMIT: usize = 8;
const FEATURED_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Handler for search autocomplete suggestions
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Value>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(Json(json!({ "results": [] })));
    }

    let movies = state.catalog.search(q).await?;
    let results: Vec<MovieSuggestion> = movies
        .iter()
        .filter_map(|movie| {
            movie.id.map(|id| MovieSuggestion {
                id,
                title: movie.title.clone(),
                poster_path: movie.poster_path.clone(),
                vote_average: movie.vote_average,
                release_date: movie.release_date.clone(),
            })
        })
        .take(SUGGESTION_LIMIT)
        .collect();

    Ok(Json(json!({ "results": results })))
}

/// Handler for the featured carousel: popular and now-playing first pages,
/// deduplicated, image-bearing entries only.
pub async fn featured(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let popular = state.catalog.feed_page(CatalogFeed::Popular, 1).await?;
    let now_playing = state.catalog.feed_page(CatalogFeed::NowPlaying, 1).await?;

    let results = merge_featured(popular.into_iter().chain(now_playing), FEATURED_LIMIT);
    Ok(Json(json!({ "results": results })))
}

pub(crate) fn merge_featured(
    movies: impl IntoIterator<Item = TmdbMovie>,
    limit: usize,
) -> Vec<TmdbMovie> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for movie in movies {
        let Some(id) = movie.id else { continue };
        if !movie.has_image() || !seen.insert(id) {
            continue;
        }
        results.push(movie);
        if results.len() >= limit {
            break;
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(id: Option<i32>, backdrop: Option<&str>) -> TmdbMovie {
        TmdbMovie {
            id,
            title: None,
            poster_path: None,
            backdrop_path: backdrop.map(str::to_string),
            vote_average: None,
            release_date: None,
        }
    }

    #[test]
    fn test_merge_featured_dedupes_by_id() {
        let movies = vec![
            movie(Some(1), Some("/a.jpg")),
            movie(Some(1), Some("/b.jpg")),
            movie(Some(2), Some("/c.jpg")),
        ];
        let results = merge_featured(movies, 20);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].backdrop_path.as_deref(), Some("/a.jpg"));
    }

    #[test]
    fn test_merge_featured_filters_imageless_and_caps() {
        let mut movies = vec![movie(Some(99), None)];
        movies.extend((1..=30).map(|i| movie(Some(i), Some("/x.jpg"))));

        let results = merge_featured(movies, 20);
        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|m| m.id != Some(99)));
    }
}
