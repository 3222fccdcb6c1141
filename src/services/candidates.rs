/// Candidate pool: the bounded set of movies eligible for recommendation.
///
/// Refreshed from four catalog feeds on a one-hour TTL and mirrored into an
/// in-process matrix for scoring. The snapshot is the only shared mutable
/// in-process state; one async mutex covers check-refresh-materialize so
/// concurrent requests never trigger duplicate catalog fetches or duplicate
/// embedding batches.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ndarray::Array2;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::{
    error::AppResult,
    models::{CandidateMovie, TmdbMovie},
    services::{
        catalog::{CatalogFeed, MovieCatalog},
        embedding::EmbeddingService,
    },
};

pub const CANDIDATE_TTL: Duration = Duration::from_secs(60 * 60);

/// How many of the most-recently-updated candidate rows back the matrix.
pub const DEFAULT_POOL_LIMIT: i64 = 240;

const FEED_PAGES: [(CatalogFeed, u32); 4] = [
    (CatalogFeed::Popular, 3),
    (CatalogFeed::TopRated, 3),
    (CatalogFeed::TrendingWeek, 3),
    (CatalogFeed::NowPlaying, 2),
];

/// Immutable candidate snapshot ready for scoring.
///
/// `ids` and the rows of `matrix` are index-aligned; ids lacking an
/// embedding appear in neither.
pub struct CandidateSnapshot {
    pub ids: Vec<i32>,
    pub meta: HashMap<i32, CandidateMovie>,
    pub matrix: Array2<f32>,
}

struct CachedSnapshot {
    built_at: Instant,
    snapshot: Arc<CandidateSnapshot>,
}

pub struct CandidatePool {
    pool: PgPool,
    catalog: Arc<dyn MovieCatalog>,
    embeddings: Arc<EmbeddingService>,
    snapshot: Mutex<Option<CachedSnapshot>>,
}

/// Merges raw feed entries by movie id, last seen wins. Entries without an
/// id or without any displayable image asset are dropped.
pub(crate) fn merge_candidates(entries: &[TmdbMovie]) -> HashMap<i32, CandidateMovie> {
    let mut merged = HashMap::new();
    for movie in entries {
        let Some(id) = movie.id else { continue };
        if !movie.has_image() {
            continue;
        }
        merged.insert(id, CandidateMovie::from(movie));
    }
    merged
}

/// Stacks the vectors for `ids` row-wise, keeping the kept-id list and the
/// matrix index-aligned. Ids without a vector are dropped from both.
pub(crate) fn stack_embeddings(
    ids: &[i32],
    embeddings: &HashMap<i32, Vec<f32>>,
) -> (Vec<i32>, Array2<f32>) {
    let mut kept = Vec::new();
    let mut rows: Vec<f32> = Vec::new();
    let mut dim = 0;

    for &movie_id in ids {
        if let Some(vector) = embeddings.get(&movie_id) {
            dim = vector.len();
            kept.push(movie_id);
            rows.extend_from_slice(vector);
        }
    }

    let matrix = Array2::from_shape_vec((kept.len(), dim), rows)
        .unwrap_or_else(|_| Array2::zeros((0, dim)));
    (kept, matrix)
}

impl CandidatePool {
    pub fn new(pool: PgPool, catalog: Arc<dyn MovieCatalog>, embeddings: Arc<EmbeddingService>) -> Self {
        Self {
            pool,
            catalog,
            embeddings,
            snapshot: Mutex::new(None),
        }
    }

    /// Repopulates `candidate_movies` from the catalog feeds.
    ///
    /// No-op unless forced or the newest persisted row is older than the
    /// TTL. Each page is fetched independently; a failed page is skipped.
    /// Rows are upserted, never deleted, so stale entries age out of the
    /// most-recently-updated read instead of being removed.
    pub async fn refresh(&self, force: bool) -> AppResult<()> {
        let last: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(updated_at) FROM candidate_movies")
                .fetch_one(&self.pool)
                .await?;

        let fresh = last.is_some_and(|t| {
            Utc::now().signed_duration_since(t).num_seconds() < CANDIDATE_TTL.as_secs() as i64
        });
        if !force && fresh {
            return Ok(());
        }

        let mut entries = Vec::new();
        for (feed, pages) in FEED_PAGES {
            for page in 1..=pages {
                match self.catalog.feed_page(feed, page).await {
                    Ok(mut batch) => entries.append(&mut batch),
                    Err(e) => {
                        tracing::warn!(?feed, page, error = %e, "Skipping failed catalog feed page");
                    }
                }
            }
        }

        let merged = merge_candidates(&entries);
        let now = Utc::now();
        for candidate in merged.values() {
            sqlx::query(
                r#"
                INSERT INTO candidate_movies(movie_id, title, poster_path, vote_average, release_date, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (movie_id)
                DO UPDATE SET title = EXCLUDED.title,
                              poster_path = EXCLUDED.poster_path,
                              vote_average = EXCLUDED.vote_average,
                              release_date = EXCLUDED.release_date,
                              updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(candidate.movie_id)
            .bind(&candidate.title)
            .bind(&candidate.poster_path)
            .bind(candidate.vote_average)
            .bind(&candidate.release_date)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        tracing::info!(candidates = merged.len(), "Candidate pool refreshed");
        Ok(())
    }

    /// Returns the scoring snapshot, rebuilding it when forced or past the
    /// TTL. Exactly one refresh proceeds at a time; concurrent callers block
    /// on the mutex and then serve the same fresh snapshot.
    pub async fn materialize(&self, force: bool, limit: i64) -> AppResult<Arc<CandidateSnapshot>> {
        let mut guard = self.snapshot.lock().await;

        if !force {
            if let Some(cached) = guard.as_ref() {
                if cached.built_at.elapsed() < CANDIDATE_TTL {
                    return Ok(Arc::clone(&cached.snapshot));
                }
            }
        }

        self.refresh(force).await?;

        let rows: Vec<CandidateMovie> = sqlx::query_as(
            r#"
            SELECT movie_id, title, poster_path, vote_average, release_date
            FROM candidate_movies
            ORDER BY updated_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i32> = rows.iter().map(|row| row.movie_id).collect();
        let meta: HashMap<i32, CandidateMovie> =
            rows.into_iter().map(|row| (row.movie_id, row)).collect();

        let embeddings = self.embeddings.ensure_embeddings(&ids).await?;
        let (ids, matrix) = stack_embeddings(&ids, &embeddings);

        tracing::debug!(candidates = ids.len(), "Candidate snapshot materialized");

        let snapshot = Arc::new(CandidateSnapshot { ids, meta, matrix });
        *guard = Some(CachedSnapshot {
            built_at: Instant::now(),
            snapshot: Arc::clone(&snapshot),
        });
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(id: Option<i32>, title: &str, poster: Option<&str>) -> TmdbMovie {
        TmdbMovie {
            id,
            title: Some(title.to_string()),
            poster_path: poster.map(str::to_string),
            backdrop_path: None,
            vote_average: None,
            release_date: None,
        }
    }

    #[test]
    fn test_merge_candidates_last_seen_wins() {
        let entries = vec![
            movie(Some(1), "Old Title", Some("/a.jpg")),
            movie(Some(1), "New Title", Some("/b.jpg")),
        ];
        let merged = merge_candidates(&entries);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[&1].title.as_deref(), Some("New Title"));
        assert_eq!(merged[&1].poster_path.as_deref(), Some("/b.jpg"));
    }

    #[test]
    fn test_merge_candidates_drops_imageless_entries() {
        let entries = vec![
            movie(Some(1), "Visible", Some("/a.jpg")),
            movie(Some(2), "Invisible", None),
        ];
        let merged = merge_candidates(&entries);
        assert!(merged.contains_key(&1));
        assert!(!merged.contains_key(&2));
    }

    #[test]
    fn test_merge_candidates_requires_id() {
        let entries = vec![movie(None, "No Id", Some("/a.jpg"))];
        assert!(merge_candidates(&entries).is_empty());
    }

    #[test]
    fn test_stack_embeddings_drops_ids_without_vectors() {
        let ids = vec![10, 20, 30];
        let mut embeddings = HashMap::new();
        embeddings.insert(10, vec![1.0, 0.0]);
        embeddings.insert(30, vec![0.0, 1.0]);

        let (kept, matrix) = stack_embeddings(&ids, &embeddings);
        assert_eq!(kept, vec![10, 30]);
        assert_eq!(matrix.nrows(), kept.len());
        assert_eq!(matrix.ncols(), 2);
        assert_eq!(matrix.row(0).to_vec(), vec![1.0, 0.0]);
        assert_eq!(matrix.row(1).to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_stack_embeddings_empty_input() {
        let (kept, matrix) = stack_embeddings(&[], &HashMap::new());
        assert!(kept.is_empty());
        assert_eq!(matrix.nrows(), 0);
    }
}
