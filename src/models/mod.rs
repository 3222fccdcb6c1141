use serde::{Deserialize, Serialize};

/// Movie entry as returned by TMDB feed, search and discover endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbMovie {
    pub id: Option<i32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f32>,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl TmdbMovie {
    /// Whether the entry carries at least one displayable image asset
    pub fn has_image(&self) -> bool {
        self.poster_path.is_some() || self.backdrop_path.is_some()
    }
}

/// One page of a paginated TMDB listing
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage {
    #[serde(default)]
    pub results: Vec<TmdbMovie>,
}

/// Genre entry embedded in a movie detail response
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenre {
    #[serde(default)]
    pub name: Option<String>,
}

/// Full movie record from GET /movie/{id}, the source text for embeddings
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovieDetails {
    pub id: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
}

/// Display metadata snapshot persisted per candidate movie
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CandidateMovie {
    pub movie_id: i32,
    pub title: Option<String>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f32>,
    pub release_date: Option<String>,
}

impl From<&TmdbMovie> for CandidateMovie {
    fn from(movie: &TmdbMovie) -> Self {
        Self {
            movie_id: movie.id.unwrap_or_default(),
            title: movie.title.clone(),
            poster_path: movie.poster_path.clone(),
            vote_average: movie.vote_average,
            release_date: movie.release_date.clone(),
        }
    }
}

/// Trimmed search suggestion returned by the autocomplete endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MovieSuggestion {
    pub id: i32,
    pub title: Option<String>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f32>,
    pub release_date: Option<String>,
}

/// One ranked personalization result
#[derive(Debug, Clone, Serialize)]
pub struct RecommendedMovie {
    pub id: i32,
    pub title: Option<String>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f32>,
    pub release_date: Option<String>,
    /// Cosine similarity against the user profile, rounded to 4 decimals
    pub sim: f64,
}

/// Outcome of a personalization request
///
/// Every branch of the recommender resolves to one of these; none of them is
/// an error. `EmbeddingsUnavailable` is the degraded-capability case and maps
/// to a 503 at the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationNote {
    FromCache,
    Fresh,
    NoSignals,
    NoCandidates,
    EmbeddingsUnavailable,
}

/// Like/dislike rating value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingValue {
    Like,
    Dislike,
}

impl RatingValue {
    pub fn as_i16(self) -> i16 {
        match self {
            RatingValue::Like => 1,
            RatingValue::Dislike => -1,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(RatingValue::Like),
            -1 => Some(RatingValue::Dislike),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmdb_movie_has_image() {
        let with_poster = TmdbMovie {
            id: Some(1),
            title: None,
            poster_path: Some("/p.jpg".to_string()),
            backdrop_path: None,
            vote_average: None,
            release_date: None,
        };
        assert!(with_poster.has_image());

        let with_backdrop = TmdbMovie {
            poster_path: None,
            backdrop_path: Some("/b.jpg".to_string()),
            ..with_poster.clone()
        };
        assert!(with_backdrop.has_image());

        let bare = TmdbMovie {
            poster_path: None,
            backdrop_path: None,
            ..with_poster
        };
        assert!(!bare.has_image());
    }

    #[test]
    fn test_tmdb_page_deserialization_defaults() {
        let page: TmdbPage = serde_json::from_str(r#"{"page": 1}"#).unwrap();
        assert!(page.results.is_empty());

        let page: TmdbPage = serde_json::from_str(
            r#"{"results": [{"id": 27205, "title": "Inception", "poster_path": "/x.jpg", "vote_average": 8.4, "release_date": "2010-07-15"}]}"#,
        )
        .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].id, Some(27205));
        assert_eq!(page.results[0].title.as_deref(), Some("Inception"));
    }

    #[test]
    fn test_rating_value_round_trip() {
        assert_eq!(RatingValue::Like.as_i16(), 1);
        assert_eq!(RatingValue::Dislike.as_i16(), -1);
        assert_eq!(RatingValue::from_i16(1), Some(RatingValue::Like));
        assert_eq!(RatingValue::from_i16(-1), Some(RatingValue::Dislike));
        assert_eq!(RatingValue::from_i16(0), None);
    }

    #[test]
    fn test_rating_value_serde() {
        assert_eq!(
            serde_json::to_string(&RatingValue::Like).unwrap(),
            "\"like\""
        );
        let parsed: RatingValue = serde_json::from_str("\"dislike\"").unwrap();
        assert_eq!(parsed, RatingValue::Dislike);
    }

    #[test]
    fn test_recommendation_note_serde() {
        assert_eq!(
            serde_json::to_string(&RecommendationNote::FromCache).unwrap(),
            "\"from_cache\""
        );
        assert_eq!(
            serde_json::to_string(&RecommendationNote::EmbeddingsUnavailable).unwrap(),
            "\"embeddings_unavailable\""
        );
    }
}
