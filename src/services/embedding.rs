/// Sentence-embedding provider and the persistent movie-embedding cache.
///
/// The fastembed model (all-MiniLM-L6-v2) is loaded once per process on
/// first use. A load failure is cached for the process lifetime and turns
/// every later embedding request into `EmbeddingsUnavailable`; the process
/// itself keeps serving. Inference is CPU-bound, so every embed call runs
/// under `spawn_blocking`.
///
/// Cached embeddings are keyed by movie id plus a content hash of the source
/// text, so a catalog-side edit to title, overview or genres triggers
/// recomputation on the next request.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::OnceCell;

use crate::{
    error::{AppError, AppResult},
    models::TmdbMovieDetails,
    services::{catalog::MovieCatalog, l2_normalize, sha1_hex},
};

/// Output dimension of all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

pub struct EmbeddingService {
    pool: PgPool,
    catalog: Arc<dyn MovieCatalog>,
    model: OnceCell<Option<Arc<fastembed::TextEmbedding>>>,
}

#[derive(Debug, sqlx::FromRow)]
struct StoredEmbedding {
    movie_id: i32,
    text_hash: Option<String>,
    embedding: Option<Vec<f32>>,
}

/// Canonical source text for a movie: `title [SEP] overview [SEP] genres`,
/// empty parts omitted. The title falls back to the original title.
pub(crate) fn movie_source_text(details: &TmdbMovieDetails) -> String {
    let title = details
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .or(details.original_title.as_deref())
        .unwrap_or("")
        .trim();
    let overview = details.overview.as_deref().unwrap_or("").trim();
    let genres = details
        .genres
        .iter()
        .filter_map(|g| g.name.as_deref())
        .filter(|n| !n.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    [title, overview, genres.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" [SEP] ")
}

/// A row needs (re)computation when it is missing, its hash no longer
/// matches the current source text, or its vector is absent.
fn needs_refresh(stored: Option<&StoredEmbedding>, text_hash: &str) -> bool {
    match stored {
        None => true,
        Some(row) => row.text_hash.as_deref() != Some(text_hash) || row.embedding.is_none(),
    }
}

impl EmbeddingService {
    pub fn new(pool: PgPool, catalog: Arc<dyn MovieCatalog>) -> Self {
        Self {
            pool,
            catalog,
            model: OnceCell::new(),
        }
    }

    /// Loads the model on first call; the outcome (loaded or failed) is
    /// memoized for the process lifetime.
    async fn model(&self) -> Option<Arc<fastembed::TextEmbedding>> {
        self.model
            .get_or_init(|| async {
                let loaded = tokio::task::spawn_blocking(|| {
                    let options =
                        fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2);
                    fastembed::TextEmbedding::try_new(options)
                })
                .await;

                match loaded {
                    Ok(Ok(model)) => {
                        tracing::info!(dim = EMBEDDING_DIM, "Embedding model loaded");
                        Some(Arc::new(model))
                    }
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Embedding model failed to load; personalization disabled");
                        None
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Embedding model load task failed; personalization disabled");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Whether the embedding capability is usable in this process.
    pub async fn available(&self) -> bool {
        self.model().await.is_some()
    }

    /// Embeds a batch of texts in one model call, order-preserving,
    /// unit-normalized.
    async fn embed_batch(&self, texts: Vec<String>) -> AppResult<Vec<Vec<f32>>> {
        let model = self.model().await.ok_or(AppError::EmbeddingsUnavailable)?;

        let vectors = tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| AppError::Embedding(format!("embedding task join error: {}", e)))?
            .map_err(|e| AppError::Embedding(format!("batch embedding failed: {}", e)))?;

        Ok(vectors.into_iter().map(l2_normalize).collect())
    }

    /// Returns a vector per requested movie id, recomputing only the ids
    /// whose stored row is missing or stale. Ids whose source text cannot be
    /// fetched are omitted from the result, not failed.
    ///
    /// Texts needing computation are embedded in one batch call; re-invoking
    /// with unchanged source text is a pure cache hit.
    pub async fn ensure_embeddings(&self, movie_ids: &[i32]) -> AppResult<HashMap<i32, Vec<f32>>> {
        let unique: Vec<i32> = {
            let mut seen = HashSet::new();
            movie_ids
                .iter()
                .copied()
                .filter(|id| *id > 0 && seen.insert(*id))
                .collect()
        };

        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let stored: Vec<StoredEmbedding> = sqlx::query_as(
            "SELECT movie_id, text_hash, embedding FROM movie_embeddings WHERE movie_id = ANY($1)",
        )
        .bind(&unique)
        .fetch_all(&self.pool)
        .await?;
        let stored: HashMap<i32, StoredEmbedding> =
            stored.into_iter().map(|row| (row.movie_id, row)).collect();

        let mut resolved: HashMap<i32, Vec<f32>> = HashMap::new();
        let mut pending: Vec<(i32, String, String)> = Vec::new();

        for &movie_id in &unique {
            let details = match self.catalog.movie_details(movie_id).await {
                Ok(details) => details,
                Err(e) => {
                    tracing::warn!(movie_id, error = %e, "Skipping movie without fetchable source text");
                    continue;
                }
            };

            let text = movie_source_text(&details);
            let text_hash = sha1_hex(&text);
            let row = stored.get(&movie_id);

            if needs_refresh(row, &text_hash) {
                pending.push((movie_id, text_hash, text));
            } else if let Some(vector) = row.and_then(|r| r.embedding.clone()) {
                resolved.insert(movie_id, vector);
            }
        }

        if !pending.is_empty() {
            let texts: Vec<String> = pending.iter().map(|(_, _, text)| text.clone()).collect();
            let vectors = self.embed_batch(texts).await?;
            let now = Utc::now();

            for ((movie_id, text_hash, _), vector) in pending.into_iter().zip(vectors) {
                sqlx::query(
                    r#"
                    INSERT INTO movie_embeddings(movie_id, text_hash, embedding, updated_at)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (movie_id)
                    DO UPDATE SET text_hash = EXCLUDED.text_hash,
                                  embedding = EXCLUDED.embedding,
                                  updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(movie_id)
                .bind(&text_hash)
                .bind(&vector)
                .bind(now)
                .execute(&self.pool)
                .await?;

                resolved.insert(movie_id, vector);
            }
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TmdbGenre;

    fn details(
        title: Option<&str>,
        original_title: Option<&str>,
        overview: Option<&str>,
        genres: &[&str],
    ) -> TmdbMovieDetails {
        TmdbMovieDetails {
            id: 1,
            title: title.map(str::to_string),
            original_title: original_title.map(str::to_string),
            overview: overview.map(str::to_string),
            genres: genres
                .iter()
                .map(|name| TmdbGenre {
                    name: Some(name.to_string()),
                })
                .collect(),
        }
    }

    #[test]
    fn test_movie_source_text_joins_all_parts() {
        let d = details(
            Some("Inception"),
            None,
            Some("A thief steals secrets through dreams."),
            &["Action", "Sci-Fi"],
        );
        assert_eq!(
            movie_source_text(&d),
            "Inception [SEP] A thief steals secrets through dreams. [SEP] Action, Sci-Fi"
        );
    }

    #[test]
    fn test_movie_source_text_skips_empty_parts() {
        let d = details(Some("Inception"), None, None, &[]);
        assert_eq!(movie_source_text(&d), "Inception");

        let d = details(Some("Inception"), None, Some(""), &["Action"]);
        assert_eq!(movie_source_text(&d), "Inception [SEP] Action");
    }

    #[test]
    fn test_movie_source_text_falls_back_to_original_title() {
        let d = details(None, Some("Le Samouraï"), Some("A hitman."), &[]);
        assert_eq!(movie_source_text(&d), "Le Samouraï [SEP] A hitman.");

        let d = details(Some("  "), Some("Le Samouraï"), None, &[]);
        assert_eq!(movie_source_text(&d), "Le Samouraï");
    }

    #[test]
    fn test_needs_refresh_missing_row() {
        assert!(needs_refresh(None, "abc"));
    }

    #[test]
    fn test_needs_refresh_hash_mismatch() {
        let row = StoredEmbedding {
            movie_id: 1,
            text_hash: Some("old".to_string()),
            embedding: Some(vec![1.0, 0.0]),
        };
        assert!(needs_refresh(Some(&row), "new"));
    }

    #[test]
    fn test_needs_refresh_absent_vector() {
        let row = StoredEmbedding {
            movie_id: 1,
            text_hash: Some("abc".to_string()),
            embedding: None,
        };
        assert!(needs_refresh(Some(&row), "abc"));
    }

    #[test]
    fn test_needs_refresh_valid_row_is_cache_hit() {
        let row = StoredEmbedding {
            movie_id: 1,
            text_hash: Some("abc".to_string()),
            embedding: Some(vec![1.0, 0.0]),
        };
        assert!(!needs_refresh(Some(&row), "abc"));
    }
}
