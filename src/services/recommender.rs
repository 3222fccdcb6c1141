/// Recommendation scorer: cosine similarity between the user profile and
/// the candidate matrix, seen movies excluded, top results persisted per
/// fingerprint.
///
/// Both sides are unit-normalized, so the matrix-vector product is cosine
/// similarity directly. Cached rows are served only while their stored
/// fingerprint equals the user's current one.
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use ndarray::{Array1, Array2};
use sqlx::PgPool;

use crate::{
    error::AppResult,
    models::{RecommendationNote, RecommendedMovie},
    services::{
        candidates::{CandidatePool, DEFAULT_POOL_LIMIT},
        embedding::EmbeddingService,
        profile::ProfileBuilder,
        signals,
    },
};

pub const TOP_N: usize = 12;

pub struct Recommender {
    pool: PgPool,
    embeddings: Arc<EmbeddingService>,
    candidates: Arc<CandidatePool>,
    profiles: ProfileBuilder,
}

/// Scores every candidate row against the profile, drops seen movies and
/// returns the `top_n` (movie id, score) pairs in descending score order.
/// The sort is stable, so ties keep the original candidate order.
pub(crate) fn rank_candidates(
    matrix: &Array2<f32>,
    ids: &[i32],
    profile: &[f32],
    seen: &HashSet<i32>,
    top_n: usize,
) -> Vec<(i32, f64)> {
    if matrix.nrows() != ids.len() || matrix.ncols() != profile.len() {
        return Vec::new();
    }

    let user = Array1::from_vec(profile.to_vec());
    let scores = matrix.dot(&user);

    let mut pairs: Vec<(i32, f64)> = ids
        .iter()
        .zip(scores.iter())
        .filter(|(movie_id, _)| !seen.contains(movie_id))
        .map(|(&movie_id, &score)| (movie_id, score as f64))
        .collect();

    pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    pairs.truncate(top_n);
    pairs
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(sqlx::FromRow)]
struct CachedRecommendation {
    movie_id: i32,
    score: f64,
    title: Option<String>,
    poster_path: Option<String>,
    vote_average: Option<f32>,
    release_date: Option<String>,
}

impl Recommender {
    pub fn new(
        pool: PgPool,
        embeddings: Arc<EmbeddingService>,
        candidates: Arc<CandidatePool>,
    ) -> Self {
        let profiles = ProfileBuilder::new(pool.clone(), Arc::clone(&embeddings));
        Self {
            pool,
            embeddings,
            candidates,
            profiles,
        }
    }

    /// Produces up to `TOP_N` ranked movies for the user. Every branch is a
    /// well-formed result with a note; none of them is an error.
    pub async fn personalize(
        &self,
        user_id: i64,
    ) -> AppResult<(RecommendationNote, Vec<RecommendedMovie>)> {
        if !self.embeddings.available().await {
            return Ok((RecommendationNote::EmbeddingsUnavailable, Vec::new()));
        }

        let (sig, profile) = self.profiles.get_or_build(user_id).await?;
        let Some(profile) = profile else {
            tracing::info!(user_id, "Personalization skipped: no usable signals");
            return Ok((RecommendationNote::NoSignals, Vec::new()));
        };

        let cached = self.cached_recommendations(user_id, &sig).await?;
        if !cached.is_empty() {
            return Ok((RecommendationNote::FromCache, cached));
        }

        let snapshot = self.candidates.materialize(false, DEFAULT_POOL_LIMIT).await?;
        if snapshot.ids.is_empty() {
            tracing::warn!(user_id, "Personalization skipped: candidate pool is empty");
            return Ok((RecommendationNote::NoCandidates, Vec::new()));
        }

        let seen = signals::seen_movie_ids(&self.pool, user_id).await?;
        let ranked = rank_candidates(&snapshot.matrix, &snapshot.ids, &profile, &seen, TOP_N);

        // Rows written under older fingerprints are dead weight once a new
        // scoring pass starts; clear them so the table stays bounded per user.
        sqlx::query("DELETE FROM user_recommendations WHERE user_id = $1 AND signals_hash <> $2")
            .bind(user_id)
            .bind(&sig)
            .execute(&self.pool)
            .await?;

        let now = Utc::now();
        let mut results = Vec::with_capacity(ranked.len());
        for (movie_id, score) in ranked {
            let meta = snapshot.meta.get(&movie_id);
            let recommended = RecommendedMovie {
                id: movie_id,
                title: meta.and_then(|m| m.title.clone()),
                poster_path: meta.and_then(|m| m.poster_path.clone()),
                vote_average: meta.and_then(|m| m.vote_average),
                release_date: meta.and_then(|m| m.release_date.clone()),
                sim: round4(score),
            };

            sqlx::query(
                r#"
                INSERT INTO user_recommendations(user_id, movie_id, score, title, poster_path,
                                                 vote_average, release_date, signals_hash, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (user_id, movie_id)
                DO UPDATE SET score = EXCLUDED.score,
                              title = EXCLUDED.title,
                              poster_path = EXCLUDED.poster_path,
                              vote_average = EXCLUDED.vote_average,
                              release_date = EXCLUDED.release_date,
                              signals_hash = EXCLUDED.signals_hash,
                              updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(user_id)
            .bind(movie_id)
            .bind(score)
            .bind(&recommended.title)
            .bind(&recommended.poster_path)
            .bind(recommended.vote_average)
            .bind(&recommended.release_date)
            .bind(&sig)
            .bind(now)
            .execute(&self.pool)
            .await?;

            results.push(recommended);
        }

        tracing::info!(user_id, top_n = results.len(), "Personalized recommendations computed");
        Ok((RecommendationNote::Fresh, results))
    }

    async fn cached_recommendations(
        &self,
        user_id: i64,
        sig: &str,
    ) -> AppResult<Vec<RecommendedMovie>> {
        let rows: Vec<CachedRecommendation> = sqlx::query_as(
            r#"
            SELECT movie_id, score, title, poster_path, vote_average, release_date
            FROM user_recommendations
            WHERE user_id = $1 AND signals_hash = $2
            ORDER BY score DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(sig)
        .bind(TOP_N as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RecommendedMovie {
                id: row.movie_id,
                title: row.title,
                poster_path: row.poster_path,
                vote_average: row.vote_average,
                release_date: row.release_date,
                sim: round4(row.score),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_rank_orders_by_descending_score() {
        // Dot products against the profile: 0.5, 0.9, 0.1.
        let matrix = array![[0.5, 0.0], [0.9, 0.0], [0.1, 0.0]];
        let ids = vec![10, 20, 30];
        let profile = vec![1.0, 0.0];

        let ranked = rank_candidates(&matrix, &ids, &profile, &HashSet::new(), TOP_N);
        let order: Vec<i32> = ranked.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![20, 10, 30]);
        assert!((ranked[0].1 - 0.9).abs() < 1e-6);
        assert!((ranked[1].1 - 0.5).abs() < 1e-6);
        assert!((ranked[2].1 - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_rank_excludes_seen_movies() {
        let matrix = array![[0.9, 0.0], [0.5, 0.0]];
        let ids = vec![10, 20];
        let profile = vec![1.0, 0.0];
        let seen: HashSet<i32> = [10].into_iter().collect();

        let ranked = rank_candidates(&matrix, &ids, &profile, &seen, TOP_N);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, 20);
    }

    #[test]
    fn test_rank_ties_keep_candidate_order() {
        let matrix = array![[0.5, 0.0], [0.5, 0.0], [0.5, 0.0]];
        let ids = vec![1, 2, 3];
        let profile = vec![1.0, 0.0];

        let ranked = rank_candidates(&matrix, &ids, &profile, &HashSet::new(), TOP_N);
        let order: Vec<i32> = ranked.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_rank_truncates_to_top_n() {
        let matrix = Array2::from_shape_fn((20, 2), |(i, j)| if j == 0 { i as f32 } else { 0.0 });
        let ids: Vec<i32> = (0..20).collect();
        let profile = vec![1.0, 0.0];

        let ranked = rank_candidates(&matrix, &ids, &profile, &HashSet::new(), TOP_N);
        assert_eq!(ranked.len(), TOP_N);
        assert_eq!(ranked[0].0, 19);
    }

    #[test]
    fn test_rank_with_mismatched_dimensions_is_empty() {
        let matrix = array![[0.5, 0.0]];
        let ids = vec![1];
        let profile = vec![1.0, 0.0, 0.0];
        assert!(rank_candidates(&matrix, &ids, &profile, &HashSet::new(), TOP_N).is_empty());
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(0.9), 0.9);
        assert_eq!(round4(-0.00004), -0.0);
    }
}
