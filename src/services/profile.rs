/// User profile builder: weighted, time-decayed signals folded into one
/// centroid embedding per user.
///
/// Recent signals dominate but old ones never vanish entirely; a dislike
/// carries a negative weight that pulls the centroid away from that
/// content. The stored profile is reused untouched while the signal
/// fingerprint matches.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::AppResult,
    services::{
        embedding::EmbeddingService,
        l2_normalize,
        signals::{self, FavoriteSignal, RatingSignal, TrailerSignal},
    },
};

const FAVORITE_WEIGHT: f32 = 2.5;
const RATING_WEIGHT: f32 = 2.0;
const TRAILER_BASE_WEIGHT: f32 = 0.8;
const TRAILER_WEIGHT_CAP: f32 = 2.0;
const DECAY_BASE: f32 = 0.985;
const MISSING_TIMESTAMP_DECAY: f32 = 0.5;

/// Exponential age decay: 0.985^days, 1.0 at age zero. A missing timestamp
/// decays to a fixed 0.5.
pub(crate) fn decay(now: DateTime<Utc>, event: Option<DateTime<Utc>>) -> f32 {
    match event {
        None => MISSING_TIMESTAMP_DECAY,
        Some(t) => {
            let days = now.signed_duration_since(t).num_days().max(0);
            DECAY_BASE.powi(days as i32)
        }
    }
}

/// Folds all three signal types into one weight per movie id. Weights for
/// the same movie accumulate additively across signal types.
pub(crate) fn accumulate_weights(
    now: DateTime<Utc>,
    favorites: &[FavoriteSignal],
    ratings: &[RatingSignal],
    trailers: &[TrailerSignal],
) -> HashMap<i32, f32> {
    let mut weights: HashMap<i32, f32> = HashMap::new();

    for favorite in favorites {
        *weights.entry(favorite.movie_id).or_default() +=
            FAVORITE_WEIGHT * decay(now, favorite.created_at);
    }

    for rating in ratings {
        let base = if rating.value >= 0 {
            RATING_WEIGHT
        } else {
            -RATING_WEIGHT
        };
        *weights.entry(rating.movie_id).or_default() += base * decay(now, rating.created_at);
    }

    for trailer in trailers {
        let views = trailer.views.max(0) as f32;
        let base = (TRAILER_BASE_WEIGHT * (1.0 + (1.0 + views).ln())).min(TRAILER_WEIGHT_CAP);
        *weights.entry(trailer.movie_id).or_default() += base * decay(now, trailer.last_viewed);
    }

    weights
}

/// Weighted centroid: Σ(wᵢ·vᵢ) / Σ|wᵢ|, re-normalized to unit length.
/// Returns `None` when no weighted movie has a vector or the absolute
/// weights sum to zero.
pub(crate) fn weighted_centroid(
    weights: &HashMap<i32, f32>,
    embeddings: &HashMap<i32, Vec<f32>>,
) -> Option<Vec<f32>> {
    let mut sum: Option<Vec<f32>> = None;
    let mut denom = 0.0f32;

    for (movie_id, weight) in weights {
        let Some(vector) = embeddings.get(movie_id) else {
            continue;
        };
        let acc = sum.get_or_insert_with(|| vec![0.0; vector.len()]);
        for (a, x) in acc.iter_mut().zip(vector) {
            *a += weight * x;
        }
        denom += weight.abs();
    }

    let sum = sum?;
    if denom == 0.0 {
        return None;
    }

    Some(l2_normalize(sum.into_iter().map(|x| x / denom).collect()))
}

pub struct ProfileBuilder {
    pool: PgPool,
    embeddings: Arc<EmbeddingService>,
}

impl ProfileBuilder {
    pub fn new(pool: PgPool, embeddings: Arc<EmbeddingService>) -> Self {
        Self { pool, embeddings }
    }

    /// Returns the user's (fingerprint, profile vector). A stored profile
    /// whose fingerprint still matches is returned unchanged; otherwise the
    /// profile is rebuilt from recent signals and upserted. `None` means
    /// insufficient data, which is a normal outcome.
    pub async fn get_or_build(&self, user_id: i64) -> AppResult<(String, Option<Vec<f32>>)> {
        let sig = signals::fingerprint(&self.pool, user_id).await?;

        let stored: Option<(String, Vec<f32>)> =
            sqlx::query_as("SELECT signals_hash, embedding FROM user_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        if let Some((stored_sig, vector)) = stored {
            if stored_sig == sig {
                return Ok((sig, Some(vector)));
            }
        }

        let now = Utc::now();
        let favorites = signals::recent_favorites(&self.pool, user_id).await?;
        let ratings = signals::recent_ratings(&self.pool, user_id).await?;
        let trailers = signals::recent_trailer_groups(&self.pool, user_id).await?;

        let weights = accumulate_weights(now, &favorites, &ratings, &trailers);
        if weights.is_empty() {
            return Ok((sig, None));
        }

        let movie_ids: Vec<i32> = weights.keys().copied().collect();
        let embeddings = self.embeddings.ensure_embeddings(&movie_ids).await?;

        let Some(vector) = weighted_centroid(&weights, &embeddings) else {
            return Ok((sig, None));
        };

        sqlx::query(
            r#"
            INSERT INTO user_profiles(user_id, signals_hash, embedding, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id)
            DO UPDATE SET signals_hash = EXCLUDED.signals_hash,
                          embedding = EXCLUDED.embedding,
                          updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(&sig)
        .bind(&vector)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id, signals = weights.len(), "User profile rebuilt");
        Ok((sig, Some(vector)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_decay_is_one_at_age_zero() {
        let now = Utc::now();
        assert!((decay(now, Some(now)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decay_is_monotonic_in_age() {
        let now = Utc::now();
        let recent = decay(now, Some(now - Duration::days(1)));
        let old = decay(now, Some(now - Duration::days(30)));
        assert!(recent > old);
        assert!(old > 0.0);
    }

    #[test]
    fn test_decay_future_timestamp_clamps_to_one() {
        let now = Utc::now();
        assert!((decay(now, Some(now + Duration::days(3))) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decay_missing_timestamp() {
        assert_eq!(decay(Utc::now(), None), MISSING_TIMESTAMP_DECAY);
    }

    #[test]
    fn test_weights_accumulate_across_signal_types() {
        let now = Utc::now();
        let favorites = vec![FavoriteSignal {
            movie_id: 7,
            created_at: Some(now),
        }];
        let ratings = vec![RatingSignal {
            movie_id: 7,
            value: 1,
            created_at: Some(now),
        }];
        let weights = accumulate_weights(now, &favorites, &ratings, &[]);
        assert!((weights[&7] - (FAVORITE_WEIGHT + RATING_WEIGHT)).abs() < 1e-5);
    }

    #[test]
    fn test_dislike_weight_is_negative() {
        let now = Utc::now();
        let ratings = vec![RatingSignal {
            movie_id: 3,
            value: -1,
            created_at: Some(now),
        }];
        let weights = accumulate_weights(now, &[], &ratings, &[]);
        assert!((weights[&3] + RATING_WEIGHT).abs() < 1e-5);
    }

    #[test]
    fn test_trailer_weight_is_capped() {
        let now = Utc::now();
        let trailers = vec![TrailerSignal {
            movie_id: 5,
            views: 10_000,
            last_viewed: Some(now),
        }];
        let weights = accumulate_weights(now, &[], &[], &trailers);
        assert!((weights[&5] - TRAILER_WEIGHT_CAP).abs() < 1e-5);
    }

    #[test]
    fn test_trailer_weight_grows_with_views() {
        let now = Utc::now();
        let one = accumulate_weights(
            now,
            &[],
            &[],
            &[TrailerSignal {
                movie_id: 5,
                views: 1,
                last_viewed: Some(now),
            }],
        );
        let two = accumulate_weights(
            now,
            &[],
            &[],
            &[TrailerSignal {
                movie_id: 5,
                views: 2,
                last_viewed: Some(now),
            }],
        );
        assert!(two[&5] > one[&5]);
    }

    #[test]
    fn test_single_fresh_favorite_profile_equals_movie_embedding() {
        let now = Utc::now();
        let favorites = vec![FavoriteSignal {
            movie_id: 42,
            created_at: Some(now),
        }];
        let weights = accumulate_weights(now, &favorites, &[], &[]);

        let mut embeddings = HashMap::new();
        embeddings.insert(42, vec![0.6, 0.8]);

        let profile = weighted_centroid(&weights, &embeddings).unwrap();
        assert!((profile[0] - 0.6).abs() < 1e-5);
        assert!((profile[1] - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_centroid_is_unit_normalized() {
        let mut weights = HashMap::new();
        weights.insert(1, 2.5f32);
        weights.insert(2, 1.0f32);

        let mut embeddings = HashMap::new();
        embeddings.insert(1, vec![1.0, 0.0, 0.0]);
        embeddings.insert(2, vec![0.0, 1.0, 0.0]);

        let profile = weighted_centroid(&weights, &embeddings).unwrap();
        assert!((norm(&profile) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_negative_weight_pulls_centroid_away() {
        let mut weights = HashMap::new();
        weights.insert(1, 2.0f32);
        weights.insert(2, -2.0f32);

        let mut embeddings = HashMap::new();
        embeddings.insert(1, vec![1.0, 0.0]);
        embeddings.insert(2, vec![0.0, 1.0]);

        let profile = weighted_centroid(&weights, &embeddings).unwrap();
        assert!(profile[0] > 0.0);
        assert!(profile[1] < 0.0);
    }

    #[test]
    fn test_centroid_without_resolvable_embeddings_is_none() {
        let mut weights = HashMap::new();
        weights.insert(1, 2.5f32);
        assert!(weighted_centroid(&weights, &HashMap::new()).is_none());
    }
}
