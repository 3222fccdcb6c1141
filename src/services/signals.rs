/// User signal store: favorites, ratings and trailer-view events.
///
/// Every write here invalidates the user's profile and recommendation cache
/// synchronously, so the next personalization read either rebuilds fresh or
/// finds no stale cache at all. The fingerprint (count + most-recent
/// timestamp per signal table, hashed) is the sole staleness signal; no
/// field-level diffing.
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{error::AppResult, models::RatingValue, services::sha1_hex};

/// How much recent history feeds the profile builder, per signal type.
pub const FAVORITES_SIGNAL_LIMIT: i64 = 60;
pub const RATINGS_SIGNAL_LIMIT: i64 = 250;
pub const TRAILER_GROUP_LIMIT: i64 = 250;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FavoriteSignal {
    pub movie_id: i32,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RatingSignal {
    pub movie_id: i32,
    pub value: i16,
    pub created_at: Option<DateTime<Utc>>,
}

/// Trailer views grouped by movie.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrailerSignal {
    pub movie_id: i32,
    pub views: i64,
    pub last_viewed: Option<DateTime<Utc>>,
}

/// Pre-hash fingerprint input. Any insertion, deletion or update to a
/// signal table changes at least one (count, max timestamp) pair.
pub(crate) fn fingerprint_input(
    favorites: (i64, Option<DateTime<Utc>>),
    ratings: (i64, Option<DateTime<Utc>>),
    trailers: (i64, Option<DateTime<Utc>>),
) -> String {
    fn fmt(pair: &(i64, Option<DateTime<Utc>>)) -> String {
        let latest = pair
            .1
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "0".to_string());
        format!("{}:{}", pair.0, latest)
    }

    format!(
        "fav:{}|rat:{}|trl:{}",
        fmt(&favorites),
        fmt(&ratings),
        fmt(&trailers)
    )
}

/// Hash summarizing the count and recency of a user's signals.
pub async fn fingerprint(pool: &PgPool, user_id: i64) -> AppResult<String> {
    let favorites: (i64, Option<DateTime<Utc>>) =
        sqlx::query_as("SELECT COUNT(*), MAX(created_at) FROM favorites WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    let ratings: (i64, Option<DateTime<Utc>>) =
        sqlx::query_as("SELECT COUNT(*), MAX(created_at) FROM ratings WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    let trailers: (i64, Option<DateTime<Utc>>) =
        sqlx::query_as("SELECT COUNT(*), MAX(created_at) FROM trailer_events WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    Ok(sha1_hex(&fingerprint_input(favorites, ratings, trailers)))
}

/// Drops the user's profile and recommendation cache rows.
pub async fn invalidate_user_cache(pool: &PgPool, user_id: i64) -> AppResult<()> {
    sqlx::query("DELETE FROM user_profiles WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM user_recommendations WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    tracing::debug!(user_id, "User personalization cache invalidated");
    Ok(())
}

/// Toggles a favorite: present removes it, absent inserts it. Returns the
/// new state (`true` when the movie is now a favorite).
pub async fn toggle_favorite(pool: &PgPool, user_id: i64, movie_id: i32) -> AppResult<bool> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM favorites WHERE user_id = $1 AND movie_id = $2")
            .bind(user_id)
            .bind(movie_id)
            .fetch_optional(pool)
            .await?;

    let favorite = match existing {
        Some(id) => {
            sqlx::query("DELETE FROM favorites WHERE id = $1")
                .bind(id)
                .execute(pool)
                .await?;
            false
        }
        None => {
            // Concurrent duplicate submissions converge on one row.
            sqlx::query(
                r#"
                INSERT INTO favorites(user_id, movie_id, created_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, movie_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(movie_id)
            .bind(Utc::now())
            .execute(pool)
            .await?;
            true
        }
    };

    invalidate_user_cache(pool, user_id).await?;
    Ok(favorite)
}

/// Applies a like/dislike: re-submitting the current value removes the
/// rating, anything else upserts it. Returns the stored value, `None` when
/// removed.
pub async fn set_rating(
    pool: &PgPool,
    user_id: i64,
    movie_id: i32,
    value: RatingValue,
) -> AppResult<Option<RatingValue>> {
    let current: Option<i16> =
        sqlx::query_scalar("SELECT value FROM ratings WHERE user_id = $1 AND movie_id = $2")
            .bind(user_id)
            .bind(movie_id)
            .fetch_optional(pool)
            .await?;

    let stored = if current == Some(value.as_i16()) {
        sqlx::query("DELETE FROM ratings WHERE user_id = $1 AND movie_id = $2")
            .bind(user_id)
            .bind(movie_id)
            .execute(pool)
            .await?;
        None
    } else {
        sqlx::query(
            r#"
            INSERT INTO ratings(user_id, movie_id, value, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, movie_id)
            DO UPDATE SET value = EXCLUDED.value, created_at = EXCLUDED.created_at
            "#,
        )
        .bind(user_id)
        .bind(movie_id)
        .bind(value.as_i16())
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Some(value)
    };

    invalidate_user_cache(pool, user_id).await?;
    Ok(stored)
}

/// Appends a trailer-view event. The table is append-only; repeat views of
/// the same movie are additive.
pub async fn record_trailer_view(pool: &PgPool, user_id: i64, movie_id: i32) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO trailer_events(user_id, movie_id, event_type, created_at)
        VALUES ($1, $2, 'watch_trailer', $3)
        "#,
    )
    .bind(user_id)
    .bind(movie_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    invalidate_user_cache(pool, user_id).await
}

/// Union of every movie id the user has favorited, rated or trailer-viewed.
pub async fn seen_movie_ids(pool: &PgPool, user_id: i64) -> AppResult<HashSet<i32>> {
    let mut seen = HashSet::new();
    for query in [
        "SELECT movie_id FROM favorites WHERE user_id = $1",
        "SELECT movie_id FROM ratings WHERE user_id = $1",
        "SELECT movie_id FROM trailer_events WHERE user_id = $1",
    ] {
        let ids: Vec<i32> = sqlx::query_scalar(query)
            .bind(user_id)
            .fetch_all(pool)
            .await?;
        seen.extend(ids);
    }
    Ok(seen)
}

pub async fn recent_favorites(pool: &PgPool, user_id: i64) -> AppResult<Vec<FavoriteSignal>> {
    let rows = sqlx::query_as(
        "SELECT movie_id, created_at FROM favorites WHERE user_id = $1 ORDER BY id DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(FAVORITES_SIGNAL_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn recent_ratings(pool: &PgPool, user_id: i64) -> AppResult<Vec<RatingSignal>> {
    let rows = sqlx::query_as(
        "SELECT movie_id, value, created_at FROM ratings WHERE user_id = $1 ORDER BY id DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(RATINGS_SIGNAL_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn recent_trailer_groups(pool: &PgPool, user_id: i64) -> AppResult<Vec<TrailerSignal>> {
    let rows = sqlx::query_as(
        r#"
        SELECT movie_id, COUNT(*) AS views, MAX(created_at) AS last_viewed
        FROM trailer_events
        WHERE user_id = $1
        GROUP BY movie_id
        ORDER BY MAX(created_at) DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(TRAILER_GROUP_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
