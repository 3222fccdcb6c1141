use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::error::AppResult;

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Creates the recommendation tables if they do not exist yet.
///
/// The `users` and `comments` tables belong to the auth/CRUD layer and are
/// not managed here; `user_id` columns are plain BIGINTs whose integrity is
/// guaranteed by that layer.
pub async fn init_schema(pool: &PgPool) -> AppResult<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS favorites(
            id         BIGSERIAL PRIMARY KEY,
            user_id    BIGINT NOT NULL,
            movie_id   INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            UNIQUE(user_id, movie_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS ratings(
            id         BIGSERIAL PRIMARY KEY,
            user_id    BIGINT NOT NULL,
            movie_id   INTEGER NOT NULL,
            value      SMALLINT NOT NULL CHECK (value IN (-1, 1)),
            created_at TIMESTAMPTZ NOT NULL,
            UNIQUE(user_id, movie_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS trailer_events(
            id         BIGSERIAL PRIMARY KEY,
            user_id    BIGINT NOT NULL,
            movie_id   INTEGER NOT NULL,
            event_type TEXT NOT NULL DEFAULT 'watch_trailer',
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS movie_embeddings(
            movie_id   INTEGER PRIMARY KEY,
            text_hash  TEXT,
            embedding  REAL[],
            updated_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS candidate_movies(
            movie_id     INTEGER PRIMARY KEY,
            title        TEXT,
            poster_path  TEXT,
            vote_average REAL,
            release_date TEXT,
            updated_at   TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS user_profiles(
            user_id      BIGINT PRIMARY KEY,
            signals_hash TEXT NOT NULL,
            embedding    REAL[] NOT NULL,
            updated_at   TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS user_recommendations(
            user_id      BIGINT NOT NULL,
            movie_id     INTEGER NOT NULL,
            score        DOUBLE PRECISION NOT NULL,
            title        TEXT,
            poster_path  TEXT,
            vote_average REAL,
            release_date TEXT,
            signals_hash TEXT NOT NULL,
            updated_at   TIMESTAMPTZ NOT NULL,
            PRIMARY KEY(user_id, movie_id)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_favorites_user ON favorites(user_id, id DESC)",
        "CREATE INDEX IF NOT EXISTS idx_ratings_user ON ratings(user_id, id DESC)",
        "CREATE INDEX IF NOT EXISTS idx_trailer_events_user ON trailer_events(user_id, created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_user_recs_user ON user_recommendations(user_id, updated_at DESC)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
