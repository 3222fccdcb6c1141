use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use cinefeed::{
    config::Config,
    db,
    routes::create_router,
    services::catalog::{MovieCatalog, TmdbCatalog},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::init_schema(&pool).await?;

    let catalog: Arc<dyn MovieCatalog> = Arc::new(TmdbCatalog::new(
        config.tmdb_api_key.clone(),
        config.tmdb_base_url.clone(),
    )?);
    let state = AppState::new(pool, catalog);
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "cinefeed listening");
    axum::serve(listener, app).await?;

    Ok(())
}
