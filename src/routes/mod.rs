use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub mod movies;
pub mod recommendations;
pub mod signals;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/movies/search", get(movies::search))
        .route("/movies/featured", get(movies::featured))
        .route("/users/:user_id/favorites", post(signals::toggle_favorite))
        .route("/users/:user_id/ratings", post(signals::set_rating))
        .route(
            "/users/:user_id/trailer-events",
            post(signals::record_trailer_view),
        )
        .route(
            "/users/:user_id/personalized",
            get(recommendations::personalized),
        )
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
