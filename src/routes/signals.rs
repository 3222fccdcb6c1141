use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::RatingValue,
    services::signals,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    pub movie_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub movie_id: i32,
    pub value: RatingValue,
}

fn validate_movie_id(movie_id: i32) -> AppResult<()> {
    if movie_id <= 0 {
        return Err(AppError::InvalidInput(
            "movie_id must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Handler for the favorite toggle endpoint
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<SignalRequest>,
) -> AppResult<Json<Value>> {
    validate_movie_id(request.movie_id)?;
    let favorite = signals::toggle_favorite(&state.pool, user_id, request.movie_id).await?;
    Ok(Json(json!({ "ok": true, "favorite": favorite })))
}

/// Handler for the like/dislike endpoint
pub async fn set_rating(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<RatingRequest>,
) -> AppResult<Json<Value>> {
    validate_movie_id(request.movie_id)?;
    let rating = signals::set_rating(&state.pool, user_id, request.movie_id, request.value).await?;
    Ok(Json(json!({ "ok": true, "rating": rating })))
}

/// Handler for the trailer-view event endpoint
pub async fn record_trailer_view(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<SignalRequest>,
) -> AppResult<Json<Value>> {
    validate_movie_id(request.movie_id)?;
    signals::record_trailer_view(&state.pool, user_id, request.movie_id).await?;
    Ok(Json(json!({ "ok": true })))
}
