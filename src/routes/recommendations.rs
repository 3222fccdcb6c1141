use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::{error::AppResult, models::RecommendationNote, state::AppState};

/// Handler for the personalization endpoint
///
/// Every "no opinion about this user" branch returns a well-formed empty
/// payload with a note; only the missing-model case maps to a non-success
/// status, signalling a temporary service-degraded condition.
pub async fn personalized(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let (note, results) = state.recommender.personalize(user_id).await?;

    let status = match note {
        RecommendationNote::EmbeddingsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    Ok((status, Json(json!({ "results": results, "note": note }))))
}
