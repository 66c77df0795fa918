//! AI writing assistant (admin only, rate limited)
//!
//! - GET /api/admin/ai/status
//! - POST /api/admin/ai/complete

use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::services::{Completion, CompletionRequest};

#[derive(Debug, Serialize)]
pub struct AiStatusResponse {
    pub enabled: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(ai_status))
        .route("/complete", post(complete))
}

async fn ai_status(State(state): State<AppState>) -> Json<AiStatusResponse> {
    Json(AiStatusResponse {
        enabled: state.ai_service.is_enabled(),
    })
}

async fn complete(
    State(state): State<AppState>,
    Json(request): Json<CompletionRequest>,
) -> Result<Json<Completion>, ApiError> {
    Ok(Json(state.ai_service.complete(request).await?))
}
