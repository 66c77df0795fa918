//! Editor autosave drafts (admin only)
//!
//! - GET /api/admin/drafts - Drafts, most recently saved first
//! - POST /api/admin/drafts - Save (create or overwrite by `id`)
//! - GET/DELETE /api/admin/drafts/{id}
//! - POST /api/admin/drafts/{id}/promote - Turn into post content

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedAdmin};
use crate::models::{Draft, PostWithTags, SaveDraftInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_drafts).post(save_draft))
        .route("/{id}", get(get_draft).delete(delete_draft))
        .route("/{id}/promote", post(promote_draft))
}

async fn list_drafts(State(state): State<AppState>) -> Result<Json<Vec<Draft>>, ApiError> {
    Ok(Json(state.draft_service.list().await?))
}

async fn save_draft(
    State(state): State<AppState>,
    Json(input): Json<SaveDraftInput>,
) -> Result<Json<Draft>, ApiError> {
    Ok(Json(state.draft_service.save(input).await?))
}

async fn get_draft(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Draft>, ApiError> {
    Ok(Json(state.draft_service.get(id).await?))
}

async fn delete_draft(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.draft_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn promote_draft(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    current: AuthenticatedAdmin,
) -> Result<Json<PostWithTags>, ApiError> {
    let post = state
        .draft_service
        .promote(id, Some(current.admin.id))
        .await?;
    state.seo_service.invalidate().await;
    Ok(Json(post))
}
