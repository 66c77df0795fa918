//! Tag API endpoints
//!
//! - GET /api/tags - Tags with published post counts
//! - GET /api/tags/{slug}/posts - Published posts with a tag
//! - GET/POST /api/admin/tags, DELETE /api/admin/tags/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState};
use crate::models::{Tag, TagWithCount};
use crate::services::tag::TagPosts;

/// Request body for creating a tag
#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags))
        .route("/{slug}/posts", get(posts_by_tag))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route("/{id}", delete(delete_tag))
}

/// GET /api/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagWithCount>>, ApiError> {
    Ok(Json(state.tag_service.list().await?))
}

/// GET /api/tags/{slug}/posts
async fn posts_by_tag(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<TagPosts>, ApiError> {
    Ok(Json(
        state
            .tag_service
            .posts_by_tag(&slug, &query.params())
            .await?,
    ))
}

async fn create_tag(
    State(state): State<AppState>,
    Json(body): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let tag = state.tag_service.create(&body.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.delete(id).await?;
    state.seo_service.invalidate().await;
    Ok(StatusCode::NO_CONTENT)
}
