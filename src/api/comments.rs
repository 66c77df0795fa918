//! Comment API endpoints
//!
//! Public:
//! - GET /api/comments?post_id= - Approved comment tree
//! - POST /api/comments - Create comment (rate limited)
//! - GET /api/comments/{id}/reactions - Reaction summary
//! - POST /api/comments/{id}/reactions - Toggle a reaction (rate limited)
//!
//! Admin:
//! - GET /api/admin/comments - Moderation queue (`status` filter)
//! - PUT /api/admin/comments/{id} - Set status
//! - DELETE /api/admin/comments/{id}

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_admin_per_page, default_page, visitor_hash};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    Comment, CommentStatus, CommentTree, CreateCommentInput, ListParams, PagedResult,
    ReactionKind, ReactionSummary,
};

#[derive(Debug, Deserialize)]
pub struct CommentsQuery {
    pub post_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdminCommentsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_admin_per_page")]
    pub per_page: u32,
    pub status: Option<CommentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub kind: ReactionKind,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CommentStatus,
}

/// What the commenter gets back; the email stays private
#[derive(Debug, Serialize)]
pub struct CreatedCommentResponse {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author_name: String,
    pub content: String,
    pub status: CommentStatus,
    /// False while waiting for moderation
    pub visible: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Comment> for CreatedCommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            post_id: comment.post_id,
            parent_id: comment.parent_id,
            author_name: comment.author_name,
            content: comment.content,
            visible: comment.status == CommentStatus::Approved,
            status: comment.status,
            created_at: comment.created_at,
        }
    }
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_comments))
        .route("/{id}/reactions", get(get_reactions))
}

/// Public writes, mounted behind the write rate limit
pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_comment))
        .route("/{id}/reactions", post(toggle_reaction))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list_comments))
        .route("/{id}", put(update_status).delete(delete_comment))
}

/// GET /api/comments?post_id=
async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentsQuery>,
) -> Result<Json<Vec<CommentTree>>, ApiError> {
    Ok(Json(state.comment_service.list_for_post(query.post_id).await?))
}

/// POST /api/comments
async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateCommentInput>,
) -> Result<(StatusCode, Json<CreatedCommentResponse>), ApiError> {
    let visitor = visitor_hash(&state, &headers);
    let comment = state.comment_service.create(input, &visitor).await?;
    Ok((StatusCode::CREATED, Json(comment.into())))
}

/// GET /api/comments/{id}/reactions
async fn get_reactions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<ReactionSummary>, ApiError> {
    let visitor = visitor_hash(&state, &headers);
    Ok(Json(state.comment_service.reactions(id, &visitor).await?))
}

/// POST /api/comments/{id}/reactions
async fn toggle_reaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<ReactionRequest>,
) -> Result<Json<ReactionSummary>, ApiError> {
    let visitor = visitor_hash(&state, &headers);
    Ok(Json(
        state
            .comment_service
            .toggle_reaction(id, body.kind, &visitor)
            .await?,
    ))
}

/// GET /api/admin/comments
async fn admin_list_comments(
    State(state): State<AppState>,
    Query(query): Query<AdminCommentsQuery>,
) -> Result<Json<PagedResult<Comment>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(
        state
            .comment_service
            .list_by_status(&params, query.status)
            .await?,
    ))
}

/// PUT /api/admin/comments/{id}
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Comment>, ApiError> {
    Ok(Json(state.comment_service.set_status(id, body.status).await?))
}

/// DELETE /api/admin/comments/{id}
async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.comment_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
