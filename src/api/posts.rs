//! Post API endpoints
//!
//! Public:
//! - GET /api/posts - Published posts (`kind`, `tag`, `series`, `q`)
//! - GET /api/posts/{slug} - Post detail with SEO metadata
//! - GET /api/posts/{slug}/stats - View and visitor counts
//!
//! Admin:
//! - GET/POST /api/admin/posts
//! - GET/PUT/DELETE /api/admin/posts/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_admin_per_page, default_page, default_per_page};
use crate::api::middleware::{ApiError, AppState, AuthenticatedAdmin};
use crate::models::{
    CreatePostInput, ListParams, PagedResult, PostFilter, PostKind, PostStats, PostStatus,
    PostWithTags, UpdatePostInput,
};
use crate::services::seo::{post_meta, SeoMeta};
use crate::services::PostDetail;

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub kind: Option<PostKind>,
    /// Tag slug
    pub tag: Option<String>,
    /// Series id or slug
    pub series: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminListPostsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_admin_per_page")]
    pub per_page: u32,
    pub kind: Option<PostKind>,
    pub status: Option<PostStatus>,
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostDetailResponse {
    #[serde(flatten)]
    pub detail: PostDetail,
    pub seo: SeoMeta,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts))
        .route("/{slug}", get(get_post))
        .route("/{slug}/stats", get(get_post_stats))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list_posts).post(create_post))
        .route(
            "/{id}",
            get(admin_get_post).put(update_post).delete(delete_post),
        )
}

/// GET /api/posts
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<PagedResult<PostWithTags>>, ApiError> {
    let series_id = match query.series.as_deref().filter(|s| !s.is_empty()) {
        Some(id_or_slug) => Some(state.series_service.resolve(id_or_slug).await?.id),
        None => None,
    };
    let filter = PostFilter {
        kind: query.kind,
        tag: query.tag.filter(|t| !t.is_empty()),
        series_id,
        query: query.q.filter(|q| !q.trim().is_empty()),
        status: None,
    };
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(state.post_service.list_published(&params, &filter).await?))
}

/// GET /api/posts/{slug}
async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostDetailResponse>, ApiError> {
    let detail = state.post_service.get_published_by_slug(&slug).await?;
    let site = state.settings_service.get_site_settings().await?;
    let seo = post_meta(&detail.post, &detail.tags, &site);
    Ok(Json(PostDetailResponse { detail, seo }))
}

/// GET /api/posts/{slug}/stats
async fn get_post_stats(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostStats>, ApiError> {
    let detail = state.post_service.get_published_by_slug(&slug).await?;
    Ok(Json(state.analytics_service.post_stats(detail.post.id).await?))
}

/// GET /api/admin/posts
async fn admin_list_posts(
    State(state): State<AppState>,
    Query(query): Query<AdminListPostsQuery>,
) -> Result<Json<PagedResult<PostWithTags>>, ApiError> {
    let filter = PostFilter {
        kind: query.kind,
        status: query.status,
        query: query.q.filter(|q| !q.trim().is_empty()),
        ..Default::default()
    };
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(state.post_service.list_admin(&params, &filter).await?))
}

/// POST /api/admin/posts
async fn create_post(
    State(state): State<AppState>,
    current: AuthenticatedAdmin,
    Json(input): Json<CreatePostInput>,
) -> Result<(StatusCode, Json<PostWithTags>), ApiError> {
    let post = state
        .post_service
        .create(input, Some(current.admin.id))
        .await?;
    state.seo_service.invalidate().await;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /api/admin/posts/{id}
async fn admin_get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostWithTags>, ApiError> {
    Ok(Json(state.post_service.get_by_id(id).await?))
}

/// PUT /api/admin/posts/{id}
async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePostInput>,
) -> Result<Json<PostWithTags>, ApiError> {
    let post = state.post_service.update(id, input).await?;
    state.seo_service.invalidate().await;
    Ok(Json(post))
}

/// DELETE /api/admin/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(id).await?;
    state.seo_service.invalidate().await;
    Ok(StatusCode::NO_CONTENT)
}
