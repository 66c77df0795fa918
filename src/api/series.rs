//! Series API endpoints
//!
//! - GET /api/series - Series with post counts
//! - GET /api/series/{id} - Series by id or slug, posts in reading order
//! - /api/admin/series[/{id}] - Admin CRUD
//! - PUT /api/admin/series/{id}/order - Reorder posts

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    CreateSeriesInput, Post, Series, SeriesWithCount, SeriesWithPosts, UpdateSeriesInput,
};
use crate::services::seo::{series_meta, SeoMeta};

#[derive(Debug, Serialize)]
pub struct SeriesDetailResponse {
    #[serde(flatten)]
    pub series: SeriesWithPosts,
    pub seo: SeoMeta,
}

/// Request body for reordering a series
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub post_ids: Vec<i64>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_series))
        .route("/{id}", get(get_series))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_series).post(create_series))
        .route(
            "/{id}",
            get(admin_get_series).put(update_series).delete(delete_series),
        )
        .route("/{id}/order", put(reorder_series))
}

/// GET /api/series
async fn list_series(
    State(state): State<AppState>,
) -> Result<Json<Vec<SeriesWithCount>>, ApiError> {
    Ok(Json(state.series_service.list().await?))
}

/// GET /api/series/{id}
async fn get_series(
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
) -> Result<Json<SeriesDetailResponse>, ApiError> {
    let series = state
        .series_service
        .get_with_posts(&id_or_slug, true)
        .await?;
    let site = state.settings_service.get_site_settings().await?;
    let seo = series_meta(&series.series, &series.posts, &site);
    Ok(Json(SeriesDetailResponse { series, seo }))
}

/// GET /api/admin/series/{id} (drafts included)
async fn admin_get_series(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SeriesWithPosts>, ApiError> {
    Ok(Json(
        state
            .series_service
            .get_with_posts(&id.to_string(), false)
            .await?,
    ))
}

async fn create_series(
    State(state): State<AppState>,
    Json(input): Json<CreateSeriesInput>,
) -> Result<(StatusCode, Json<Series>), ApiError> {
    let series = state.series_service.create(input).await?;
    state.seo_service.invalidate().await;
    Ok((StatusCode::CREATED, Json(series)))
}

async fn update_series(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateSeriesInput>,
) -> Result<Json<Series>, ApiError> {
    let series = state.series_service.update(id, input).await?;
    state.seo_service.invalidate().await;
    Ok(Json(series))
}

async fn delete_series(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.series_service.delete(id).await?;
    state.seo_service.invalidate().await;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/series/{id}/order
async fn reorder_series(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ReorderRequest>,
) -> Result<Json<Vec<Post>>, ApiError> {
    Ok(Json(state.series_service.reorder(id, &body.post_ids).await?))
}
