//! Analytics API endpoints
//!
//! Public (rate limited):
//! - POST /api/views - Count a post view
//! - POST /api/reading-sessions - Open a reading session
//! - PUT /api/reading-sessions/{id} - Heartbeat
//! - GET /api/stats/site - Site-wide counters
//!
//! Admin:
//! - GET /api/admin/analytics/overview?days=
//! - GET /api/admin/analytics/posts/{id}

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{referrer, visitor_hash};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{AnalyticsOverview, PostStats, ReadingSession, SessionHeartbeat, SiteCounter};

#[derive(Debug, Deserialize)]
pub struct RecordViewRequest {
    pub post_id: i64,
    /// `document.referrer` as seen by the page; falls back to the header
    #[serde(default)]
    pub referrer: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordViewResponse {
    pub counted: bool,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub post_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    30
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/stats/site", get(site_counter))
}

/// Visitor beacons, mounted behind the write rate limit
pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/views", post(record_view))
        .route("/reading-sessions", post(start_session))
        .route("/reading-sessions/{id}", put(heartbeat))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/overview", get(overview))
        .route("/posts/{id}", get(post_stats))
}

/// POST /api/views
async fn record_view(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RecordViewRequest>,
) -> Result<Json<RecordViewResponse>, ApiError> {
    let visitor = visitor_hash(&state, &headers);
    let referrer = body
        .referrer
        .filter(|r| !r.trim().is_empty())
        .or_else(|| referrer(&headers));
    let counted = state
        .analytics_service
        .record_view(body.post_id, &visitor, referrer.as_deref())
        .await?;
    Ok(Json(RecordViewResponse { counted }))
}

/// POST /api/reading-sessions
async fn start_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<ReadingSession>), ApiError> {
    let visitor = visitor_hash(&state, &headers);
    let session = state
        .analytics_service
        .start_session(body.post_id, &visitor)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// PUT /api/reading-sessions/{id}
async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(beat): Json<SessionHeartbeat>,
) -> Result<Json<ReadingSession>, ApiError> {
    let visitor = visitor_hash(&state, &headers);
    Ok(Json(
        state
            .analytics_service
            .heartbeat(&id, &visitor, &beat)
            .await?,
    ))
}

/// GET /api/stats/site
async fn site_counter(State(state): State<AppState>) -> Result<Json<SiteCounter>, ApiError> {
    Ok(Json(state.analytics_service.site_counter().await?))
}

/// GET /api/admin/analytics/overview
async fn overview(
    State(state): State<AppState>,
    Query(query): Query<OverviewQuery>,
) -> Result<Json<AnalyticsOverview>, ApiError> {
    Ok(Json(state.analytics_service.overview(query.days).await?))
}

/// GET /api/admin/analytics/posts/{id}
async fn post_stats(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostStats>, ApiError> {
    Ok(Json(state.analytics_service.post_stats(id).await?))
}
