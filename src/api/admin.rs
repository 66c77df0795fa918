//! Admin API endpoints
//!
//! - GET /api/admin/dashboard - Content, comment and traffic summary
//!
//! Owner only:
//! - GET/PUT /api/admin/settings - Site settings
//! - GET/POST /api/admin/admins - List accounts, add an editor
//! - DELETE /api/admin/admins/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedAdmin};
use crate::models::{Admin, CreateAdminInput, SiteCounter};
use crate::services::{PostCounts, SiteSettings, UpdateSettingsInput};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Response for dashboard stats
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub version: &'static str,
    pub posts: PostCounts,
    pub pending_comments: i64,
    pub traffic: SiteCounter,
    pub server: ServerStats,
}

#[derive(Debug, Serialize)]
pub struct ServerStats {
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

/// Routes for any signed-in admin
pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(get_dashboard))
}

/// Routes for the owner; `require_owner` is layered on by the caller
pub fn owner_router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings).put(update_settings))
        .route("/admins", get(list_admins).post(create_admin))
        .route("/admins/{id}", delete(delete_admin))
}

/// GET /api/admin/dashboard
async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let posts = state.post_service.counts().await?;
    let pending_comments = state.comment_service.pending_count().await?;
    let traffic = state.analytics_service.site_counter().await?;

    let uptime_seconds = state.request_stats.uptime_seconds();
    Ok(Json(DashboardResponse {
        version: APP_VERSION,
        posts,
        pending_comments,
        traffic,
        server: ServerStats {
            uptime_seconds,
            uptime_formatted: format_uptime(uptime_seconds),
            total_requests: state.request_stats.total_requests(),
            avg_response_time_ms: state.request_stats.avg_response_time_us() / 1000.0,
        },
    }))
}

/// Format uptime to human readable string
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

/// GET /api/admin/settings
async fn get_settings(State(state): State<AppState>) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.settings_service.get_site_settings().await?))
}

/// PUT /api/admin/settings
async fn update_settings(
    State(state): State<AppState>,
    Json(input): Json<UpdateSettingsInput>,
) -> Result<Json<SiteSettings>, ApiError> {
    let settings = state.settings_service.update_site_settings(input).await?;
    // Feeds embed the site name and URL
    state.seo_service.invalidate().await;
    Ok(Json(settings))
}

/// GET /api/admin/admins
async fn list_admins(
    State(state): State<AppState>,
    current: AuthenticatedAdmin,
) -> Result<Json<Vec<Admin>>, ApiError> {
    Ok(Json(state.admin_service.list(&current.admin).await?))
}

/// POST /api/admin/admins
async fn create_admin(
    State(state): State<AppState>,
    current: AuthenticatedAdmin,
    Json(input): Json<CreateAdminInput>,
) -> Result<(StatusCode, Json<Admin>), ApiError> {
    let admin = state
        .admin_service
        .register(input, Some(&current.admin))
        .await?;
    Ok((StatusCode::CREATED, Json(admin)))
}

/// DELETE /api/admin/admins/{id}
async fn delete_admin(
    State(state): State<AppState>,
    current: AuthenticatedAdmin,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.admin_service.delete(&current.admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m");
        assert_eq!(format_uptime(3 * 3600 + 60), "3h 1m");
        assert_eq!(format_uptime(2 * 86400 + 3600 + 120), "2d 1h 2m");
    }
}
