//! Public site information and SEO documents
//!
//! - GET /api/site - Public site settings
//! - GET /sitemap.xml, /feed.xml, /robots.txt

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{cache_control_api, ApiError, AppState};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Response for public site info
#[derive(Debug, Serialize)]
pub struct SiteInfoResponse {
    pub version: &'static str,
    pub site_name: String,
    pub site_description: String,
    pub site_url: String,
    pub author_name: String,
    pub comment_moderation: bool,
    pub posts_per_page: u32,
    pub ai_enabled: bool,
}

/// Mounted under /api/site
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_site_info))
}

/// Mounted at the root
pub fn documents_router() -> Router<AppState> {
    Router::new()
        .route("/sitemap.xml", get(sitemap))
        .route("/feed.xml", get(feed))
        .route("/robots.txt", get(robots))
}

/// GET /api/site
async fn get_site_info(State(state): State<AppState>) -> Result<Json<SiteInfoResponse>, ApiError> {
    let settings = state.settings_service.get_site_settings().await?;
    Ok(Json(SiteInfoResponse {
        version: APP_VERSION,
        site_name: settings.site_name,
        site_description: settings.site_description,
        site_url: settings.site_url,
        author_name: settings.author_name,
        comment_moderation: settings.comment_moderation,
        posts_per_page: settings.posts_per_page,
        ai_enabled: state.ai_service.is_enabled(),
    }))
}

fn document(body: String, content_type: &'static str) -> Response {
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&cache_control_api(300, Some(600))) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    response
}

/// GET /sitemap.xml
async fn sitemap(State(state): State<AppState>) -> Result<Response, ApiError> {
    let xml = state.seo_service.sitemap_xml().await?;
    Ok(document(xml, "application/xml; charset=utf-8"))
}

/// GET /feed.xml
async fn feed(State(state): State<AppState>) -> Result<Response, ApiError> {
    let xml = state.seo_service.rss_xml().await?;
    Ok(document(xml, "application/rss+xml; charset=utf-8"))
}

/// GET /robots.txt
async fn robots(State(state): State<AppState>) -> Result<Response, ApiError> {
    let text = state.seo_service.robots_txt().await?;
    Ok(document(text, "text/plain; charset=utf-8"))
}
