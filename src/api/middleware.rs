//! API middleware
//!
//! Shared state, the error type every handler returns, session
//! authentication, the owner guard, per-scope rate limiting and request
//! statistics.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::models::Admin;
use crate::services::{
    AdminService, AdminServiceError, AiService, AiServiceError, AnalyticsService,
    AnalyticsServiceError, BookService, BookServiceError, CommentService, CommentServiceError,
    DraftService, DraftServiceError, PostService, PostServiceError, PresetService,
    PresetServiceError, RateLimitDecision, RateLimitScope, RateLimiters, SeoService,
    SeoServiceError, SeriesService, SeriesServiceError, SettingsService, SettingsServiceError,
    SnippetService, SnippetServiceError, TagService, TagServiceError, UploadService,
    UploadServiceError,
};

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Total response time in microseconds (for calculating average)
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub admin_service: Arc<AdminService>,
    pub post_service: Arc<PostService>,
    pub series_service: Arc<SeriesService>,
    pub book_service: Arc<BookService>,
    pub tag_service: Arc<TagService>,
    pub comment_service: Arc<CommentService>,
    pub analytics_service: Arc<AnalyticsService>,
    pub settings_service: Arc<SettingsService>,
    pub seo_service: Arc<SeoService>,
    pub snippet_service: Arc<SnippetService>,
    pub preset_service: Arc<PresetService>,
    pub ai_service: Arc<AiService>,
    pub draft_service: Arc<DraftService>,
    pub upload_service: Arc<UploadService>,
    pub rate_limiters: Arc<RateLimiters>,
    pub request_stats: Arc<RequestStats>,
    /// Session cookie lifetime
    pub session_days: i64,
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMITED",
            "Too many requests, slow down",
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    pub fn upstream_error(message: impl Into<String>) -> Self {
        Self::new("UPSTREAM_ERROR", message)
    }

    pub fn ai_disabled() -> Self {
        Self::new("AI_DISABLED", "AI assistance is not configured")
    }

    /// Logs the cause; clients only see a generic message
    pub fn internal_error(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", cause);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            "UPSTREAM_ERROR" => StatusCode::BAD_GATEWAY,
            "AI_DISABLED" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<PostServiceError> for ApiError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound(what) => Self::not_found(format!("Post not found: {}", what)),
            PostServiceError::ValidationError(msg) => Self::validation_error(msg),
            PostServiceError::DuplicateSlug(slug) => {
                Self::conflict(format!("Slug already in use: {}", slug))
            }
            PostServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<SeriesServiceError> for ApiError {
    fn from(e: SeriesServiceError) -> Self {
        match e {
            SeriesServiceError::NotFound(what) => {
                Self::not_found(format!("Series not found: {}", what))
            }
            SeriesServiceError::ValidationError(msg) => Self::validation_error(msg),
            SeriesServiceError::DuplicateSlug(slug) => {
                Self::conflict(format!("Slug already in use: {}", slug))
            }
            SeriesServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<BookServiceError> for ApiError {
    fn from(e: BookServiceError) -> Self {
        match e {
            BookServiceError::NotFound(what) => Self::not_found(format!("Book not found: {}", what)),
            BookServiceError::ValidationError(msg) => Self::validation_error(msg),
            BookServiceError::DuplicateSlug(slug) => {
                Self::conflict(format!("Slug already in use: {}", slug))
            }
            BookServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::NotFound(what) => Self::not_found(format!("Tag not found: {}", what)),
            TagServiceError::ValidationError(msg) => Self::validation_error(msg),
            TagServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(e: CommentServiceError) -> Self {
        match e {
            CommentServiceError::NotFound(what) => {
                Self::not_found(format!("Not found: {}", what))
            }
            CommentServiceError::ValidationError(msg) => Self::validation_error(msg),
            CommentServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<AnalyticsServiceError> for ApiError {
    fn from(e: AnalyticsServiceError) -> Self {
        match e {
            AnalyticsServiceError::NotFound(what) => {
                Self::not_found(format!("Not found: {}", what))
            }
            AnalyticsServiceError::ValidationError(msg) => Self::validation_error(msg),
            AnalyticsServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<SettingsServiceError> for ApiError {
    fn from(e: SettingsServiceError) -> Self {
        match e {
            SettingsServiceError::ValidationError(msg) => Self::validation_error(msg),
            SettingsServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<SeoServiceError> for ApiError {
    fn from(e: SeoServiceError) -> Self {
        match e {
            SeoServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<SnippetServiceError> for ApiError {
    fn from(e: SnippetServiceError) -> Self {
        match e {
            SnippetServiceError::NotFound(what) => {
                Self::not_found(format!("Snippet not found: {}", what))
            }
            SnippetServiceError::ValidationError(msg) => Self::validation_error(msg),
            SnippetServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<PresetServiceError> for ApiError {
    fn from(e: PresetServiceError) -> Self {
        match e {
            PresetServiceError::NotFound(what) => {
                Self::not_found(format!("Preset not found: {}", what))
            }
            PresetServiceError::ValidationError(msg) => Self::validation_error(msg),
            PresetServiceError::DuplicateName(name) => {
                Self::conflict(format!("Preset name already in use: {}", name))
            }
            PresetServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<AiServiceError> for ApiError {
    fn from(e: AiServiceError) -> Self {
        match e {
            AiServiceError::Disabled => Self::ai_disabled(),
            AiServiceError::NotFound(what) => Self::not_found(format!("{} not found", what)),
            AiServiceError::ValidationError(msg) => Self::validation_error(msg),
            AiServiceError::Upstream(msg) => Self::upstream_error(msg),
            AiServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<DraftServiceError> for ApiError {
    fn from(e: DraftServiceError) -> Self {
        match e {
            DraftServiceError::NotFound(what) => {
                Self::not_found(format!("Draft not found: {}", what))
            }
            DraftServiceError::ValidationError(msg) => Self::validation_error(msg),
            DraftServiceError::Post(e) => e.into(),
            DraftServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<AdminServiceError> for ApiError {
    fn from(e: AdminServiceError) -> Self {
        match e {
            AdminServiceError::AuthenticationError(msg) => Self::unauthorized(msg),
            AdminServiceError::Forbidden(msg) => Self::forbidden(msg),
            AdminServiceError::ValidationError(msg) => Self::validation_error(msg),
            AdminServiceError::AdminExists(msg) => Self::conflict(msg),
            AdminServiceError::NotFound(what) => {
                Self::not_found(format!("Admin not found: {}", what))
            }
            AdminServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<UploadServiceError> for ApiError {
    fn from(e: UploadServiceError) -> Self {
        match e {
            UploadServiceError::ValidationError(msg) => Self::validation_error(msg),
            UploadServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated admin extracted from request, with the token they used
#[derive(Debug, Clone)]
pub struct AuthenticatedAdmin {
    pub admin: Admin,
    pub token: String,
}

impl<S> FromRequestParts<S> for AuthenticatedAdmin
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedAdmin>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Session token from `Authorization: Bearer` or the `session` cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_str) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    let cookie_str = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_str
        .split(';')
        .filter_map(|c| c.trim().strip_prefix("session="))
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let admin = state
        .admin_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request
        .extensions_mut()
        .insert(AuthenticatedAdmin { admin, token });
    Ok(next.run(request).await)
}

/// Owner authorization middleware; runs after `require_auth`
pub async fn require_owner(request: Request, next: Next) -> Result<Response, ApiError> {
    let current = request
        .extensions()
        .get::<AuthenticatedAdmin>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !current.admin.is_owner() {
        return Err(ApiError::forbidden("Owner permission required"));
    }

    Ok(next.run(request).await)
}

/// Optional authentication: attaches the admin when a valid token is sent
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        if let Ok(Some(admin)) = state.admin_service.validate_session(&token).await {
            request
                .extensions_mut()
                .insert(AuthenticatedAdmin { admin, token });
        }
    }
    next.run(request).await
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Client address from proxy headers, first `X-Forwarded-For` hop winning
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        })
        .unwrap_or("unknown")
        .to_string()
}

fn rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
}

async fn enforce_rate_limit(
    state: &AppState,
    scope: RateLimitScope,
    request: Request,
    next: Next,
) -> Response {
    if !state.rate_limiters.is_enabled() {
        return next.run(request).await;
    }

    let client = client_ip(request.headers());
    let decision = state.rate_limiters.check(scope, &client).await;
    if !decision.allowed {
        let retry_after = decision.retry_after_secs();
        tracing::warn!(scope = %scope, client = %client, "Rate limit exceeded");
        let mut response = ApiError::rate_limited(retry_after).into_response();
        rate_limit_headers(response.headers_mut(), &decision);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    let mut response = next.run(request).await;
    rate_limit_headers(response.headers_mut(), &decision);
    response
}

pub async fn rate_limit_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    enforce_rate_limit(&state, RateLimitScope::Auth, request, next).await
}

pub async fn rate_limit_write(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    enforce_rate_limit(&state, RateLimitScope::Write, request, next).await
}

pub async fn rate_limit_ai(State(state): State<AppState>, request: Request, next: Next) -> Response {
    enforce_rate_limit(&state, RateLimitScope::Ai, request, next).await
}

// ============================================================================
// Request statistics and cache headers
// ============================================================================

/// Records request count and response time
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state
        .request_stats
        .record(start.elapsed().as_micros() as u64);
    response
}

/// Build Cache-Control header for static assets
pub fn cache_control_static(max_age: u32, immutable: bool) -> String {
    if immutable {
        format!("public, max-age={}, immutable", max_age)
    } else {
        format!("public, max-age={}", max_age)
    }
}

/// Build Cache-Control header for public documents
pub fn cache_control_api(max_age: u32, stale_while_revalidate: Option<u32>) -> String {
    match stale_while_revalidate {
        Some(swr) => format!("public, max-age={}, stale-while-revalidate={}", max_age, swr),
        None => format!("public, max-age={}", max_age),
    }
}

/// Uploaded files never change under their uuid names
pub async fn add_static_cache_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    if response.status().is_success() {
        if let Ok(value) = HeaderValue::from_str(&cache_control_static(31_536_000, true)) {
            response.headers_mut().insert(header::CACHE_CONTROL, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let map = headers(&[("authorization", "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&map), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let map = headers(&[("cookie", "theme=dark; session=test-token-456")]);
        assert_eq!(extract_session_token(&map), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let map = headers(&[
            ("authorization", "Bearer bearer-token"),
            ("cookie", "session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&map), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        assert!(extract_session_token(&headers(&[("authorization", "Basic abc")])).is_none());
        assert!(extract_session_token(&headers(&[("cookie", "session=")])).is_none());
    }

    #[test]
    fn test_client_ip() {
        assert_eq!(
            client_ip(&headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")])),
            "203.0.113.7"
        );
        assert_eq!(client_ip(&headers(&[("x-real-ip", "198.51.100.2")])), "198.51.100.2");
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_api_error_status_mapping() {
        let cases = [
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (ApiError::rate_limited(3), StatusCode::TOO_MANY_REQUESTS),
            (ApiError::upstream_error("x"), StatusCode::BAD_GATEWAY),
            (ApiError::ai_disabled(), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::internal_error("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{}", error.error.code);
        }
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let error = ApiError::from(PostServiceError::InternalError(anyhow::anyhow!(
            "database password is hunter2"
        )));
        assert_eq!(error.error.code, "INTERNAL_ERROR");
        assert!(!error.error.message.contains("hunter2"));
    }

    #[test]
    fn test_service_error_conversions() {
        assert_eq!(
            ApiError::from(PostServiceError::DuplicateSlug("hello".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AiServiceError::Upstream("timeout".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(AdminServiceError::AuthenticationError("bad".into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(DraftServiceError::Post(PostServiceError::NotFound("1".into())))
                .status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_rate_limited_details() {
        let error = ApiError::rate_limited(42);
        assert_eq!(error.error.details, Some(serde_json::json!({ "retry_after": 42 })));
    }

    #[test]
    fn test_cache_control() {
        assert_eq!(
            cache_control_static(3600, true),
            "public, max-age=3600, immutable"
        );
        assert!(cache_control_api(300, Some(3600)).contains("stale-while-revalidate=3600"));
        assert!(!cache_control_api(300, None).contains("stale-while-revalidate"));
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(100);
        stats.record(300);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.avg_response_time_us(), 200.0);
    }
}
