//! Authentication API endpoints
//!
//! - GET /api/auth/status - Whether an admin account exists yet
//! - POST /api/auth/register - First account (owner), or owner adding editors
//! - POST /api/auth/login - Log in; sets the `session` cookie
//! - POST /api/auth/logout
//! - GET /api/auth/me
//! - PUT /api/auth/password

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedAdmin};
use crate::models::{Admin, CreateAdminInput};
use crate::services::{ChangePasswordInput, LoginInput, LoginResult};

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    /// False until the owner account is registered
    pub has_admin: bool,
}

/// Unauthenticated routes that are safe to call freely
pub fn public_router() -> Router<AppState> {
    Router::new().route("/status", get(auth_status))
}

/// Credential routes, mounted behind the auth rate limit.
/// `register` expects `optional_auth` to have run.
pub fn credentials_router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
}

/// Routes for a signed-in admin
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/password", put(change_password))
}

fn session_cookie(token: &str, max_age_secs: i64) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token, max_age_secs
    ))
    .map_err(ApiError::internal_error)
}

/// GET /api/auth/status
async fn auth_status(State(state): State<AppState>) -> Result<Json<AuthStatusResponse>, ApiError> {
    Ok(Json(AuthStatusResponse {
        has_admin: state.admin_service.has_admin().await?,
    }))
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    current: Option<Extension<AuthenticatedAdmin>>,
    Json(input): Json<CreateAdminInput>,
) -> Result<(StatusCode, Json<Admin>), ApiError> {
    let caller = current.as_ref().map(|Extension(c)| &c.admin);
    let admin = state.admin_service.register(input, caller).await?;
    Ok((StatusCode::CREATED, Json(admin)))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let result: LoginResult = state.admin_service.login(input).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        session_cookie(&result.token, state.session_days * 24 * 60 * 60)?,
    );
    Ok((headers, Json(result)))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    current: AuthenticatedAdmin,
) -> Result<impl IntoResponse, ApiError> {
    state.admin_service.logout(&current.token).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/auth/me
async fn me(current: AuthenticatedAdmin) -> Json<Admin> {
    Json(current.admin)
}

/// PUT /api/auth/password
async fn change_password(
    State(state): State<AppState>,
    current: AuthenticatedAdmin,
    Json(input): Json<ChangePasswordInput>,
) -> Result<StatusCode, ApiError> {
    state
        .admin_service
        .change_password(&current.admin, &current.token, input)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
