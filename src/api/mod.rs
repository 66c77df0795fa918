//! API layer - HTTP handlers and routing
//!
//! Everything is JSON under `/api`, except the SEO documents served at the
//! site root and uploaded files under `/uploads`.
//!
//! Route groups:
//! - public reads
//! - public writes (comments, reactions, analytics beacons), write rate limited
//! - credentials (login, register), auth rate limited
//! - admin routes, require a session
//! - owner routes (settings, admin accounts), require the owner role

pub mod admin;
pub mod ai;
pub mod analytics;
pub mod auth;
pub mod books;
pub mod comments;
pub mod common;
pub mod drafts;
pub mod middleware;
pub mod posts;
pub mod presets;
pub mod series;
pub mod site;
pub mod snippets;
pub mod tags;
pub mod upload;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAdminRepository, SqlxAnalyticsRepository, SqlxBookRepository, SqlxCommentRepository,
    SqlxDraftRepository, SqlxPostRepository, SqlxPresetRepository, SqlxSeriesRepository,
    SqlxSessionRepository, SqlxSettingsRepository, SqlxSnippetRepository, SqlxTagRepository,
};
use crate::db::DynDatabasePool;
use crate::services::markdown::MarkdownRenderer;
use crate::services::upload::PUBLIC_PREFIX;
use crate::services::{
    AdminService, AiService, AnalyticsService, BookService, CommentService, DraftService,
    PostService, PresetService, RateLimiters, SeoService, SeriesService, SettingsService,
    SnippetService, TagService, UploadService,
};

pub use middleware::{
    add_static_cache_headers, cache_control_api, cache_control_static, ApiError, AppState,
    AuthenticatedAdmin, RequestStats,
};

/// Wire repositories and services into the shared application state
pub fn build_state(
    config: &Config,
    pool: DynDatabasePool,
    cache: Arc<Cache>,
) -> anyhow::Result<AppState> {
    let admin_repo = SqlxAdminRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let post_repo = SqlxPostRepository::boxed(pool.clone());
    let tag_repo = SqlxTagRepository::boxed(pool.clone());
    let series_repo = SqlxSeriesRepository::boxed(pool.clone());
    let book_repo = SqlxBookRepository::boxed(pool.clone());
    let comment_repo = SqlxCommentRepository::boxed(pool.clone());
    let analytics_repo = SqlxAnalyticsRepository::boxed(pool.clone());
    let settings_repo = SqlxSettingsRepository::boxed(pool.clone());
    let snippet_repo = SqlxSnippetRepository::boxed(pool.clone());
    let preset_repo = SqlxPresetRepository::boxed(pool.clone());
    let draft_repo = SqlxDraftRepository::boxed(pool);

    let markdown_renderer = MarkdownRenderer::new();

    let settings_service = Arc::new(SettingsService::new(
        settings_repo,
        cache.clone(),
        &config.site,
    ));
    let post_service = Arc::new(PostService::new(
        post_repo.clone(),
        tag_repo.clone(),
        series_repo.clone(),
        cache.clone(),
        markdown_renderer.clone(),
    ));
    let seo_service = Arc::new(SeoService::new(
        post_repo.clone(),
        tag_repo.clone(),
        series_repo.clone(),
        book_repo.clone(),
        settings_service.clone(),
        cache.clone(),
    ));

    Ok(AppState {
        admin_service: Arc::new(AdminService::with_session_days(
            admin_repo,
            session_repo,
            config.auth.session_days,
        )),
        series_service: Arc::new(SeriesService::new(
            series_repo,
            post_repo.clone(),
            cache.clone(),
        )),
        book_service: Arc::new(BookService::new(book_repo, markdown_renderer)),
        tag_service: Arc::new(TagService::new(tag_repo, post_service.clone(), cache)),
        comment_service: Arc::new(CommentService::new(
            comment_repo,
            post_repo.clone(),
            settings_service.clone(),
        )),
        analytics_service: Arc::new(AnalyticsService::new(
            analytics_repo,
            post_repo.clone(),
            &config.analytics,
        )),
        snippet_service: Arc::new(SnippetService::new(snippet_repo)),
        preset_service: Arc::new(PresetService::new(preset_repo.clone())),
        ai_service: Arc::new(AiService::new(&config.ai, preset_repo, post_repo.clone())?),
        draft_service: Arc::new(DraftService::new(
            draft_repo,
            post_repo,
            post_service.clone(),
        )),
        upload_service: Arc::new(UploadService::new(&config.upload)),
        rate_limiters: Arc::new(RateLimiters::from_config(&config.rate_limit)),
        request_stats: Arc::new(RequestStats::new()),
        session_days: config.auth.session_days,
        post_service,
        settings_service,
        seo_service,
    })
}

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Owner routes (settings and admin accounts)
    let owner_routes = Router::new()
        .nest("/admin", admin::owner_router())
        .route_layer(axum_middleware::from_fn(middleware::require_owner))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // AI calls cost money upstream, so they get their own budget
    let ai_routes = Router::new()
        .nest("/admin/ai", ai::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_ai,
        ));

    // Admin routes (any signed-in admin)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .nest("/admin/posts", posts::admin_router())
        .nest("/admin/series", series::admin_router())
        .nest("/admin/books", books::admin_router())
        .nest("/admin/tags", tags::admin_router())
        .nest("/admin/comments", comments::admin_router())
        .nest("/admin/analytics", analytics::admin_router())
        .nest("/admin/snippets", snippets::router())
        .nest("/admin/presets", presets::router())
        .nest("/admin/drafts", drafts::router())
        .nest(
            "/admin/upload",
            upload::router(state.upload_service.max_file_size()),
        )
        .nest("/auth", auth::protected_router())
        .merge(ai_routes)
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Login and registration
    let credential_routes = Router::new()
        .nest("/auth", auth::credentials_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_auth,
        ));

    // Anonymous writes
    let write_routes = Router::new()
        .nest("/comments", comments::write_router())
        .merge(analytics::write_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::rate_limit_write,
        ));

    // Public routes
    Router::new()
        .nest("/posts", posts::public_router())
        .nest("/series", series::public_router())
        .nest("/books", books::public_router())
        .nest("/tags", tags::public_router())
        .nest("/comments", comments::public_router())
        .nest("/auth", auth::public_router())
        .nest("/site", site::router())
        .merge(analytics::public_router())
        .merge(write_routes)
        .merge(credential_routes)
        .merge(owner_routes)
        .merge(admin_routes)
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE]);

    if cors_origin == "*" {
        // Credentials cannot be combined with a wildcard origin
        return cors.allow_origin(Any);
    }
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin).allow_credentials(true),
        Err(e) => {
            tracing::warn!(origin = %cors_origin, error = %e, "Invalid CORS origin, allowing same-origin only");
            cors
        }
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let uploads = Router::new()
        .nest_service(
            PUBLIC_PREFIX,
            ServeDir::new(state.upload_service.upload_dir()),
        )
        .layer(axum_middleware::from_fn(add_static_cache_headers));

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .merge(site::documents_router())
        .merge(uploads)
        .layer(cors_layer(cors_origin))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::test_support::{insert_post, setup_pool};
    use crate::models::PostStatus;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn setup_app() -> (DynDatabasePool, Router) {
        let pool = setup_pool().await;
        let cache = create_cache(&CacheConfig::default()).unwrap();
        let state = build_state(&Config::default(), pool.clone(), cache).unwrap();
        (pool, build_router(state, "*"))
    }

    fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Register the owner and return a session token
    async fn owner_token(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                json!({"username": "owner", "email": "owner@example.com", "password": "correct-horse-battery"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({"username": "owner", "password": "correct-horse-battery"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_some());
        body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_public_site_info() {
        let (_pool, app) = setup_app().await;
        let response = app.oneshot(get("/api/site", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["site_name"].is_string());
        assert_eq!(body["ai_enabled"], false);
    }

    #[tokio::test]
    async fn test_auth_status_before_registration() {
        let (_pool, app) = setup_app().await;
        let response = app.oneshot(get("/api/auth/status", None)).await.unwrap();
        assert_eq!(body_json(response).await["has_admin"], false);
    }

    #[tokio::test]
    async fn test_admin_routes_require_session() {
        let (_pool, app) = setup_app().await;
        let response = app
            .clone()
            .oneshot(get("/api/admin/posts", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "UNAUTHORIZED");

        let response = app
            .oneshot(get("/api/admin/dashboard", Some("not-a-session")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_owner_session_flow() {
        let (_pool, app) = setup_app().await;
        let token = owner_token(&app).await;

        let response = app
            .clone()
            .oneshot(get("/api/auth/me", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me = body_json(response).await;
        assert_eq!(me["username"], "owner");
        assert_eq!(me["role"], "owner");
        assert!(me.get("password_hash").is_none());

        let response = app
            .clone()
            .oneshot(get("/api/admin/settings", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Registration is closed to anonymous callers once the owner exists
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                json!({"username": "intruder", "email": "x@example.com", "password": "correct-horse-battery"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/auth/logout", json!({}), Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get("/api/auth/me", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_editor_cannot_reach_owner_routes() {
        let (_pool, app) = setup_app().await;
        let owner = owner_token(&app).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/admin/admins",
                json!({"username": "editor", "email": "editor@example.com", "password": "correct-horse-battery"}),
                Some(&owner),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["role"], "editor");

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({"username": "editor", "password": "correct-horse-battery"}),
                None,
            ))
            .await
            .unwrap();
        let editor = body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(get("/api/admin/settings", Some(&editor)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(get("/api/admin/dashboard", Some(&editor)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_and_read_post() {
        let (_pool, app) = setup_app().await;
        let token = owner_token(&app).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/admin/posts",
                json!({
                    "title": "Hello Folio",
                    "content": "# Intro\n\nFirst post.",
                    "status": "published",
                    "tags": ["rust"]
                }),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(get("/api/posts/hello-folio", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["title"], "Hello Folio");
        assert_eq!(body["seo"]["open_graph"]["type"], "article");

        let response = app
            .oneshot(get("/api/posts?tag=rust", None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["total"], 1);
    }

    #[tokio::test]
    async fn test_unknown_post_is_not_found() {
        let (_pool, app) = setup_app().await;
        let response = app.oneshot(get("/api/posts/missing", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_comment_hides_email() {
        let (pool, app) = setup_app().await;
        let post_id = insert_post(&pool, "commented", PostStatus::Published).await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/comments",
                json!({
                    "post_id": post_id,
                    "author_name": "Reader",
                    "author_email": "reader@example.com",
                    "content": "Nice post"
                }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("x-ratelimit-remaining").is_some());
        let body = body_json(response).await;
        assert_eq!(body["author_name"], "Reader");
        assert!(body.get("author_email").is_none());
    }

    #[tokio::test]
    async fn test_record_view_counts_once() {
        let (pool, app) = setup_app().await;
        let post_id = insert_post(&pool, "viewed", PostStatus::Published).await;

        for expected in [true, false] {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/views",
                    json!({"post_id": post_id}),
                    None,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["counted"], expected);
        }

        let response = app.oneshot(get("/api/stats/site", None)).await.unwrap();
        assert_eq!(body_json(response).await["total_views"], 1);
    }

    #[tokio::test]
    async fn test_login_rate_limited() {
        let (_pool, app) = setup_app().await;
        let limit = Config::default().rate_limit.auth_max_requests;

        let mut last = StatusCode::OK;
        for _ in 0..=limit {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/auth/login",
                    json!({"username": "nobody", "password": "wrong-password"}),
                    None,
                ))
                .await
                .unwrap();
            last = response.status();
            if last == StatusCode::TOO_MANY_REQUESTS {
                assert!(response.headers().get(header::RETRY_AFTER).is_some());
                assert_eq!(body_json(response).await["error"]["code"], "RATE_LIMITED");
                break;
            }
            assert_eq!(last, StatusCode::UNAUTHORIZED);
        }
        assert_eq!(last, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_seo_documents() {
        let (_pool, app) = setup_app().await;

        let response = app
            .clone()
            .oneshot(get("/robots.txt", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let response = app.oneshot(get("/sitemap.xml", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CACHE_CONTROL]
            .to_str()
            .unwrap()
            .contains("max-age=300"));
    }

    #[test]
    fn test_cors_layer_accepts_any_origin_string() {
        let _ = cors_layer("*");
        let _ = cors_layer("https://blog.example.com");
        let _ = cors_layer("not a header\n");
    }
}
