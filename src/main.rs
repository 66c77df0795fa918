//! Folio - a personal blogging platform

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db,
};

/// Expired sessions and stale drafts
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Idle rate limiter windows
const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Folio {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");
    if config.analytics.uses_default_secret() {
        tracing::warn!(
            "analytics.visitor_secret is the default value; set FOLIO_ANALYTICS_VISITOR_SECRET so visitor hashes can't be reproduced"
        );
    }

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    // Initialize cache
    let cache = create_cache(&config.cache)?;
    tracing::info!("Cache initialized");

    tokio::fs::create_dir_all(&config.upload.path).await?;

    // Build application state
    let state = api::build_state(&config, pool, cache)?;
    if state.ai_service.is_enabled() {
        tracing::info!(model = %config.ai.model, "AI assistance enabled");
    }

    spawn_maintenance(state.clone());

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Periodic cleanup jobs
fn spawn_maintenance(state: AppState) {
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            loop {
                interval.tick().await;
                match state.admin_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Expired sessions removed"),
                    Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
                }
                match state.draft_service.purge_stale().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Stale drafts purged"),
                    Err(e) => tracing::warn!(error = %e, "Draft purge failed"),
                }
            }
        });
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            state.rate_limiters.run_pending_tasks().await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
