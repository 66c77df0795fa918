//! Analytics repository
//!
//! Raw page views and reading sessions, plus the aggregate queries behind the
//! dashboard. Views are only ever inserted together with the post's
//! `view_count` increment, so the counter and the view log stay in step.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    DailyViews, PostStats, PostView, ReadingSession, ReadingSummary, ReferrerCount, SiteCounter,
    TopPost,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Analytics repository trait
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Insert a view and bump the post's view counter in one transaction.
    ///
    /// Nothing is written when the visitor already has a view of the post at
    /// or after `dedup_since`; that case returns `None`.
    async fn record_view(&self, view: &PostView, dedup_since: DateTime<Utc>) -> Result<Option<PostView>>;

    async fn create_session(&self, session: &ReadingSession) -> Result<()>;

    async fn get_session(&self, id: &str) -> Result<Option<ReadingSession>>;

    async fn update_session(&self, session: &ReadingSession) -> Result<()>;

    async fn post_stats(&self, post_id: i64) -> Result<PostStats>;

    /// Total views and distinct visitors since a point in time
    async fn view_totals(&self, since: DateTime<Utc>) -> Result<(i64, i64)>;

    async fn daily_views(&self, since: DateTime<Utc>) -> Result<Vec<DailyViews>>;

    async fn top_posts(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<TopPost>>;

    async fn top_referrers(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<ReferrerCount>>;

    async fn reading_summary(&self, since: DateTime<Utc>) -> Result<ReadingSummary>;

    /// All-time totals
    async fn site_counter(&self) -> Result<SiteCounter>;
}

/// SQLx-based analytics repository (SQLite and MySQL)
pub struct SqlxAnalyticsRepository {
    pool: DynDatabasePool,
}

impl SqlxAnalyticsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AnalyticsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AnalyticsRepository for SqlxAnalyticsRepository {
    async fn record_view(&self, view: &PostView, dedup_since: DateTime<Utc>) -> Result<Option<PostView>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                record_view_sqlite(self.pool.as_sqlite().unwrap(), view, dedup_since).await
            }
            DatabaseDriver::Mysql => {
                record_view_mysql(self.pool.as_mysql().unwrap(), view, dedup_since).await
            }
        }
    }

    async fn create_session(&self, session: &ReadingSession) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_session_sqlite(self.pool.as_sqlite().unwrap(), session).await
            }
            DatabaseDriver::Mysql => {
                create_session_mysql(self.pool.as_mysql().unwrap(), session).await
            }
        }
    }

    async fn get_session(&self, id: &str) -> Result<Option<ReadingSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_session_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_session_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn update_session(&self, session: &ReadingSession) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_session_sqlite(self.pool.as_sqlite().unwrap(), session).await
            }
            DatabaseDriver::Mysql => {
                update_session_mysql(self.pool.as_mysql().unwrap(), session).await
            }
        }
    }

    async fn post_stats(&self, post_id: i64) -> Result<PostStats> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                post_stats_sqlite(self.pool.as_sqlite().unwrap(), post_id).await
            }
            DatabaseDriver::Mysql => {
                post_stats_mysql(self.pool.as_mysql().unwrap(), post_id).await
            }
        }
    }

    async fn view_totals(&self, since: DateTime<Utc>) -> Result<(i64, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                view_totals_sqlite(self.pool.as_sqlite().unwrap(), since).await
            }
            DatabaseDriver::Mysql => {
                view_totals_mysql(self.pool.as_mysql().unwrap(), since).await
            }
        }
    }

    async fn daily_views(&self, since: DateTime<Utc>) -> Result<Vec<DailyViews>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                daily_views_sqlite(self.pool.as_sqlite().unwrap(), since).await
            }
            DatabaseDriver::Mysql => {
                daily_views_mysql(self.pool.as_mysql().unwrap(), since).await
            }
        }
    }

    async fn top_posts(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<TopPost>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                top_posts_sqlite(self.pool.as_sqlite().unwrap(), since, limit).await
            }
            DatabaseDriver::Mysql => {
                top_posts_mysql(self.pool.as_mysql().unwrap(), since, limit).await
            }
        }
    }

    async fn top_referrers(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<ReferrerCount>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                top_referrers_sqlite(self.pool.as_sqlite().unwrap(), since, limit).await
            }
            DatabaseDriver::Mysql => {
                top_referrers_mysql(self.pool.as_mysql().unwrap(), since, limit).await
            }
        }
    }

    async fn reading_summary(&self, since: DateTime<Utc>) -> Result<ReadingSummary> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                reading_summary_sqlite(self.pool.as_sqlite().unwrap(), since).await
            }
            DatabaseDriver::Mysql => {
                reading_summary_mysql(self.pool.as_mysql().unwrap(), since).await
            }
        }
    }

    async fn site_counter(&self) -> Result<SiteCounter> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                site_counter_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                site_counter_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn record_view_sqlite(
    pool: &SqlitePool,
    view: &PostView,
    dedup_since: DateTime<Utc>,
) -> Result<Option<PostView>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // The duplicate check and the insert are one statement
    let result = sqlx::query(
        r#"
        INSERT INTO post_views (post_id, visitor_hash, referrer, viewed_at)
        SELECT ?, ?, ?, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM post_views
            WHERE post_id = ? AND visitor_hash = ? AND viewed_at >= ?
        )
        "#,
    )
    .bind(view.post_id)
    .bind(&view.visitor_hash)
    .bind(&view.referrer)
    .bind(view.viewed_at)
    .bind(view.post_id)
    .bind(&view.visitor_hash)
    .bind(dedup_since)
    .execute(&mut *tx)
    .await
    .context("Failed to record view")?;

    if result.rows_affected() != 1 {
        tx.rollback().await.context("Failed to roll back view")?;
        return Ok(None);
    }

    sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ?")
        .bind(view.post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment view count")?;

    tx.commit().await.context("Failed to commit view")?;

    let mut recorded = view.clone();
    recorded.id = result.last_insert_rowid();
    Ok(Some(recorded))
}

async fn create_session_sqlite(pool: &SqlitePool, session: &ReadingSession) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reading_sessions (
            id, post_id, visitor_hash, started_at, last_active_at,
            duration_seconds, max_scroll_depth, completed
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.post_id)
    .bind(&session.visitor_hash)
    .bind(session.started_at)
    .bind(session.last_active_at)
    .bind(session.duration_seconds)
    .bind(session.max_scroll_depth)
    .bind(session.completed)
    .execute(pool)
    .await
    .context("Failed to create reading session")?;
    Ok(())
}

async fn get_session_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<ReadingSession>> {
    let row = sqlx::query(
        r#"
        SELECT id, post_id, visitor_hash, started_at, last_active_at,
               duration_seconds, max_scroll_depth, completed
        FROM reading_sessions WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get reading session")?;

    Ok(row.map(|r| ReadingSession {
        id: r.get("id"),
        post_id: r.get("post_id"),
        visitor_hash: r.get("visitor_hash"),
        started_at: r.get("started_at"),
        last_active_at: r.get("last_active_at"),
        duration_seconds: r.get("duration_seconds"),
        max_scroll_depth: r.get("max_scroll_depth"),
        completed: r.get("completed"),
    }))
}

async fn update_session_sqlite(pool: &SqlitePool, session: &ReadingSession) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE reading_sessions
        SET last_active_at = ?, duration_seconds = ?, max_scroll_depth = ?, completed = ?
        WHERE id = ?
        "#,
    )
    .bind(session.last_active_at)
    .bind(session.duration_seconds)
    .bind(session.max_scroll_depth)
    .bind(session.completed)
    .bind(&session.id)
    .execute(pool)
    .await
    .context("Failed to update reading session")?;
    Ok(())
}

async fn post_stats_sqlite(pool: &SqlitePool, post_id: i64) -> Result<PostStats> {
    let views = sqlx::query(
        "SELECT COUNT(*) AS views, COUNT(DISTINCT visitor_hash) AS visitors FROM post_views WHERE post_id = ?",
    )
    .bind(post_id)
    .fetch_one(pool)
    .await
    .context("Failed to count post views")?;

    let sessions = sqlx::query(
        r#"
        SELECT COUNT(*) AS sessions,
               COALESCE(AVG(duration_seconds), 0.0) AS avg_duration,
               COALESCE(SUM(CASE WHEN completed THEN 1 ELSE 0 END), 0) AS completed
        FROM reading_sessions
        WHERE post_id = ?
        "#,
    )
    .bind(post_id)
    .fetch_one(pool)
    .await
    .context("Failed to summarize reading sessions")?;

    let session_count: i64 = sessions.get("sessions");
    let completed: i64 = sessions.get("completed");
    Ok(PostStats {
        post_id,
        views: views.get("views"),
        unique_visitors: views.get("visitors"),
        reading_sessions: session_count,
        avg_read_seconds: sessions.get("avg_duration"),
        completion_rate: if session_count > 0 {
            completed as f64 / session_count as f64
        } else {
            0.0
        },
    })
}

async fn view_totals_sqlite(pool: &SqlitePool, since: DateTime<Utc>) -> Result<(i64, i64)> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS views, COUNT(DISTINCT visitor_hash) AS visitors FROM post_views WHERE viewed_at >= ?",
    )
    .bind(since)
    .fetch_one(pool)
    .await
    .context("Failed to count views")?;
    Ok((row.get("views"), row.get("visitors")))
}

async fn daily_views_sqlite(pool: &SqlitePool, since: DateTime<Utc>) -> Result<Vec<DailyViews>> {
    let rows = sqlx::query(
        r#"
        SELECT SUBSTR(viewed_at, 1, 10) AS day,
               COUNT(*) AS views,
               COUNT(DISTINCT visitor_hash) AS visitors
        FROM post_views
        WHERE viewed_at >= ?
        GROUP BY day
        ORDER BY day ASC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("Failed to get daily views")?;

    Ok(rows
        .iter()
        .map(|r| DailyViews {
            date: r.get("day"),
            views: r.get("views"),
            visitors: r.get("visitors"),
        })
        .collect())
}

async fn top_posts_sqlite(pool: &SqlitePool, since: DateTime<Utc>, limit: i64) -> Result<Vec<TopPost>> {
    let rows = sqlx::query(
        r#"
        SELECT p.id AS post_id, p.slug, p.title, COUNT(v.id) AS views
        FROM post_views v
        INNER JOIN posts p ON p.id = v.post_id
        WHERE v.viewed_at >= ?
        GROUP BY p.id, p.slug, p.title
        ORDER BY views DESC, p.id ASC
        LIMIT ?
        "#,
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to get top posts")?;

    Ok(rows
        .iter()
        .map(|r| TopPost {
            post_id: r.get("post_id"),
            slug: r.get("slug"),
            title: r.get("title"),
            views: r.get("views"),
        })
        .collect())
}

async fn top_referrers_sqlite(
    pool: &SqlitePool,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ReferrerCount>> {
    let rows = sqlx::query(
        r#"
        SELECT referrer, COUNT(*) AS views
        FROM post_views
        WHERE viewed_at >= ? AND referrer IS NOT NULL AND referrer != ''
        GROUP BY referrer
        ORDER BY views DESC, referrer ASC
        LIMIT ?
        "#,
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to get top referrers")?;

    Ok(rows
        .iter()
        .map(|r| ReferrerCount {
            referrer: r.get("referrer"),
            views: r.get("views"),
        })
        .collect())
}

async fn reading_summary_sqlite(pool: &SqlitePool, since: DateTime<Utc>) -> Result<ReadingSummary> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS sessions,
               COALESCE(AVG(duration_seconds), 0.0) AS avg_duration,
               COALESCE(AVG(max_scroll_depth), 0.0) AS avg_scroll
        FROM reading_sessions
        WHERE started_at >= ?
        "#,
    )
    .bind(since)
    .fetch_one(pool)
    .await
    .context("Failed to summarize reading")?;

    Ok(ReadingSummary {
        sessions: row.get("sessions"),
        avg_duration_seconds: row.get("avg_duration"),
        avg_scroll_depth: row.get("avg_scroll"),
    })
}

async fn site_counter_sqlite(pool: &SqlitePool) -> Result<SiteCounter> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS views, COUNT(DISTINCT visitor_hash) AS visitors FROM post_views",
    )
    .fetch_one(pool)
    .await
    .context("Failed to read site counter")?;
    Ok(SiteCounter {
        total_views: row.get("views"),
        unique_visitors: row.get("visitors"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn record_view_mysql(
    pool: &MySqlPool,
    view: &PostView,
    dedup_since: DateTime<Utc>,
) -> Result<Option<PostView>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // The duplicate check and the insert are one statement
    let result = sqlx::query(
        r#"
        INSERT INTO post_views (post_id, visitor_hash, referrer, viewed_at)
        SELECT ?, ?, ?, ? FROM DUAL
        WHERE NOT EXISTS (
            SELECT 1 FROM post_views
            WHERE post_id = ? AND visitor_hash = ? AND viewed_at >= ?
        )
        "#,
    )
    .bind(view.post_id)
    .bind(&view.visitor_hash)
    .bind(&view.referrer)
    .bind(view.viewed_at)
    .bind(view.post_id)
    .bind(&view.visitor_hash)
    .bind(dedup_since)
    .execute(&mut *tx)
    .await
    .context("Failed to record view")?;

    if result.rows_affected() != 1 {
        tx.rollback().await.context("Failed to roll back view")?;
        return Ok(None);
    }

    sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ?")
        .bind(view.post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment view count")?;

    tx.commit().await.context("Failed to commit view")?;

    let mut recorded = view.clone();
    recorded.id = result.last_insert_id() as i64;
    Ok(Some(recorded))
}

async fn create_session_mysql(pool: &MySqlPool, session: &ReadingSession) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reading_sessions (
            id, post_id, visitor_hash, started_at, last_active_at,
            duration_seconds, max_scroll_depth, completed
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.post_id)
    .bind(&session.visitor_hash)
    .bind(session.started_at)
    .bind(session.last_active_at)
    .bind(session.duration_seconds)
    .bind(session.max_scroll_depth)
    .bind(session.completed)
    .execute(pool)
    .await
    .context("Failed to create reading session")?;
    Ok(())
}

async fn get_session_mysql(pool: &MySqlPool, id: &str) -> Result<Option<ReadingSession>> {
    let row = sqlx::query(
        r#"
        SELECT id, post_id, visitor_hash, started_at, last_active_at,
               duration_seconds, max_scroll_depth, completed
        FROM reading_sessions WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get reading session")?;

    Ok(row.map(|r| ReadingSession {
        id: r.get("id"),
        post_id: r.get("post_id"),
        visitor_hash: r.get("visitor_hash"),
        started_at: r.get("started_at"),
        last_active_at: r.get("last_active_at"),
        duration_seconds: r.get("duration_seconds"),
        max_scroll_depth: r.get("max_scroll_depth"),
        completed: r.get("completed"),
    }))
}

async fn update_session_mysql(pool: &MySqlPool, session: &ReadingSession) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE reading_sessions
        SET last_active_at = ?, duration_seconds = ?, max_scroll_depth = ?, completed = ?
        WHERE id = ?
        "#,
    )
    .bind(session.last_active_at)
    .bind(session.duration_seconds)
    .bind(session.max_scroll_depth)
    .bind(session.completed)
    .bind(&session.id)
    .execute(pool)
    .await
    .context("Failed to update reading session")?;
    Ok(())
}

async fn post_stats_mysql(pool: &MySqlPool, post_id: i64) -> Result<PostStats> {
    let views = sqlx::query(
        "SELECT COUNT(*) AS views, COUNT(DISTINCT visitor_hash) AS visitors FROM post_views WHERE post_id = ?",
    )
    .bind(post_id)
    .fetch_one(pool)
    .await
    .context("Failed to count post views")?;

    let sessions = sqlx::query(
        r#"
        SELECT COUNT(*) AS sessions,
               CAST(COALESCE(AVG(duration_seconds), 0) AS DOUBLE) AS avg_duration,
               CAST(COALESCE(SUM(CASE WHEN completed THEN 1 ELSE 0 END), 0) AS SIGNED) AS completed
        FROM reading_sessions
        WHERE post_id = ?
        "#,
    )
    .bind(post_id)
    .fetch_one(pool)
    .await
    .context("Failed to summarize reading sessions")?;

    let session_count: i64 = sessions.get("sessions");
    let completed: i64 = sessions.get("completed");
    Ok(PostStats {
        post_id,
        views: views.get("views"),
        unique_visitors: views.get("visitors"),
        reading_sessions: session_count,
        avg_read_seconds: sessions.get("avg_duration"),
        completion_rate: if session_count > 0 {
            completed as f64 / session_count as f64
        } else {
            0.0
        },
    })
}

async fn view_totals_mysql(pool: &MySqlPool, since: DateTime<Utc>) -> Result<(i64, i64)> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS views, COUNT(DISTINCT visitor_hash) AS visitors FROM post_views WHERE viewed_at >= ?",
    )
    .bind(since)
    .fetch_one(pool)
    .await
    .context("Failed to count views")?;
    Ok((row.get("views"), row.get("visitors")))
}

async fn daily_views_mysql(pool: &MySqlPool, since: DateTime<Utc>) -> Result<Vec<DailyViews>> {
    let rows = sqlx::query(
        r#"
        SELECT DATE_FORMAT(viewed_at, '%Y-%m-%d') AS day,
               COUNT(*) AS views,
               COUNT(DISTINCT visitor_hash) AS visitors
        FROM post_views
        WHERE viewed_at >= ?
        GROUP BY day
        ORDER BY day ASC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("Failed to get daily views")?;

    Ok(rows
        .iter()
        .map(|r| DailyViews {
            date: r.get("day"),
            views: r.get("views"),
            visitors: r.get("visitors"),
        })
        .collect())
}

async fn top_posts_mysql(pool: &MySqlPool, since: DateTime<Utc>, limit: i64) -> Result<Vec<TopPost>> {
    let rows = sqlx::query(
        r#"
        SELECT p.id AS post_id, p.slug, p.title, COUNT(v.id) AS views
        FROM post_views v
        INNER JOIN posts p ON p.id = v.post_id
        WHERE v.viewed_at >= ?
        GROUP BY p.id, p.slug, p.title
        ORDER BY views DESC, p.id ASC
        LIMIT ?
        "#,
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to get top posts")?;

    Ok(rows
        .iter()
        .map(|r| TopPost {
            post_id: r.get("post_id"),
            slug: r.get("slug"),
            title: r.get("title"),
            views: r.get("views"),
        })
        .collect())
}

async fn top_referrers_mysql(
    pool: &MySqlPool,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ReferrerCount>> {
    let rows = sqlx::query(
        r#"
        SELECT referrer, COUNT(*) AS views
        FROM post_views
        WHERE viewed_at >= ? AND referrer IS NOT NULL AND referrer != ''
        GROUP BY referrer
        ORDER BY views DESC, referrer ASC
        LIMIT ?
        "#,
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to get top referrers")?;

    Ok(rows
        .iter()
        .map(|r| ReferrerCount {
            referrer: r.get("referrer"),
            views: r.get("views"),
        })
        .collect())
}

async fn reading_summary_mysql(pool: &MySqlPool, since: DateTime<Utc>) -> Result<ReadingSummary> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS sessions,
               CAST(COALESCE(AVG(duration_seconds), 0) AS DOUBLE) AS avg_duration,
               CAST(COALESCE(AVG(max_scroll_depth), 0) AS DOUBLE) AS avg_scroll
        FROM reading_sessions
        WHERE started_at >= ?
        "#,
    )
    .bind(since)
    .fetch_one(pool)
    .await
    .context("Failed to summarize reading")?;

    Ok(ReadingSummary {
        sessions: row.get("sessions"),
        avg_duration_seconds: row.get("avg_duration"),
        avg_scroll_depth: row.get("avg_scroll"),
    })
}

async fn site_counter_mysql(pool: &MySqlPool) -> Result<SiteCounter> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS views, COUNT(DISTINCT visitor_hash) AS visitors FROM post_views",
    )
    .fetch_one(pool)
    .await
    .context("Failed to read site counter")?;
    Ok(SiteCounter {
        total_views: row.get("views"),
        unique_visitors: row.get("visitors"),
    })
}
