//! Draft (autosave) repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Draft;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Draft repository trait
#[async_trait]
pub trait DraftRepository: Send + Sync {
    async fn create(&self, draft: &Draft) -> Result<Draft>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Draft>>;

    /// Most recently saved first
    async fn list(&self) -> Result<Vec<Draft>>;

    /// Returns false when the draft does not exist
    async fn update(&self, draft: &Draft) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Remove drafts not saved since `cutoff`
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based draft repository (SQLite and MySQL)
pub struct SqlxDraftRepository {
    pool: DynDatabasePool,
}

impl SqlxDraftRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn DraftRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl DraftRepository for SqlxDraftRepository {
    async fn create(&self, draft: &Draft) -> Result<Draft> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_draft_sqlite(self.pool.as_sqlite().unwrap(), draft).await
            }
            DatabaseDriver::Mysql => {
                create_draft_mysql(self.pool.as_mysql().unwrap(), draft).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Draft>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_draft_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_draft_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn list(&self) -> Result<Vec<Draft>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_drafts_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                list_drafts_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }

    async fn update(&self, draft: &Draft) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_draft_sqlite(self.pool.as_sqlite().unwrap(), draft).await
            }
            DatabaseDriver::Mysql => {
                update_draft_mysql(self.pool.as_mysql().unwrap(), draft).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_draft_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                delete_draft_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_drafts_older_than_sqlite(self.pool.as_sqlite().unwrap(), cutoff).await
            }
            DatabaseDriver::Mysql => {
                delete_drafts_older_than_mysql(self.pool.as_mysql().unwrap(), cutoff).await
            }
        }
    }
}

const DRAFT_COLUMNS: &str = "id, post_id, kind, title, content, created_at, updated_at";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_draft_sqlite(pool: &SqlitePool, draft: &Draft) -> Result<Draft> {
    let result = sqlx::query(
        "INSERT INTO drafts (post_id, kind, title, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(draft.post_id)
    .bind(draft.kind.as_str())
    .bind(&draft.title)
    .bind(&draft.content)
    .bind(draft.created_at)
    .bind(draft.updated_at)
    .execute(pool)
    .await
    .context("Failed to create draft")?;

    let mut created = draft.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn get_draft_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Draft>> {
    let row = sqlx::query(&format!("SELECT {} FROM drafts WHERE id = ?", DRAFT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get draft")?;
    Ok(row.as_ref().map(row_to_draft_sqlite))
}

async fn list_drafts_sqlite(pool: &SqlitePool) -> Result<Vec<Draft>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM drafts ORDER BY updated_at DESC, id DESC",
        DRAFT_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list drafts")?;
    Ok(rows.iter().map(row_to_draft_sqlite).collect())
}

async fn update_draft_sqlite(pool: &SqlitePool, draft: &Draft) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET post_id = ?, kind = ?, title = ?, content = ?, updated_at = ? WHERE id = ?",
    )
    .bind(draft.post_id)
    .bind(draft.kind.as_str())
    .bind(&draft.title)
    .bind(&draft.content)
    .bind(draft.updated_at)
    .bind(draft.id)
    .execute(pool)
    .await
    .context("Failed to update draft")?;
    Ok(result.rows_affected() > 0)
}

async fn delete_draft_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM drafts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete draft")?;
    Ok(result.rows_affected() > 0)
}

async fn delete_drafts_older_than_sqlite(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM drafts WHERE updated_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await
        .context("Failed to prune drafts")?;
    Ok(result.rows_affected())
}

fn row_to_draft_sqlite(row: &sqlx::sqlite::SqliteRow) -> Draft {
    let kind: String = row.get("kind");
    Draft {
        id: row.get("id"),
        post_id: row.get("post_id"),
        kind: kind.parse().unwrap_or_default(),
        title: row.get("title"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_draft_mysql(pool: &MySqlPool, draft: &Draft) -> Result<Draft> {
    let result = sqlx::query(
        "INSERT INTO drafts (post_id, kind, title, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(draft.post_id)
    .bind(draft.kind.as_str())
    .bind(&draft.title)
    .bind(&draft.content)
    .bind(draft.created_at)
    .bind(draft.updated_at)
    .execute(pool)
    .await
    .context("Failed to create draft")?;

    let mut created = draft.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

async fn get_draft_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Draft>> {
    let row = sqlx::query(&format!("SELECT {} FROM drafts WHERE id = ?", DRAFT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get draft")?;
    Ok(row.as_ref().map(row_to_draft_mysql))
}

async fn list_drafts_mysql(pool: &MySqlPool) -> Result<Vec<Draft>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM drafts ORDER BY updated_at DESC, id DESC",
        DRAFT_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list drafts")?;
    Ok(rows.iter().map(row_to_draft_mysql).collect())
}

async fn update_draft_mysql(pool: &MySqlPool, draft: &Draft) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET post_id = ?, kind = ?, title = ?, content = ?, updated_at = ? WHERE id = ?",
    )
    .bind(draft.post_id)
    .bind(draft.kind.as_str())
    .bind(&draft.title)
    .bind(&draft.content)
    .bind(draft.updated_at)
    .bind(draft.id)
    .execute(pool)
    .await
    .context("Failed to update draft")?;
    Ok(result.rows_affected() > 0)
}

async fn delete_draft_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM drafts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete draft")?;
    Ok(result.rows_affected() > 0)
}

async fn delete_drafts_older_than_mysql(pool: &MySqlPool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM drafts WHERE updated_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await
        .context("Failed to prune drafts")?;
    Ok(result.rows_affected())
}

fn row_to_draft_mysql(row: &sqlx::mysql::MySqlRow) -> Draft {
    let kind: String = row.get("kind");
    Draft {
        id: row.get("id"),
        post_id: row.get("post_id"),
        kind: kind.parse().unwrap_or_default(),
        title: row.get("title"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
