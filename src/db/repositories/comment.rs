//! Comment repository
//!
//! Comments, their moderation status and visitor reactions. Every write that
//! can change the number of approved comments on a post also refreshes the
//! post's cached `comment_count`.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Comment, CommentStatus, ListParams, ReactionKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Comments of a post in posting order, optionally restricted to one status
    async fn list_by_post(&self, post_id: i64, status: Option<CommentStatus>) -> Result<Vec<Comment>>;

    /// Moderation queue, newest first
    async fn list_by_status(
        &self,
        params: &ListParams,
        status: Option<CommentStatus>,
    ) -> Result<(Vec<Comment>, i64)>;

    /// Returns false when the comment does not exist
    async fn update_status(&self, id: i64, status: CommentStatus) -> Result<bool>;

    /// Delete a comment and its replies. Returns false when it does not exist.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Returns true when the reaction was newly added
    async fn add_reaction(&self, comment_id: i64, kind: ReactionKind, visitor_hash: &str) -> Result<bool>;

    /// Returns true when a reaction was removed
    async fn remove_reaction(&self, comment_id: i64, kind: ReactionKind, visitor_hash: &str) -> Result<bool>;

    /// Reaction counts for a batch of comments
    async fn reaction_counts(&self, comment_ids: &[i64]) -> Result<HashMap<i64, BTreeMap<ReactionKind, i64>>>;

    /// Reactions a visitor left on one comment
    async fn visitor_reactions(&self, comment_id: i64, visitor_hash: &str) -> Result<Vec<ReactionKind>>;

    async fn count_by_status(&self, status: CommentStatus) -> Result<i64>;
}

/// SQLx-based comment repository (SQLite and MySQL)
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_comment_sqlite(self.pool.as_sqlite().unwrap(), comment).await
            }
            DatabaseDriver::Mysql => {
                create_comment_mysql(self.pool.as_mysql().unwrap(), comment).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_comment_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_comment_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn list_by_post(&self, post_id: i64, status: Option<CommentStatus>) -> Result<Vec<Comment>> {
        let status = status.map(|s| s.as_str());
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_comments_by_post_sqlite(self.pool.as_sqlite().unwrap(), post_id, status).await
            }
            DatabaseDriver::Mysql => {
                list_comments_by_post_mysql(self.pool.as_mysql().unwrap(), post_id, status).await
            }
        }
    }

    async fn list_by_status(
        &self,
        params: &ListParams,
        status: Option<CommentStatus>,
    ) -> Result<(Vec<Comment>, i64)> {
        let status = status.map(|s| s.as_str());
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_comments_by_status_sqlite(self.pool.as_sqlite().unwrap(), params, status).await
            }
            DatabaseDriver::Mysql => {
                list_comments_by_status_mysql(self.pool.as_mysql().unwrap(), params, status).await
            }
        }
    }

    async fn update_status(&self, id: i64, status: CommentStatus) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_comment_status_sqlite(self.pool.as_sqlite().unwrap(), id, status).await
            }
            DatabaseDriver::Mysql => {
                update_comment_status_mysql(self.pool.as_mysql().unwrap(), id, status).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_comment_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                delete_comment_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn add_reaction(&self, comment_id: i64, kind: ReactionKind, visitor_hash: &str) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                add_reaction_sqlite(self.pool.as_sqlite().unwrap(), comment_id, kind, visitor_hash).await
            }
            DatabaseDriver::Mysql => {
                add_reaction_mysql(self.pool.as_mysql().unwrap(), comment_id, kind, visitor_hash).await
            }
        }
    }

    async fn remove_reaction(&self, comment_id: i64, kind: ReactionKind, visitor_hash: &str) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                remove_reaction_sqlite(self.pool.as_sqlite().unwrap(), comment_id, kind, visitor_hash).await
            }
            DatabaseDriver::Mysql => {
                remove_reaction_mysql(self.pool.as_mysql().unwrap(), comment_id, kind, visitor_hash).await
            }
        }
    }

    async fn reaction_counts(&self, comment_ids: &[i64]) -> Result<HashMap<i64, BTreeMap<ReactionKind, i64>>> {
        if comment_ids.is_empty() {
            return Ok(HashMap::new());
        }
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                reaction_counts_sqlite(self.pool.as_sqlite().unwrap(), comment_ids).await
            }
            DatabaseDriver::Mysql => {
                reaction_counts_mysql(self.pool.as_mysql().unwrap(), comment_ids).await
            }
        }
    }

    async fn visitor_reactions(&self, comment_id: i64, visitor_hash: &str) -> Result<Vec<ReactionKind>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                visitor_reactions_sqlite(self.pool.as_sqlite().unwrap(), comment_id, visitor_hash).await
            }
            DatabaseDriver::Mysql => {
                visitor_reactions_mysql(self.pool.as_mysql().unwrap(), comment_id, visitor_hash).await
            }
        }
    }

    async fn count_by_status(&self, status: CommentStatus) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                count_comments_by_status_sqlite(self.pool.as_sqlite().unwrap(), status).await
            }
            DatabaseDriver::Mysql => {
                count_comments_by_status_mysql(self.pool.as_mysql().unwrap(), status).await
            }
        }
    }
}

const COMMENT_COLUMNS: &str = r#"
    id, post_id, parent_id, author_name, author_email, content, status,
    visitor_hash, created_at, updated_at
"#;

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// SQLite implementations
// ============================================================================

/// Refresh the cached approved-comment count of a post
async fn refresh_comment_count_sqlite(conn: &mut sqlx::SqliteConnection, post_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE posts
        SET comment_count = (
            SELECT COUNT(*) FROM comments WHERE post_id = ? AND status = 'approved'
        )
        WHERE id = ?
        "#,
    )
    .bind(post_id)
    .bind(post_id)
    .execute(conn)
    .await
    .context("Failed to refresh comment count")?;
    Ok(())
}

async fn create_comment_sqlite(pool: &SqlitePool, comment: &Comment) -> Result<Comment> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO comments (
            post_id, parent_id, author_name, author_email, content, status,
            visitor_hash, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(comment.post_id)
    .bind(comment.parent_id)
    .bind(&comment.author_name)
    .bind(&comment.author_email)
    .bind(&comment.content)
    .bind(comment.status.as_str())
    .bind(&comment.visitor_hash)
    .bind(comment.created_at)
    .bind(comment.updated_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create comment")?;

    refresh_comment_count_sqlite(&mut tx, comment.post_id).await?;
    tx.commit().await.context("Failed to commit comment")?;

    let mut created = comment.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn get_comment_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Comment>> {
    let row = sqlx::query(&format!("SELECT {} FROM comments WHERE id = ?", COMMENT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get comment by ID")?;
    Ok(row.as_ref().map(row_to_comment_sqlite))
}

async fn list_comments_by_post_sqlite(
    pool: &SqlitePool,
    post_id: i64,
    status: Option<&str>,
) -> Result<Vec<Comment>> {
    let sql = format!(
        "SELECT {} FROM comments WHERE post_id = ? {} ORDER BY created_at ASC, id ASC",
        COMMENT_COLUMNS,
        if status.is_some() { "AND status = ?" } else { "" }
    );
    let mut query = sqlx::query(&sql).bind(post_id);
    if let Some(status) = status {
        query = query.bind(status);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list comments")?;
    Ok(rows.iter().map(row_to_comment_sqlite).collect())
}

async fn list_comments_by_status_sqlite(
    pool: &SqlitePool,
    params: &ListParams,
    status: Option<&str>,
) -> Result<(Vec<Comment>, i64)> {
    let where_sql = if status.is_some() { "WHERE status = ?" } else { "" };

    let count_sql = format!("SELECT COUNT(*) AS count FROM comments {}", where_sql);
    let mut count_query = sqlx::query(&count_sql);
    if let Some(status) = status {
        count_query = count_query.bind(status);
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count comments")?
        .get("count");

    let list_sql = format!(
        "SELECT {} FROM comments {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        COMMENT_COLUMNS, where_sql
    );
    let mut list_query = sqlx::query(&list_sql);
    if let Some(status) = status {
        list_query = list_query.bind(status);
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list comments")?;

    Ok((rows.iter().map(row_to_comment_sqlite).collect(), total))
}

async fn update_comment_status_sqlite(pool: &SqlitePool, id: i64, status: CommentStatus) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query("SELECT post_id FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up comment")?;
    let Some(row) = row else {
        return Ok(false);
    };
    let post_id: i64 = row.get("post_id");

    sqlx::query("UPDATE comments SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update comment status")?;

    refresh_comment_count_sqlite(&mut tx, post_id).await?;
    tx.commit().await.context("Failed to commit comment status")?;
    Ok(true)
}

async fn delete_comment_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query("SELECT post_id FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up comment")?;
    let Some(row) = row else {
        return Ok(false);
    };
    let post_id: i64 = row.get("post_id");

    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete comment")?;

    refresh_comment_count_sqlite(&mut tx, post_id).await?;
    tx.commit().await.context("Failed to commit comment deletion")?;
    Ok(true)
}

async fn add_reaction_sqlite(
    pool: &SqlitePool,
    comment_id: i64,
    kind: ReactionKind,
    visitor_hash: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO comment_reactions (comment_id, kind, visitor_hash, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(comment_id)
    .bind(kind.as_str())
    .bind(visitor_hash)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .context("Failed to add reaction")?;
    Ok(result.rows_affected() > 0)
}

async fn remove_reaction_sqlite(
    pool: &SqlitePool,
    comment_id: i64,
    kind: ReactionKind,
    visitor_hash: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM comment_reactions WHERE comment_id = ? AND kind = ? AND visitor_hash = ?",
    )
    .bind(comment_id)
    .bind(kind.as_str())
    .bind(visitor_hash)
    .execute(pool)
    .await
    .context("Failed to remove reaction")?;
    Ok(result.rows_affected() > 0)
}

async fn reaction_counts_sqlite(
    pool: &SqlitePool,
    comment_ids: &[i64],
) -> Result<HashMap<i64, BTreeMap<ReactionKind, i64>>> {
    let sql = format!(
        r#"
        SELECT comment_id, kind, COUNT(*) AS count
        FROM comment_reactions
        WHERE comment_id IN ({})
        GROUP BY comment_id, kind
        "#,
        placeholders(comment_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in comment_ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to count reactions")?;

    let mut counts: HashMap<i64, BTreeMap<ReactionKind, i64>> = HashMap::new();
    for row in &rows {
        let kind: String = row.get("kind");
        if let Ok(kind) = kind.parse::<ReactionKind>() {
            counts
                .entry(row.get("comment_id"))
                .or_default()
                .insert(kind, row.get("count"));
        }
    }
    Ok(counts)
}

async fn visitor_reactions_sqlite(
    pool: &SqlitePool,
    comment_id: i64,
    visitor_hash: &str,
) -> Result<Vec<ReactionKind>> {
    let rows = sqlx::query(
        "SELECT kind FROM comment_reactions WHERE comment_id = ? AND visitor_hash = ? ORDER BY kind",
    )
    .bind(comment_id)
    .bind(visitor_hash)
    .fetch_all(pool)
    .await
    .context("Failed to get visitor reactions")?;

    Ok(rows
        .iter()
        .filter_map(|r| r.get::<String, _>("kind").parse().ok())
        .collect())
}

async fn count_comments_by_status_sqlite(pool: &SqlitePool, status: CommentStatus) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM comments WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await
        .context("Failed to count comments")?;
    Ok(row.get("count"))
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Comment {
    let status: String = row.get("status");
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        parent_id: row.get("parent_id"),
        author_name: row.get("author_name"),
        author_email: row.get("author_email"),
        content: row.get("content"),
        status: status.parse().unwrap_or_default(),
        visitor_hash: row.get("visitor_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

/// Refresh the cached approved-comment count of a post
async fn refresh_comment_count_mysql(conn: &mut sqlx::MySqlConnection, post_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE posts
        SET comment_count = (
            SELECT COUNT(*) FROM comments WHERE post_id = ? AND status = 'approved'
        )
        WHERE id = ?
        "#,
    )
    .bind(post_id)
    .bind(post_id)
    .execute(conn)
    .await
    .context("Failed to refresh comment count")?;
    Ok(())
}

async fn create_comment_mysql(pool: &MySqlPool, comment: &Comment) -> Result<Comment> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO comments (
            post_id, parent_id, author_name, author_email, content, status,
            visitor_hash, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(comment.post_id)
    .bind(comment.parent_id)
    .bind(&comment.author_name)
    .bind(&comment.author_email)
    .bind(&comment.content)
    .bind(comment.status.as_str())
    .bind(&comment.visitor_hash)
    .bind(comment.created_at)
    .bind(comment.updated_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create comment")?;

    refresh_comment_count_mysql(&mut tx, comment.post_id).await?;
    tx.commit().await.context("Failed to commit comment")?;

    let mut created = comment.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

async fn get_comment_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Comment>> {
    let row = sqlx::query(&format!("SELECT {} FROM comments WHERE id = ?", COMMENT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get comment by ID")?;
    Ok(row.as_ref().map(row_to_comment_mysql))
}

async fn list_comments_by_post_mysql(
    pool: &MySqlPool,
    post_id: i64,
    status: Option<&str>,
) -> Result<Vec<Comment>> {
    let sql = format!(
        "SELECT {} FROM comments WHERE post_id = ? {} ORDER BY created_at ASC, id ASC",
        COMMENT_COLUMNS,
        if status.is_some() { "AND status = ?" } else { "" }
    );
    let mut query = sqlx::query(&sql).bind(post_id);
    if let Some(status) = status {
        query = query.bind(status);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list comments")?;
    Ok(rows.iter().map(row_to_comment_mysql).collect())
}

async fn list_comments_by_status_mysql(
    pool: &MySqlPool,
    params: &ListParams,
    status: Option<&str>,
) -> Result<(Vec<Comment>, i64)> {
    let where_sql = if status.is_some() { "WHERE status = ?" } else { "" };

    let count_sql = format!("SELECT COUNT(*) AS count FROM comments {}", where_sql);
    let mut count_query = sqlx::query(&count_sql);
    if let Some(status) = status {
        count_query = count_query.bind(status);
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count comments")?
        .get("count");

    let list_sql = format!(
        "SELECT {} FROM comments {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        COMMENT_COLUMNS, where_sql
    );
    let mut list_query = sqlx::query(&list_sql);
    if let Some(status) = status {
        list_query = list_query.bind(status);
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list comments")?;

    Ok((rows.iter().map(row_to_comment_mysql).collect(), total))
}

async fn update_comment_status_mysql(pool: &MySqlPool, id: i64, status: CommentStatus) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query("SELECT post_id FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up comment")?;
    let Some(row) = row else {
        return Ok(false);
    };
    let post_id: i64 = row.get("post_id");

    sqlx::query("UPDATE comments SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update comment status")?;

    refresh_comment_count_mysql(&mut tx, post_id).await?;
    tx.commit().await.context("Failed to commit comment status")?;
    Ok(true)
}

async fn delete_comment_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query("SELECT post_id FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up comment")?;
    let Some(row) = row else {
        return Ok(false);
    };
    let post_id: i64 = row.get("post_id");

    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete comment")?;

    refresh_comment_count_mysql(&mut tx, post_id).await?;
    tx.commit().await.context("Failed to commit comment deletion")?;
    Ok(true)
}

async fn add_reaction_mysql(
    pool: &MySqlPool,
    comment_id: i64,
    kind: ReactionKind,
    visitor_hash: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT IGNORE INTO comment_reactions (comment_id, kind, visitor_hash, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(comment_id)
    .bind(kind.as_str())
    .bind(visitor_hash)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .context("Failed to add reaction")?;
    Ok(result.rows_affected() > 0)
}

async fn remove_reaction_mysql(
    pool: &MySqlPool,
    comment_id: i64,
    kind: ReactionKind,
    visitor_hash: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM comment_reactions WHERE comment_id = ? AND kind = ? AND visitor_hash = ?",
    )
    .bind(comment_id)
    .bind(kind.as_str())
    .bind(visitor_hash)
    .execute(pool)
    .await
    .context("Failed to remove reaction")?;
    Ok(result.rows_affected() > 0)
}

async fn reaction_counts_mysql(
    pool: &MySqlPool,
    comment_ids: &[i64],
) -> Result<HashMap<i64, BTreeMap<ReactionKind, i64>>> {
    let sql = format!(
        r#"
        SELECT comment_id, kind, COUNT(*) AS count
        FROM comment_reactions
        WHERE comment_id IN ({})
        GROUP BY comment_id, kind
        "#,
        placeholders(comment_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in comment_ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to count reactions")?;

    let mut counts: HashMap<i64, BTreeMap<ReactionKind, i64>> = HashMap::new();
    for row in &rows {
        let kind: String = row.get("kind");
        if let Ok(kind) = kind.parse::<ReactionKind>() {
            counts
                .entry(row.get("comment_id"))
                .or_default()
                .insert(kind, row.get("count"));
        }
    }
    Ok(counts)
}

async fn visitor_reactions_mysql(
    pool: &MySqlPool,
    comment_id: i64,
    visitor_hash: &str,
) -> Result<Vec<ReactionKind>> {
    let rows = sqlx::query(
        "SELECT kind FROM comment_reactions WHERE comment_id = ? AND visitor_hash = ? ORDER BY kind",
    )
    .bind(comment_id)
    .bind(visitor_hash)
    .fetch_all(pool)
    .await
    .context("Failed to get visitor reactions")?;

    Ok(rows
        .iter()
        .filter_map(|r| r.get::<String, _>("kind").parse().ok())
        .collect())
}

async fn count_comments_by_status_mysql(pool: &MySqlPool, status: CommentStatus) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM comments WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await
        .context("Failed to count comments")?;
    Ok(row.get("count"))
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Comment {
    let status: String = row.get("status");
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        parent_id: row.get("parent_id"),
        author_name: row.get("author_name"),
        author_email: row.get("author_email"),
        content: row.get("content"),
        status: status.parse().unwrap_or_default(),
        visitor_hash: row.get("visitor_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_post, setup_pool};
    use crate::models::PostStatus;
    use chrono::Utc;

    fn comment(post_id: i64, parent_id: Option<i64>, status: CommentStatus) -> Comment {
        let now = Utc::now();
        Comment {
            id: 0,
            post_id,
            parent_id,
            author_name: "Reader".to_string(),
            author_email: Some("reader@example.com".to_string()),
            content: "Nice post".to_string(),
            status,
            visitor_hash: "visitor-a".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn comment_count(pool: &DynDatabasePool, post_id: i64) -> i64 {
        sqlx::query("SELECT comment_count FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap()
            .get("comment_count")
    }

    #[tokio::test]
    async fn test_comment_count_tracks_approved_comments() {
        let pool = setup_pool().await;
        let post_id = insert_post(&pool, "post", PostStatus::Published).await;
        let repo = SqlxCommentRepository::new(pool.clone());

        let pending = repo
            .create(&comment(post_id, None, CommentStatus::Pending))
            .await
            .unwrap();
        assert_eq!(comment_count(&pool, post_id).await, 0);

        assert!(repo.update_status(pending.id, CommentStatus::Approved).await.unwrap());
        assert_eq!(comment_count(&pool, post_id).await, 1);

        repo.create(&comment(post_id, Some(pending.id), CommentStatus::Approved))
            .await
            .unwrap();
        assert_eq!(comment_count(&pool, post_id).await, 2);

        // Deleting the parent removes its reply too
        assert!(repo.delete(pending.id).await.unwrap());
        assert_eq!(comment_count(&pool, post_id).await, 0);
        assert!(repo.list_by_post(post_id, None).await.unwrap().is_empty());

        assert!(!repo.delete(pending.id).await.unwrap());
        assert!(!repo.update_status(999, CommentStatus::Spam).await.unwrap());
    }

    #[tokio::test]
    async fn test_moderation_listing() {
        let pool = setup_pool().await;
        let post_id = insert_post(&pool, "post", PostStatus::Published).await;
        let repo = SqlxCommentRepository::new(pool);

        for _ in 0..3 {
            repo.create(&comment(post_id, None, CommentStatus::Pending))
                .await
                .unwrap();
        }
        repo.create(&comment(post_id, None, CommentStatus::Approved))
            .await
            .unwrap();

        let (pending, total) = repo
            .list_by_status(&ListParams::new(1, 2), Some(CommentStatus::Pending))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(pending.len(), 2);
        assert_eq!(repo.count_by_status(CommentStatus::Approved).await.unwrap(), 1);

        let approved = repo
            .list_by_post(post_id, Some(CommentStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
    }

    #[tokio::test]
    async fn test_reactions_are_unique_per_visitor() {
        let pool = setup_pool().await;
        let post_id = insert_post(&pool, "post", PostStatus::Published).await;
        let repo = SqlxCommentRepository::new(pool);
        let c = repo
            .create(&comment(post_id, None, CommentStatus::Approved))
            .await
            .unwrap();

        assert!(repo.add_reaction(c.id, ReactionKind::Like, "a").await.unwrap());
        assert!(!repo.add_reaction(c.id, ReactionKind::Like, "a").await.unwrap());
        assert!(repo.add_reaction(c.id, ReactionKind::Like, "b").await.unwrap());
        assert!(repo.add_reaction(c.id, ReactionKind::Love, "a").await.unwrap());

        let counts = repo.reaction_counts(&[c.id]).await.unwrap();
        assert_eq!(counts[&c.id][&ReactionKind::Like], 2);
        assert_eq!(counts[&c.id][&ReactionKind::Love], 1);

        let mine = repo.visitor_reactions(c.id, "a").await.unwrap();
        assert_eq!(mine.len(), 2);

        assert!(repo.remove_reaction(c.id, ReactionKind::Like, "a").await.unwrap());
        assert!(!repo.remove_reaction(c.id, ReactionKind::Like, "a").await.unwrap());
        assert!(repo.reaction_counts(&[]).await.unwrap().is_empty());
    }
}
