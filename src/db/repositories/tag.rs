//! Tag repository
//!
//! Tags and the `post_tags` association table.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Tag, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    /// Case-insensitive lookup by display name
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// All tags with the number of published posts, most used first
    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Tags attached to a post, by name
    async fn get_for_post(&self, post_id: i64) -> Result<Vec<Tag>>;

    /// Tags for many posts at once, keyed by post ID
    async fn get_for_posts(&self, post_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>>;

    /// Replace the tag set of a post
    async fn set_post_tags(&self, post_id: i64, tag_ids: &[i64]) -> Result<()>;
}

/// SQLx-based tag repository (SQLite and MySQL)
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_tag_sqlite(self.pool.as_sqlite().unwrap(), tag).await
            }
            DatabaseDriver::Mysql => {
                create_tag_mysql(self.pool.as_mysql().unwrap(), tag).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_tag_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_tag_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_tag_by_slug_sqlite(self.pool.as_sqlite().unwrap(), slug).await
            }
            DatabaseDriver::Mysql => {
                get_tag_by_slug_mysql(self.pool.as_mysql().unwrap(), slug).await
            }
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_tag_by_name_sqlite(self.pool.as_sqlite().unwrap(), name).await
            }
            DatabaseDriver::Mysql => {
                get_tag_by_name_mysql(self.pool.as_mysql().unwrap(), name).await
            }
        }
    }

    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_tags_with_counts_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                list_tags_with_counts_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_tag_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                delete_tag_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn get_for_post(&self, post_id: i64) -> Result<Vec<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_tags_for_post_sqlite(self.pool.as_sqlite().unwrap(), post_id).await
            }
            DatabaseDriver::Mysql => {
                get_tags_for_post_mysql(self.pool.as_mysql().unwrap(), post_id).await
            }
        }
    }

    async fn get_for_posts(&self, post_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_tags_for_posts_sqlite(self.pool.as_sqlite().unwrap(), post_ids).await
            }
            DatabaseDriver::Mysql => {
                get_tags_for_posts_mysql(self.pool.as_mysql().unwrap(), post_ids).await
            }
        }
    }

    async fn set_post_tags(&self, post_id: i64, tag_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_post_tags_sqlite(self.pool.as_sqlite().unwrap(), post_id, tag_ids).await
            }
            DatabaseDriver::Mysql => {
                set_post_tags_mysql(self.pool.as_mysql().unwrap(), post_id, tag_ids).await
            }
        }
    }
}

/// `?, ?, ?` for an IN clause
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_tag_sqlite(pool: &SqlitePool, tag: &Tag) -> Result<Tag> {
    let result = sqlx::query("INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)")
        .bind(&tag.name)
        .bind(&tag.slug)
        .bind(tag.created_at)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    let mut created = tag.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn get_tag_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name, slug, created_at FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by ID")?;
    Ok(row.map(|r| row_to_tag_sqlite(&r)))
}

async fn get_tag_by_slug_sqlite(pool: &SqlitePool, slug: &str) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name, slug, created_at FROM tags WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by slug")?;
    Ok(row.map(|r| row_to_tag_sqlite(&r)))
}

async fn get_tag_by_name_sqlite(pool: &SqlitePool, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name, slug, created_at FROM tags WHERE LOWER(name) = LOWER(?)")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by name")?;
    Ok(row.map(|r| row_to_tag_sqlite(&r)))
}

async fn list_tags_with_counts_sqlite(pool: &SqlitePool) -> Result<Vec<TagWithCount>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.name, t.slug, t.created_at, COUNT(p.id) AS post_count
        FROM tags t
        LEFT JOIN post_tags pt ON pt.tag_id = t.id
        LEFT JOIN posts p ON p.id = pt.post_id AND p.status = 'published'
        GROUP BY t.id, t.name, t.slug, t.created_at
        ORDER BY post_count DESC, t.name ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list tags")?;

    Ok(rows
        .iter()
        .map(|r| TagWithCount::new(row_to_tag_sqlite(r), r.get("post_count")))
        .collect())
}

async fn delete_tag_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete tag")?;
    Ok(())
}

async fn get_tags_for_post_sqlite(pool: &SqlitePool, post_id: i64) -> Result<Vec<Tag>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.name, t.slug, t.created_at
        FROM tags t
        INNER JOIN post_tags pt ON pt.tag_id = t.id
        WHERE pt.post_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
    .context("Failed to get post tags")?;

    Ok(rows.iter().map(row_to_tag_sqlite).collect())
}

async fn get_tags_for_posts_sqlite(
    pool: &SqlitePool,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>> {
    let sql = format!(
        r#"
        SELECT pt.post_id, t.id, t.name, t.slug, t.created_at
        FROM tags t
        INNER JOIN post_tags pt ON pt.tag_id = t.id
        WHERE pt.post_id IN ({})
        ORDER BY t.name
        "#,
        placeholders(post_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in post_ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to get tags for posts")?;

    let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
    for row in &rows {
        map.entry(row.get("post_id"))
            .or_default()
            .push(row_to_tag_sqlite(row));
    }
    Ok(map)
}

async fn set_post_tags_sqlite(pool: &SqlitePool, post_id: i64, tag_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post tags")?;

    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach tag")?;
    }

    tx.commit().await.context("Failed to commit post tags")?;
    Ok(())
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_tag_mysql(pool: &MySqlPool, tag: &Tag) -> Result<Tag> {
    let result = sqlx::query("INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)")
        .bind(&tag.name)
        .bind(&tag.slug)
        .bind(tag.created_at)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    let mut created = tag.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

async fn get_tag_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name, slug, created_at FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by ID")?;
    Ok(row.map(|r| row_to_tag_mysql(&r)))
}

async fn get_tag_by_slug_mysql(pool: &MySqlPool, slug: &str) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name, slug, created_at FROM tags WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by slug")?;
    Ok(row.map(|r| row_to_tag_mysql(&r)))
}

async fn get_tag_by_name_mysql(pool: &MySqlPool, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name, slug, created_at FROM tags WHERE LOWER(name) = LOWER(?)")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by name")?;
    Ok(row.map(|r| row_to_tag_mysql(&r)))
}

async fn list_tags_with_counts_mysql(pool: &MySqlPool) -> Result<Vec<TagWithCount>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.name, t.slug, t.created_at, COUNT(p.id) AS post_count
        FROM tags t
        LEFT JOIN post_tags pt ON pt.tag_id = t.id
        LEFT JOIN posts p ON p.id = pt.post_id AND p.status = 'published'
        GROUP BY t.id, t.name, t.slug, t.created_at
        ORDER BY post_count DESC, t.name ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list tags")?;

    Ok(rows
        .iter()
        .map(|r| TagWithCount::new(row_to_tag_mysql(r), r.get("post_count")))
        .collect())
}

async fn delete_tag_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete tag")?;
    Ok(())
}

async fn get_tags_for_post_mysql(pool: &MySqlPool, post_id: i64) -> Result<Vec<Tag>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.name, t.slug, t.created_at
        FROM tags t
        INNER JOIN post_tags pt ON pt.tag_id = t.id
        WHERE pt.post_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
    .context("Failed to get post tags")?;

    Ok(rows.iter().map(row_to_tag_mysql).collect())
}

async fn get_tags_for_posts_mysql(
    pool: &MySqlPool,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>> {
    let sql = format!(
        r#"
        SELECT pt.post_id, t.id, t.name, t.slug, t.created_at
        FROM tags t
        INNER JOIN post_tags pt ON pt.tag_id = t.id
        WHERE pt.post_id IN ({})
        ORDER BY t.name
        "#,
        placeholders(post_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in post_ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to get tags for posts")?;

    let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
    for row in &rows {
        map.entry(row.get("post_id"))
            .or_default()
            .push(row_to_tag_mysql(row));
    }
    Ok(map)
}

async fn set_post_tags_mysql(pool: &MySqlPool, post_id: i64, tag_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post tags")?;

    for tag_id in tag_ids {
        sqlx::query("INSERT IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach tag")?;
    }

    tx.commit().await.context("Failed to commit post tags")?;
    Ok(())
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}
