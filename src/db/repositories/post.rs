//! Post repository
//!
//! Database operations for articles and short posts.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, Post, PostFilter, PostKind, PostStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post, returning it with its assigned ID
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Whether a slug is taken by a post other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Overwrite every mutable column of a post
    async fn update(&self, post: &Post) -> Result<Post>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Filtered, paginated listing, newest first. Returns the page and the total.
    async fn list(&self, params: &ListParams, filter: &PostFilter) -> Result<(Vec<Post>, i64)>;

    /// Posts of a series in reading order
    async fn list_by_series(&self, series_id: i64, published_only: bool) -> Result<Vec<Post>>;

    /// Number the given series members 1..=n in one transaction. Fails and
    /// changes nothing if any ID isn't a member of the series.
    async fn reorder_series(&self, series_id: i64, post_ids: &[i64]) -> Result<()>;

    /// Latest published posts (feeds, sitemap)
    async fn recent_published(&self, limit: i64) -> Result<Vec<Post>>;

    /// Number of posts per status
    async fn count_by_status(&self) -> Result<HashMap<PostStatus, i64>>;
}

/// SQLx-based post repository (SQLite and MySQL)
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_post_sqlite(self.pool.as_sqlite().unwrap(), post).await
            }
            DatabaseDriver::Mysql => {
                create_post_mysql(self.pool.as_mysql().unwrap(), post).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_post_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_post_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_post_by_slug_sqlite(self.pool.as_sqlite().unwrap(), slug).await
            }
            DatabaseDriver::Mysql => {
                get_post_by_slug_mysql(self.pool.as_mysql().unwrap(), slug).await
            }
        }
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                post_slug_exists_sqlite(self.pool.as_sqlite().unwrap(), slug, exclude_id).await
            }
            DatabaseDriver::Mysql => {
                post_slug_exists_mysql(self.pool.as_mysql().unwrap(), slug, exclude_id).await
            }
        }
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_post_sqlite(self.pool.as_sqlite().unwrap(), post).await
            }
            DatabaseDriver::Mysql => {
                update_post_mysql(self.pool.as_mysql().unwrap(), post).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_post_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                delete_post_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn list(&self, params: &ListParams, filter: &PostFilter) -> Result<(Vec<Post>, i64)> {
        let (where_sql, binds) = build_filter(filter);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_posts_sqlite(self.pool.as_sqlite().unwrap(), params, &where_sql, &binds).await
            }
            DatabaseDriver::Mysql => {
                list_posts_mysql(self.pool.as_mysql().unwrap(), params, &where_sql, &binds).await
            }
        }
    }

    async fn list_by_series(&self, series_id: i64, published_only: bool) -> Result<Vec<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_posts_by_series_sqlite(self.pool.as_sqlite().unwrap(), series_id, published_only).await
            }
            DatabaseDriver::Mysql => {
                list_posts_by_series_mysql(self.pool.as_mysql().unwrap(), series_id, published_only).await
            }
        }
    }

    async fn reorder_series(&self, series_id: i64, post_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                reorder_series_sqlite(self.pool.as_sqlite().unwrap(), series_id, post_ids).await
            }
            DatabaseDriver::Mysql => {
                reorder_series_mysql(self.pool.as_mysql().unwrap(), series_id, post_ids).await
            }
        }
    }

    async fn recent_published(&self, limit: i64) -> Result<Vec<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                recent_published_posts_sqlite(self.pool.as_sqlite().unwrap(), limit).await
            }
            DatabaseDriver::Mysql => {
                recent_published_posts_mysql(self.pool.as_mysql().unwrap(), limit).await
            }
        }
    }

    async fn count_by_status(&self) -> Result<HashMap<PostStatus, i64>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                count_posts_by_status_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                count_posts_by_status_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }
}

const POST_COLUMNS: &str = r#"
    id, slug, kind, title, content, content_html, excerpt, cover_image,
    meta_title, meta_description, canonical_url, status, author_id, series_id,
    series_order, reading_time_minutes, view_count, comment_count,
    published_at, created_at, updated_at
"#;

/// A value bound into a dynamically built WHERE clause
#[derive(Debug, Clone, PartialEq)]
enum FilterValue {
    Text(String),
    Int(i64),
}

/// Translate a filter into a WHERE clause (dialect-neutral) and its bind values
fn build_filter(filter: &PostFilter) -> (String, Vec<FilterValue>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds = Vec::new();

    if let Some(status) = filter.status {
        clauses.push("status = ?");
        binds.push(FilterValue::Text(status.as_str().to_string()));
    }
    if let Some(kind) = filter.kind {
        clauses.push("kind = ?");
        binds.push(FilterValue::Text(kind.as_str().to_string()));
    }
    if let Some(series_id) = filter.series_id {
        clauses.push("series_id = ?");
        binds.push(FilterValue::Int(series_id));
    }
    if let Some(tag) = filter.tag.as_deref().filter(|t| !t.is_empty()) {
        clauses.push(
            "EXISTS (SELECT 1 FROM post_tags pt INNER JOIN tags t ON t.id = pt.tag_id \
             WHERE pt.post_id = posts.id AND t.slug = ?)",
        );
        binds.push(FilterValue::Text(tag.to_string()));
    }
    if let Some(query) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        clauses.push("(LOWER(title) LIKE ? OR LOWER(content) LIKE ?)");
        let pattern = format!("%{}%", query.to_lowercase());
        binds.push(FilterValue::Text(pattern.clone()));
        binds.push(FilterValue::Text(pattern));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (where_sql, binds)
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<Post> {
    let result = sqlx::query(
        r#"
        INSERT INTO posts (
            slug, kind, title, content, content_html, excerpt, cover_image,
            meta_title, meta_description, canonical_url, status, author_id, series_id,
            series_order, reading_time_minutes, view_count, comment_count,
            published_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.slug)
    .bind(post.kind.as_str())
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.excerpt)
    .bind(&post.cover_image)
    .bind(&post.meta_title)
    .bind(&post.meta_description)
    .bind(&post.canonical_url)
    .bind(post.status.as_str())
    .bind(post.author_id)
    .bind(post.series_id)
    .bind(post.series_order)
    .bind(post.reading_time_minutes)
    .bind(post.view_count)
    .bind(post.comment_count)
    .bind(post.published_at)
    .bind(post.created_at)
    .bind(post.updated_at)
    .execute(pool)
    .await
    .context("Failed to create post")?;

    let mut created = post.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn get_post_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;
    row.map(|r| row_to_post_sqlite(&r)).transpose()
}

async fn get_post_by_slug_sqlite(pool: &SqlitePool, slug: &str) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by slug")?;
    row.map(|r| row_to_post_sqlite(&r)).transpose()
}

async fn post_slug_exists_sqlite(
    pool: &SqlitePool,
    slug: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM posts WHERE slug = ? AND id != ?")
        .bind(slug)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(pool)
        .await
        .context("Failed to check post slug")?;
    Ok(row.get::<i64, _>("count") > 0)
}

async fn update_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<Post> {
    sqlx::query(
        r#"
        UPDATE posts
        SET slug = ?, kind = ?, title = ?, content = ?, content_html = ?, excerpt = ?,
            cover_image = ?, meta_title = ?, meta_description = ?, canonical_url = ?,
            status = ?, series_id = ?, series_order = ?, reading_time_minutes = ?,
            published_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.slug)
    .bind(post.kind.as_str())
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.excerpt)
    .bind(&post.cover_image)
    .bind(&post.meta_title)
    .bind(&post.meta_description)
    .bind(&post.canonical_url)
    .bind(post.status.as_str())
    .bind(post.series_id)
    .bind(post.series_order)
    .bind(post.reading_time_minutes)
    .bind(post.published_at)
    .bind(post.updated_at)
    .bind(post.id)
    .execute(pool)
    .await
    .context("Failed to update post")?;
    Ok(post.clone())
}

async fn delete_post_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete post")?;
    Ok(())
}

async fn list_posts_sqlite(
    pool: &SqlitePool,
    params: &ListParams,
    where_sql: &str,
    binds: &[FilterValue],
) -> Result<(Vec<Post>, i64)> {
    let count_sql = format!("SELECT COUNT(*) AS count FROM posts {}", where_sql);
    let mut count_query = sqlx::query(&count_sql);
    for value in binds {
        count_query = match value {
            FilterValue::Text(s) => count_query.bind(s.as_str()),
            FilterValue::Int(i) => count_query.bind(*i),
        };
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?
        .get("count");

    let list_sql = format!(
        "SELECT {} FROM posts {} ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ? OFFSET ?",
        POST_COLUMNS, where_sql
    );
    let mut list_query = sqlx::query(&list_sql);
    for value in binds {
        list_query = match value {
            FilterValue::Text(s) => list_query.bind(s.as_str()),
            FilterValue::Int(i) => list_query.bind(*i),
        };
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let posts = rows.iter().map(row_to_post_sqlite).collect::<Result<Vec<_>>>()?;
    Ok((posts, total))
}

async fn list_posts_by_series_sqlite(
    pool: &SqlitePool,
    series_id: i64,
    published_only: bool,
) -> Result<Vec<Post>> {
    let sql = format!(
        "SELECT {} FROM posts WHERE series_id = ? {} ORDER BY series_order ASC, COALESCE(published_at, created_at) ASC, id ASC",
        POST_COLUMNS,
        if published_only { "AND status = 'published'" } else { "" }
    );
    let rows = sqlx::query(&sql)
        .bind(series_id)
        .fetch_all(pool)
        .await
        .context("Failed to list series posts")?;
    rows.iter().map(row_to_post_sqlite).collect()
}

async fn reorder_series_sqlite(pool: &SqlitePool, series_id: i64, post_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    for (index, post_id) in post_ids.iter().enumerate() {
        let result = sqlx::query("UPDATE posts SET series_order = ? WHERE id = ? AND series_id = ?")
            .bind(index as i32 + 1)
            .bind(post_id)
            .bind(series_id)
            .execute(&mut *tx)
            .await
            .context("Failed to set series order")?;
        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back series order")?;
            anyhow::bail!("Post {} is not in series {}", post_id, series_id);
        }
    }
    tx.commit().await.context("Failed to commit series order")?;
    Ok(())
}

async fn recent_published_posts_sqlite(pool: &SqlitePool, limit: i64) -> Result<Vec<Post>> {
    let sql = format!(
        "SELECT {} FROM posts WHERE status = 'published' ORDER BY published_at DESC, id DESC LIMIT ?",
        POST_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list recent posts")?;
    rows.iter().map(row_to_post_sqlite).collect()
}

async fn count_posts_by_status_sqlite(pool: &SqlitePool) -> Result<HashMap<PostStatus, i64>> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM posts GROUP BY status")
        .fetch_all(pool)
        .await
        .context("Failed to count posts by status")?;

    let mut counts = HashMap::new();
    for row in &rows {
        let status: String = row.get("status");
        if let Ok(status) = status.parse::<PostStatus>() {
            counts.insert(status, row.get("count"));
        }
    }
    Ok(counts)
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    Ok(Post {
        id: row.get("id"),
        slug: row.get("slug"),
        kind: kind.parse().unwrap_or(PostKind::Article),
        title: row.get("title"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        excerpt: row.get("excerpt"),
        cover_image: row.get("cover_image"),
        meta_title: row.get("meta_title"),
        meta_description: row.get("meta_description"),
        canonical_url: row.get("canonical_url"),
        status: status
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("Corrupt post status")?,
        author_id: row.get("author_id"),
        series_id: row.get("series_id"),
        series_order: row.get("series_order"),
        reading_time_minutes: row.get("reading_time_minutes"),
        view_count: row.get("view_count"),
        comment_count: row.get("comment_count"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(pool: &MySqlPool, post: &Post) -> Result<Post> {
    let result = sqlx::query(
        r#"
        INSERT INTO posts (
            slug, kind, title, content, content_html, excerpt, cover_image,
            meta_title, meta_description, canonical_url, status, author_id, series_id,
            series_order, reading_time_minutes, view_count, comment_count,
            published_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.slug)
    .bind(post.kind.as_str())
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.excerpt)
    .bind(&post.cover_image)
    .bind(&post.meta_title)
    .bind(&post.meta_description)
    .bind(&post.canonical_url)
    .bind(post.status.as_str())
    .bind(post.author_id)
    .bind(post.series_id)
    .bind(post.series_order)
    .bind(post.reading_time_minutes)
    .bind(post.view_count)
    .bind(post.comment_count)
    .bind(post.published_at)
    .bind(post.created_at)
    .bind(post.updated_at)
    .execute(pool)
    .await
    .context("Failed to create post")?;

    let mut created = post.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

async fn get_post_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;
    row.map(|r| row_to_post_mysql(&r)).transpose()
}

async fn get_post_by_slug_mysql(pool: &MySqlPool, slug: &str) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by slug")?;
    row.map(|r| row_to_post_mysql(&r)).transpose()
}

async fn post_slug_exists_mysql(
    pool: &MySqlPool,
    slug: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM posts WHERE slug = ? AND id != ?")
        .bind(slug)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(pool)
        .await
        .context("Failed to check post slug")?;
    Ok(row.get::<i64, _>("count") > 0)
}

async fn update_post_mysql(pool: &MySqlPool, post: &Post) -> Result<Post> {
    sqlx::query(
        r#"
        UPDATE posts
        SET slug = ?, kind = ?, title = ?, content = ?, content_html = ?, excerpt = ?,
            cover_image = ?, meta_title = ?, meta_description = ?, canonical_url = ?,
            status = ?, series_id = ?, series_order = ?, reading_time_minutes = ?,
            published_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.slug)
    .bind(post.kind.as_str())
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.excerpt)
    .bind(&post.cover_image)
    .bind(&post.meta_title)
    .bind(&post.meta_description)
    .bind(&post.canonical_url)
    .bind(post.status.as_str())
    .bind(post.series_id)
    .bind(post.series_order)
    .bind(post.reading_time_minutes)
    .bind(post.published_at)
    .bind(post.updated_at)
    .bind(post.id)
    .execute(pool)
    .await
    .context("Failed to update post")?;
    Ok(post.clone())
}

async fn delete_post_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete post")?;
    Ok(())
}

async fn list_posts_mysql(
    pool: &MySqlPool,
    params: &ListParams,
    where_sql: &str,
    binds: &[FilterValue],
) -> Result<(Vec<Post>, i64)> {
    let count_sql = format!("SELECT COUNT(*) AS count FROM posts {}", where_sql);
    let mut count_query = sqlx::query(&count_sql);
    for value in binds {
        count_query = match value {
            FilterValue::Text(s) => count_query.bind(s.as_str()),
            FilterValue::Int(i) => count_query.bind(*i),
        };
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?
        .get("count");

    let list_sql = format!(
        "SELECT {} FROM posts {} ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ? OFFSET ?",
        POST_COLUMNS, where_sql
    );
    let mut list_query = sqlx::query(&list_sql);
    for value in binds {
        list_query = match value {
            FilterValue::Text(s) => list_query.bind(s.as_str()),
            FilterValue::Int(i) => list_query.bind(*i),
        };
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let posts = rows.iter().map(row_to_post_mysql).collect::<Result<Vec<_>>>()?;
    Ok((posts, total))
}

async fn list_posts_by_series_mysql(
    pool: &MySqlPool,
    series_id: i64,
    published_only: bool,
) -> Result<Vec<Post>> {
    let sql = format!(
        "SELECT {} FROM posts WHERE series_id = ? {} ORDER BY series_order ASC, COALESCE(published_at, created_at) ASC, id ASC",
        POST_COLUMNS,
        if published_only { "AND status = 'published'" } else { "" }
    );
    let rows = sqlx::query(&sql)
        .bind(series_id)
        .fetch_all(pool)
        .await
        .context("Failed to list series posts")?;
    rows.iter().map(row_to_post_mysql).collect()
}

async fn reorder_series_mysql(pool: &MySqlPool, series_id: i64, post_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    for (index, post_id) in post_ids.iter().enumerate() {
        let result = sqlx::query("UPDATE posts SET series_order = ? WHERE id = ? AND series_id = ?")
            .bind(index as i32 + 1)
            .bind(post_id)
            .bind(series_id)
            .execute(&mut *tx)
            .await
            .context("Failed to set series order")?;
        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back series order")?;
            anyhow::bail!("Post {} is not in series {}", post_id, series_id);
        }
    }
    tx.commit().await.context("Failed to commit series order")?;
    Ok(())
}

async fn recent_published_posts_mysql(pool: &MySqlPool, limit: i64) -> Result<Vec<Post>> {
    let sql = format!(
        "SELECT {} FROM posts WHERE status = 'published' ORDER BY published_at DESC, id DESC LIMIT ?",
        POST_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list recent posts")?;
    rows.iter().map(row_to_post_mysql).collect()
}

async fn count_posts_by_status_mysql(pool: &MySqlPool) -> Result<HashMap<PostStatus, i64>> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM posts GROUP BY status")
        .fetch_all(pool)
        .await
        .context("Failed to count posts by status")?;

    let mut counts = HashMap::new();
    for row in &rows {
        let status: String = row.get("status");
        if let Ok(status) = status.parse::<PostStatus>() {
            counts.insert(status, row.get("count"));
        }
    }
    Ok(counts)
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Post> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    Ok(Post {
        id: row.get("id"),
        slug: row.get("slug"),
        kind: kind.parse().unwrap_or(PostKind::Article),
        title: row.get("title"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        excerpt: row.get("excerpt"),
        cover_image: row.get("cover_image"),
        meta_title: row.get("meta_title"),
        meta_description: row.get("meta_description"),
        canonical_url: row.get("canonical_url"),
        status: status
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("Corrupt post status")?,
        author_id: row.get("author_id"),
        series_id: row.get("series_id"),
        series_order: row.get("series_order"),
        reading_time_minutes: row.get("reading_time_minutes"),
        view_count: row.get("view_count"),
        comment_count: row.get("comment_count"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use chrono::{Duration, Utc};

    fn post(slug: &str, kind: PostKind, status: PostStatus) -> Post {
        let now = Utc::now();
        Post {
            id: 0,
            slug: slug.to_string(),
            kind,
            title: format!("Title {}", slug),
            content: format!("Content about {}", slug),
            content_html: String::new(),
            excerpt: String::new(),
            cover_image: None,
            meta_title: None,
            meta_description: None,
            canonical_url: None,
            status,
            author_id: None,
            series_id: None,
            series_order: 0,
            reading_time_minutes: 1,
            view_count: 0,
            comment_count: 0,
            published_at: (status == PostStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_build_filter() {
        let (sql, binds) = build_filter(&PostFilter::default());
        assert!(sql.is_empty());
        assert!(binds.is_empty());

        let filter = PostFilter {
            status: Some(PostStatus::Published),
            kind: Some(PostKind::Short),
            query: Some("  Rust ".to_string()),
            ..Default::default()
        };
        let (sql, binds) = build_filter(&filter);
        assert!(sql.starts_with("WHERE status = ? AND kind = ?"));
        assert_eq!(binds.len(), 4);
        assert_eq!(binds[2], FilterValue::Text("%rust%".to_string()));
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let repo = SqlxPostRepository::new(setup_pool().await);

        let created = repo
            .create(&post("hello", PostKind::Article, PostStatus::Draft))
            .await
            .unwrap();
        assert!(created.id > 0);

        let mut fetched = repo.get_by_slug("hello").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.status, PostStatus::Draft);

        fetched.title = "Changed".to_string();
        fetched.status = PostStatus::Published;
        fetched.published_at = Some(Utc::now());
        repo.update(&fetched).await.unwrap();

        let updated = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(updated.title, "Changed");
        assert!(updated.published_at.is_some());

        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let repo = SqlxPostRepository::new(setup_pool().await);
        for i in 0..5 {
            let mut p = post(&format!("article-{}", i), PostKind::Article, PostStatus::Published);
            p.published_at = Some(Utc::now() - Duration::hours(i));
            repo.create(&p).await.unwrap();
        }
        repo.create(&post("short-1", PostKind::Short, PostStatus::Published))
            .await
            .unwrap();
        repo.create(&post("draft-1", PostKind::Article, PostStatus::Draft))
            .await
            .unwrap();

        let published = PostFilter {
            status: Some(PostStatus::Published),
            ..Default::default()
        };
        let (page, total) = repo.list(&ListParams::new(1, 4), &published).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(page.len(), 4);

        let shorts = PostFilter {
            kind: Some(PostKind::Short),
            ..published.clone()
        };
        let (items, total) = repo.list(&ListParams::default(), &shorts).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].slug, "short-1");

        let search = PostFilter {
            query: Some("ARTICLE-3".to_string()),
            ..published
        };
        let (items, _) = repo.list(&ListParams::default(), &search).await.unwrap();
        assert_eq!(items.len(), 1);

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts[&PostStatus::Published], 6);
        assert_eq!(counts[&PostStatus::Draft], 1);
    }

    #[tokio::test]
    async fn test_slug_exists() {
        let repo = SqlxPostRepository::new(setup_pool().await);
        let created = repo
            .create(&post("taken", PostKind::Article, PostStatus::Draft))
            .await
            .unwrap();

        assert!(repo.slug_exists("taken", None).await.unwrap());
        assert!(!repo.slug_exists("taken", Some(created.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_reorder_series_is_all_or_nothing() {
        let pool = setup_pool().await;
        let series_id = sqlx::query("INSERT INTO series (slug, title) VALUES ('guide', 'Guide')")
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid();
        let repo = SqlxPostRepository::new(pool);

        let mut ids = Vec::new();
        for (order, slug) in ["one", "two"].into_iter().enumerate() {
            let mut member = post(slug, PostKind::Article, PostStatus::Published);
            member.series_id = Some(series_id);
            member.series_order = order as i32 + 1;
            ids.push(repo.create(&member).await.unwrap().id);
        }
        let outsider = repo
            .create(&post("elsewhere", PostKind::Article, PostStatus::Published))
            .await
            .unwrap();

        repo.reorder_series(series_id, &[ids[1], ids[0]]).await.unwrap();
        let order: Vec<i64> = repo
            .list_by_series(series_id, false)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(order, vec![ids[1], ids[0]]);

        assert!(repo
            .reorder_series(series_id, &[ids[0], outsider.id])
            .await
            .is_err());
        let unchanged = repo.get_by_id(ids[0]).await.unwrap().unwrap();
        assert_eq!(unchanged.series_order, 2);
        let outsider = repo.get_by_id(outsider.id).await.unwrap().unwrap();
        assert_eq!(outsider.series_order, 0);
    }
}
