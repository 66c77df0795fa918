//! Snippet library repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, Snippet};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Snippet repository trait
#[async_trait]
pub trait SnippetRepository: Send + Sync {
    async fn create(&self, snippet: &Snippet) -> Result<Snippet>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Snippet>>;

    /// Search by text (title, description, code) and language, newest first
    async fn search(
        &self,
        params: &ListParams,
        query: Option<&str>,
        language: Option<&str>,
    ) -> Result<(Vec<Snippet>, i64)>;

    async fn update(&self, snippet: &Snippet) -> Result<Snippet>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Distinct languages in use, alphabetically
    async fn languages(&self) -> Result<Vec<String>>;
}

/// SQLx-based snippet repository (SQLite and MySQL)
pub struct SqlxSnippetRepository {
    pool: DynDatabasePool,
}

impl SqlxSnippetRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SnippetRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SnippetRepository for SqlxSnippetRepository {
    async fn create(&self, snippet: &Snippet) -> Result<Snippet> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_snippet_sqlite(self.pool.as_sqlite().unwrap(), snippet).await
            }
            DatabaseDriver::Mysql => {
                create_snippet_mysql(self.pool.as_mysql().unwrap(), snippet).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Snippet>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_snippet_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_snippet_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn search(
        &self,
        params: &ListParams,
        query: Option<&str>,
        language: Option<&str>,
    ) -> Result<(Vec<Snippet>, i64)> {
        let (where_sql, binds) = build_search(query, language);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                search_snippets_sqlite(self.pool.as_sqlite().unwrap(), params, &where_sql, &binds).await
            }
            DatabaseDriver::Mysql => {
                search_snippets_mysql(self.pool.as_mysql().unwrap(), params, &where_sql, &binds).await
            }
        }
    }

    async fn update(&self, snippet: &Snippet) -> Result<Snippet> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_snippet_sqlite(self.pool.as_sqlite().unwrap(), snippet).await
            }
            DatabaseDriver::Mysql => {
                update_snippet_mysql(self.pool.as_mysql().unwrap(), snippet).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_snippet_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                delete_snippet_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn languages(&self) -> Result<Vec<String>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                snippet_languages_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                snippet_languages_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }
}

const SNIPPET_COLUMNS: &str = "id, title, language, code, description, created_at, updated_at";

fn build_search(query: Option<&str>, language: Option<&str>) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
        clauses.push("(LOWER(title) LIKE ? OR LOWER(description) LIKE ? OR LOWER(code) LIKE ?)");
        let pattern = format!("%{}%", q.to_lowercase());
        binds.extend(std::iter::repeat(pattern).take(3));
    }
    if let Some(lang) = language.map(str::trim).filter(|l| !l.is_empty()) {
        clauses.push("language = ?");
        binds.push(lang.to_lowercase());
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

async fn create_snippet_sqlite(pool: &SqlitePool, snippet: &Snippet) -> Result<Snippet> {
    let result = sqlx::query(
        "INSERT INTO snippets (title, language, code, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&snippet.title)
    .bind(&snippet.language)
    .bind(&snippet.code)
    .bind(&snippet.description)
    .bind(snippet.created_at)
    .bind(snippet.updated_at)
    .execute(pool)
    .await
    .context("Failed to create snippet")?;

    let mut created = snippet.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn get_snippet_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Snippet>> {
    let row = sqlx::query(&format!("SELECT {} FROM snippets WHERE id = ?", SNIPPET_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get snippet")?;
    Ok(row.as_ref().map(row_to_snippet_sqlite))
}

async fn search_snippets_sqlite(
    pool: &SqlitePool,
    params: &ListParams,
    where_sql: &str,
    binds: &[String],
) -> Result<(Vec<Snippet>, i64)> {
    let count_sql = format!("SELECT COUNT(*) AS count FROM snippets {}", where_sql);
    let mut count_query = sqlx::query(&count_sql);
    for value in binds {
        count_query = count_query.bind(value);
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count snippets")?
        .get("count");

    let list_sql = format!(
        "SELECT {} FROM snippets {} ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?",
        SNIPPET_COLUMNS, where_sql
    );
    let mut list_query = sqlx::query(&list_sql);
    for value in binds {
        list_query = list_query.bind(value);
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to search snippets")?;

    Ok((rows.iter().map(row_to_snippet_sqlite).collect(), total))
}

async fn update_snippet_sqlite(pool: &SqlitePool, snippet: &Snippet) -> Result<Snippet> {
    sqlx::query(
        "UPDATE snippets SET title = ?, language = ?, code = ?, description = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&snippet.title)
    .bind(&snippet.language)
    .bind(&snippet.code)
    .bind(&snippet.description)
    .bind(snippet.updated_at)
    .bind(snippet.id)
    .execute(pool)
    .await
    .context("Failed to update snippet")?;
    Ok(snippet.clone())
}

async fn delete_snippet_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM snippets WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete snippet")?;
    Ok(result.rows_affected() > 0)
}

async fn snippet_languages_sqlite(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT DISTINCT language FROM snippets ORDER BY language")
        .fetch_all(pool)
        .await
        .context("Failed to list snippet languages")?;
    Ok(rows.iter().map(|r| r.get("language")).collect())
}

fn row_to_snippet_sqlite(row: &sqlx::sqlite::SqliteRow) -> Snippet {
    Snippet {
        id: row.get("id"),
        title: row.get("title"),
        language: row.get("language"),
        code: row.get("code"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_snippet_mysql(pool: &MySqlPool, snippet: &Snippet) -> Result<Snippet> {
    let result = sqlx::query(
        "INSERT INTO snippets (title, language, code, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&snippet.title)
    .bind(&snippet.language)
    .bind(&snippet.code)
    .bind(&snippet.description)
    .bind(snippet.created_at)
    .bind(snippet.updated_at)
    .execute(pool)
    .await
    .context("Failed to create snippet")?;

    let mut created = snippet.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

async fn get_snippet_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Snippet>> {
    let row = sqlx::query(&format!("SELECT {} FROM snippets WHERE id = ?", SNIPPET_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get snippet")?;
    Ok(row.as_ref().map(row_to_snippet_mysql))
}

async fn search_snippets_mysql(
    pool: &MySqlPool,
    params: &ListParams,
    where_sql: &str,
    binds: &[String],
) -> Result<(Vec<Snippet>, i64)> {
    let count_sql = format!("SELECT COUNT(*) AS count FROM snippets {}", where_sql);
    let mut count_query = sqlx::query(&count_sql);
    for value in binds {
        count_query = count_query.bind(value);
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count snippets")?
        .get("count");

    let list_sql = format!(
        "SELECT {} FROM snippets {} ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?",
        SNIPPET_COLUMNS, where_sql
    );
    let mut list_query = sqlx::query(&list_sql);
    for value in binds {
        list_query = list_query.bind(value);
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to search snippets")?;

    Ok((rows.iter().map(row_to_snippet_mysql).collect(), total))
}

async fn update_snippet_mysql(pool: &MySqlPool, snippet: &Snippet) -> Result<Snippet> {
    sqlx::query(
        "UPDATE snippets SET title = ?, language = ?, code = ?, description = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&snippet.title)
    .bind(&snippet.language)
    .bind(&snippet.code)
    .bind(&snippet.description)
    .bind(snippet.updated_at)
    .bind(snippet.id)
    .execute(pool)
    .await
    .context("Failed to update snippet")?;
    Ok(snippet.clone())
}

async fn delete_snippet_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM snippets WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete snippet")?;
    Ok(result.rows_affected() > 0)
}

async fn snippet_languages_mysql(pool: &MySqlPool) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT DISTINCT language FROM snippets ORDER BY language")
        .fetch_all(pool)
        .await
        .context("Failed to list snippet languages")?;
    Ok(rows.iter().map(|r| r.get("language")).collect())
}

fn row_to_snippet_mysql(row: &sqlx::mysql::MySqlRow) -> Snippet {
    Snippet {
        id: row.get("id"),
        title: row.get("title"),
        language: row.get("language"),
        code: row.get("code"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
