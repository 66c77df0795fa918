//! Book note repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Book, ListParams, ReadingStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Book repository trait
#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn create(&self, book: &Book) -> Result<Book>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Book>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Book>>;

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Paginated listing, most recently finished (then updated) first
    async fn list(
        &self,
        params: &ListParams,
        status: Option<ReadingStatus>,
        public_only: bool,
    ) -> Result<(Vec<Book>, i64)>;

    async fn update(&self, book: &Book) -> Result<Book>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based book repository (SQLite and MySQL)
pub struct SqlxBookRepository {
    pool: DynDatabasePool,
}

impl SqlxBookRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BookRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BookRepository for SqlxBookRepository {
    async fn create(&self, book: &Book) -> Result<Book> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_book_sqlite(self.pool.as_sqlite().unwrap(), book).await
            }
            DatabaseDriver::Mysql => {
                create_book_mysql(self.pool.as_mysql().unwrap(), book).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Book>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_book_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_book_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Book>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_book_by_slug_sqlite(self.pool.as_sqlite().unwrap(), slug).await
            }
            DatabaseDriver::Mysql => {
                get_book_by_slug_mysql(self.pool.as_mysql().unwrap(), slug).await
            }
        }
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                book_slug_exists_sqlite(self.pool.as_sqlite().unwrap(), slug, exclude_id).await
            }
            DatabaseDriver::Mysql => {
                book_slug_exists_mysql(self.pool.as_mysql().unwrap(), slug, exclude_id).await
            }
        }
    }

    async fn list(
        &self,
        params: &ListParams,
        status: Option<ReadingStatus>,
        public_only: bool,
    ) -> Result<(Vec<Book>, i64)> {
        let where_sql = book_filter_sql(status, public_only);
        let status = status.map(|s| s.as_str());
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_books_sqlite(self.pool.as_sqlite().unwrap(), params, &where_sql, status).await
            }
            DatabaseDriver::Mysql => {
                list_books_mysql(self.pool.as_mysql().unwrap(), params, &where_sql, status).await
            }
        }
    }

    async fn update(&self, book: &Book) -> Result<Book> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_book_sqlite(self.pool.as_sqlite().unwrap(), book).await
            }
            DatabaseDriver::Mysql => {
                update_book_mysql(self.pool.as_mysql().unwrap(), book).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_book_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                delete_book_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }
}

const BOOK_COLUMNS: &str = r#"
    id, slug, title, author, isbn, cover_image, rating, status, notes, notes_html,
    is_public, started_at, finished_at, created_at, updated_at
"#;

fn book_filter_sql(status: Option<ReadingStatus>, public_only: bool) -> String {
    let mut clauses = Vec::new();
    if status.is_some() {
        clauses.push("status = ?");
    }
    if public_only {
        clauses.push("is_public = TRUE");
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_book_sqlite(pool: &SqlitePool, book: &Book) -> Result<Book> {
    let result = sqlx::query(
        r#"
        INSERT INTO books (
            slug, title, author, isbn, cover_image, rating, status, notes, notes_html,
            is_public, started_at, finished_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&book.slug)
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.isbn)
    .bind(&book.cover_image)
    .bind(book.rating)
    .bind(book.status.as_str())
    .bind(&book.notes)
    .bind(&book.notes_html)
    .bind(book.is_public)
    .bind(book.started_at)
    .bind(book.finished_at)
    .bind(book.created_at)
    .bind(book.updated_at)
    .execute(pool)
    .await
    .context("Failed to create book")?;

    let mut created = book.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn get_book_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Book>> {
    let row = sqlx::query(&format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get book by ID")?;
    Ok(row.as_ref().map(row_to_book_sqlite))
}

async fn get_book_by_slug_sqlite(pool: &SqlitePool, slug: &str) -> Result<Option<Book>> {
    let row = sqlx::query(&format!("SELECT {} FROM books WHERE slug = ?", BOOK_COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get book by slug")?;
    Ok(row.as_ref().map(row_to_book_sqlite))
}

async fn book_slug_exists_sqlite(
    pool: &SqlitePool,
    slug: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM books WHERE slug = ? AND id != ?")
        .bind(slug)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(pool)
        .await
        .context("Failed to check book slug")?;
    Ok(row.get::<i64, _>("count") > 0)
}

async fn list_books_sqlite(
    pool: &SqlitePool,
    params: &ListParams,
    where_sql: &str,
    status: Option<&str>,
) -> Result<(Vec<Book>, i64)> {
    let count_sql = format!("SELECT COUNT(*) AS count FROM books {}", where_sql);
    let mut count_query = sqlx::query(&count_sql);
    if let Some(status) = status {
        count_query = count_query.bind(status);
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count books")?
        .get("count");

    let list_sql = format!(
        "SELECT {} FROM books {} ORDER BY COALESCE(finished_at, updated_at) DESC, id DESC LIMIT ? OFFSET ?",
        BOOK_COLUMNS, where_sql
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
        .context("Failed to list books")?;

    Ok((rows.iter().map(row_to_book_sqlite).collect(), total))
}

async fn update_book_sqlite(pool: &SqlitePool, book: &Book) -> Result<Book> {
    sqlx::query(
        r#"
        UPDATE books
        SET slug = ?, title = ?, author = ?, isbn = ?, cover_image = ?, rating = ?,
            status = ?, notes = ?, notes_html = ?, is_public = ?, started_at = ?,
            finished_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&book.slug)
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.isbn)
    .bind(&book.cover_image)
    .bind(book.rating)
    .bind(book.status.as_str())
    .bind(&book.notes)
    .bind(&book.notes_html)
    .bind(book.is_public)
    .bind(book.started_at)
    .bind(book.finished_at)
    .bind(book.updated_at)
    .bind(book.id)
    .execute(pool)
    .await
    .context("Failed to update book")?;
    Ok(book.clone())
}

async fn delete_book_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete book")?;
    Ok(())
}

fn row_to_book_sqlite(row: &sqlx::sqlite::SqliteRow) -> Book {
    let status: String = row.get("status");
    Book {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        author: row.get("author"),
        isbn: row.get("isbn"),
        cover_image: row.get("cover_image"),
        rating: row.get("rating"),
        status: status.parse().unwrap_or_default(),
        notes: row.get("notes"),
        notes_html: row.get("notes_html"),
        is_public: row.get("is_public"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_book_mysql(pool: &MySqlPool, book: &Book) -> Result<Book> {
    let result = sqlx::query(
        r#"
        INSERT INTO books (
            slug, title, author, isbn, cover_image, rating, status, notes, notes_html,
            is_public, started_at, finished_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&book.slug)
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.isbn)
    .bind(&book.cover_image)
    .bind(book.rating)
    .bind(book.status.as_str())
    .bind(&book.notes)
    .bind(&book.notes_html)
    .bind(book.is_public)
    .bind(book.started_at)
    .bind(book.finished_at)
    .bind(book.created_at)
    .bind(book.updated_at)
    .execute(pool)
    .await
    .context("Failed to create book")?;

    let mut created = book.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

async fn get_book_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Book>> {
    let row = sqlx::query(&format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get book by ID")?;
    Ok(row.as_ref().map(row_to_book_mysql))
}

async fn get_book_by_slug_mysql(pool: &MySqlPool, slug: &str) -> Result<Option<Book>> {
    let row = sqlx::query(&format!("SELECT {} FROM books WHERE slug = ?", BOOK_COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get book by slug")?;
    Ok(row.as_ref().map(row_to_book_mysql))
}

async fn book_slug_exists_mysql(
    pool: &MySqlPool,
    slug: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM books WHERE slug = ? AND id != ?")
        .bind(slug)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(pool)
        .await
        .context("Failed to check book slug")?;
    Ok(row.get::<i64, _>("count") > 0)
}

async fn list_books_mysql(
    pool: &MySqlPool,
    params: &ListParams,
    where_sql: &str,
    status: Option<&str>,
) -> Result<(Vec<Book>, i64)> {
    let count_sql = format!("SELECT COUNT(*) AS count FROM books {}", where_sql);
    let mut count_query = sqlx::query(&count_sql);
    if let Some(status) = status {
        count_query = count_query.bind(status);
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count books")?
        .get("count");

    let list_sql = format!(
        "SELECT {} FROM books {} ORDER BY COALESCE(finished_at, updated_at) DESC, id DESC LIMIT ? OFFSET ?",
        BOOK_COLUMNS, where_sql
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
        .context("Failed to list books")?;

    Ok((rows.iter().map(row_to_book_mysql).collect(), total))
}

async fn update_book_mysql(pool: &MySqlPool, book: &Book) -> Result<Book> {
    sqlx::query(
        r#"
        UPDATE books
        SET slug = ?, title = ?, author = ?, isbn = ?, cover_image = ?, rating = ?,
            status = ?, notes = ?, notes_html = ?, is_public = ?, started_at = ?,
            finished_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&book.slug)
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.isbn)
    .bind(&book.cover_image)
    .bind(book.rating)
    .bind(book.status.as_str())
    .bind(&book.notes)
    .bind(&book.notes_html)
    .bind(book.is_public)
    .bind(book.started_at)
    .bind(book.finished_at)
    .bind(book.updated_at)
    .bind(book.id)
    .execute(pool)
    .await
    .context("Failed to update book")?;
    Ok(book.clone())
}

async fn delete_book_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete book")?;
    Ok(())
}

fn row_to_book_mysql(row: &sqlx::mysql::MySqlRow) -> Book {
    let status: String = row.get("status");
    Book {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        author: row.get("author"),
        isbn: row.get("isbn"),
        cover_image: row.get("cover_image"),
        rating: row.get("rating"),
        status: status.parse().unwrap_or_default(),
        notes: row.get("notes"),
        notes_html: row.get("notes_html"),
        is_public: row.get("is_public"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use chrono::{Duration, Utc};

    fn book(slug: &str, status: ReadingStatus, is_public: bool) -> Book {
        let now = Utc::now();
        Book {
            id: 0,
            slug: slug.to_string(),
            title: slug.to_uppercase(),
            author: "Someone".to_string(),
            isbn: None,
            cover_image: None,
            rating: Some(4),
            status,
            notes: String::new(),
            notes_html: String::new(),
            is_public,
            started_at: None,
            finished_at: (status == ReadingStatus::Finished).then(|| now - Duration::days(1)),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_crud() {
        let repo = SqlxBookRepository::new(setup_pool().await);
        let created = repo
            .create(&book("dune", ReadingStatus::Reading, true))
            .await
            .unwrap();

        let mut fetched = repo.get_by_slug("dune").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.rating, Some(4));

        fetched.status = ReadingStatus::Finished;
        fetched.finished_at = Some(Utc::now());
        repo.update(&fetched).await.unwrap();
        let updated = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(updated.status, ReadingStatus::Finished);

        assert!(repo.slug_exists("dune", None).await.unwrap());
        assert!(!repo.slug_exists("dune", Some(created.id)).await.unwrap());

        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_hides_private_books() {
        let repo = SqlxBookRepository::new(setup_pool().await);
        repo.create(&book("public-one", ReadingStatus::Finished, true))
            .await
            .unwrap();
        repo.create(&book("private-one", ReadingStatus::Finished, false))
            .await
            .unwrap();
        repo.create(&book("queued", ReadingStatus::WantToRead, true))
            .await
            .unwrap();

        let (all, total) = repo.list(&ListParams::default(), None, false).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(all.len(), 3);

        let (public, total) = repo.list(&ListParams::default(), None, true).await.unwrap();
        assert_eq!(total, 2);
        assert!(public.iter().all(|b| b.is_public));

        let (finished, total) = repo
            .list(&ListParams::default(), Some(ReadingStatus::Finished), true)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(finished[0].slug, "public-one");
    }
}
