//! Series repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Series, SeriesWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Series repository trait
#[async_trait]
pub trait SeriesRepository: Send + Sync {
    async fn create(&self, series: &Series) -> Result<Series>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Series>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Series>>;

    /// Whether a slug is taken by a series other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// All series with their published post counts, newest first
    async fn list_with_counts(&self) -> Result<Vec<SeriesWithCount>>;

    async fn update(&self, series: &Series) -> Result<Series>;

    /// Delete a series; its posts stay, detached
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based series repository (SQLite and MySQL)
pub struct SqlxSeriesRepository {
    pool: DynDatabasePool,
}

impl SqlxSeriesRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SeriesRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SeriesRepository for SqlxSeriesRepository {
    async fn create(&self, series: &Series) -> Result<Series> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_series_sqlite(self.pool.as_sqlite().unwrap(), series).await
            }
            DatabaseDriver::Mysql => {
                create_series_mysql(self.pool.as_mysql().unwrap(), series).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Series>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_series_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_series_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Series>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_series_by_slug_sqlite(self.pool.as_sqlite().unwrap(), slug).await
            }
            DatabaseDriver::Mysql => {
                get_series_by_slug_mysql(self.pool.as_mysql().unwrap(), slug).await
            }
        }
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                series_slug_exists_sqlite(self.pool.as_sqlite().unwrap(), slug, exclude_id).await
            }
            DatabaseDriver::Mysql => {
                series_slug_exists_mysql(self.pool.as_mysql().unwrap(), slug, exclude_id).await
            }
        }
    }

    async fn list_with_counts(&self) -> Result<Vec<SeriesWithCount>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_series_with_counts_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                list_series_with_counts_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }

    async fn update(&self, series: &Series) -> Result<Series> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_series_sqlite(self.pool.as_sqlite().unwrap(), series).await
            }
            DatabaseDriver::Mysql => {
                update_series_mysql(self.pool.as_mysql().unwrap(), series).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_series_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                delete_series_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }
}

const SERIES_COLUMNS: &str = "id, slug, title, description, cover_image, created_at, updated_at";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_series_sqlite(pool: &SqlitePool, series: &Series) -> Result<Series> {
    let result = sqlx::query(
        r#"
        INSERT INTO series (slug, title, description, cover_image, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&series.slug)
    .bind(&series.title)
    .bind(&series.description)
    .bind(&series.cover_image)
    .bind(series.created_at)
    .bind(series.updated_at)
    .execute(pool)
    .await
    .context("Failed to create series")?;

    let mut created = series.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn get_series_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Series>> {
    let row = sqlx::query(&format!("SELECT {} FROM series WHERE id = ?", SERIES_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get series by ID")?;
    Ok(row.map(|r| row_to_series_sqlite(&r)))
}

async fn get_series_by_slug_sqlite(pool: &SqlitePool, slug: &str) -> Result<Option<Series>> {
    let row = sqlx::query(&format!("SELECT {} FROM series WHERE slug = ?", SERIES_COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get series by slug")?;
    Ok(row.map(|r| row_to_series_sqlite(&r)))
}

async fn series_slug_exists_sqlite(
    pool: &SqlitePool,
    slug: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM series WHERE slug = ? AND id != ?")
        .bind(slug)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(pool)
        .await
        .context("Failed to check series slug")?;
    Ok(row.get::<i64, _>("count") > 0)
}

async fn list_series_with_counts_sqlite(pool: &SqlitePool) -> Result<Vec<SeriesWithCount>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.slug, s.title, s.description, s.cover_image, s.created_at, s.updated_at,
               COUNT(p.id) AS post_count
        FROM series s
        LEFT JOIN posts p ON p.series_id = s.id AND p.status = 'published'
        GROUP BY s.id, s.slug, s.title, s.description, s.cover_image, s.created_at, s.updated_at
        ORDER BY s.created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list series")?;

    Ok(rows
        .iter()
        .map(|r| SeriesWithCount {
            series: row_to_series_sqlite(r),
            post_count: r.get("post_count"),
        })
        .collect())
}

async fn update_series_sqlite(pool: &SqlitePool, series: &Series) -> Result<Series> {
    sqlx::query(
        r#"
        UPDATE series
        SET slug = ?, title = ?, description = ?, cover_image = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&series.slug)
    .bind(&series.title)
    .bind(&series.description)
    .bind(&series.cover_image)
    .bind(series.updated_at)
    .bind(series.id)
    .execute(pool)
    .await
    .context("Failed to update series")?;
    Ok(series.clone())
}

async fn delete_series_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    sqlx::query("UPDATE posts SET series_id = NULL, series_order = 0 WHERE series_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to detach series posts")?;
    sqlx::query("DELETE FROM series WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete series")?;
    tx.commit().await.context("Failed to commit series delete")?;
    Ok(())
}

fn row_to_series_sqlite(row: &sqlx::sqlite::SqliteRow) -> Series {
    Series {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        cover_image: row.get("cover_image"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_series_mysql(pool: &MySqlPool, series: &Series) -> Result<Series> {
    let result = sqlx::query(
        r#"
        INSERT INTO series (slug, title, description, cover_image, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&series.slug)
    .bind(&series.title)
    .bind(&series.description)
    .bind(&series.cover_image)
    .bind(series.created_at)
    .bind(series.updated_at)
    .execute(pool)
    .await
    .context("Failed to create series")?;

    let mut created = series.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

async fn get_series_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Series>> {
    let row = sqlx::query(&format!("SELECT {} FROM series WHERE id = ?", SERIES_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get series by ID")?;
    Ok(row.map(|r| row_to_series_mysql(&r)))
}

async fn get_series_by_slug_mysql(pool: &MySqlPool, slug: &str) -> Result<Option<Series>> {
    let row = sqlx::query(&format!("SELECT {} FROM series WHERE slug = ?", SERIES_COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get series by slug")?;
    Ok(row.map(|r| row_to_series_mysql(&r)))
}

async fn series_slug_exists_mysql(
    pool: &MySqlPool,
    slug: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM series WHERE slug = ? AND id != ?")
        .bind(slug)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(pool)
        .await
        .context("Failed to check series slug")?;
    Ok(row.get::<i64, _>("count") > 0)
}

async fn list_series_with_counts_mysql(pool: &MySqlPool) -> Result<Vec<SeriesWithCount>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.slug, s.title, s.description, s.cover_image, s.created_at, s.updated_at,
               COUNT(p.id) AS post_count
        FROM series s
        LEFT JOIN posts p ON p.series_id = s.id AND p.status = 'published'
        GROUP BY s.id, s.slug, s.title, s.description, s.cover_image, s.created_at, s.updated_at
        ORDER BY s.created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list series")?;

    Ok(rows
        .iter()
        .map(|r| SeriesWithCount {
            series: row_to_series_mysql(r),
            post_count: r.get("post_count"),
        })
        .collect())
}

async fn update_series_mysql(pool: &MySqlPool, series: &Series) -> Result<Series> {
    sqlx::query(
        r#"
        UPDATE series
        SET slug = ?, title = ?, description = ?, cover_image = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&series.slug)
    .bind(&series.title)
    .bind(&series.description)
    .bind(&series.cover_image)
    .bind(series.updated_at)
    .bind(series.id)
    .execute(pool)
    .await
    .context("Failed to update series")?;
    Ok(series.clone())
}

async fn delete_series_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    sqlx::query("UPDATE posts SET series_id = NULL, series_order = 0 WHERE series_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to detach series posts")?;
    sqlx::query("DELETE FROM series WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete series")?;
    tx.commit().await.context("Failed to commit series delete")?;
    Ok(())
}

fn row_to_series_mysql(row: &sqlx::mysql::MySqlRow) -> Series {
    Series {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        cover_image: row.get("cover_image"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
