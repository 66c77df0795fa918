//! Database connection pool abstraction
//!
//! Repositories hold a `DynDatabasePool` and branch on `driver()` to pick the
//! SQL dialect. File-backed SQLite databases run in WAL mode so analytics
//! beacons don't block readers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DatabaseConfig, DatabaseDriver};

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Run a statement that returns no rows; yields the affected row count
    async fn execute(&self, query: &str) -> Result<u64>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self);

    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;
}

pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Where a SQLite URL points
#[derive(Debug, Clone, PartialEq, Eq)]
enum SqliteTarget {
    Memory,
    File(String),
}

impl SqliteTarget {
    /// Accepts `:memory:`, `sqlite::memory:`, `sqlite:path[?opts]` or a bare path
    fn parse(url: &str) -> Self {
        match url {
            ":memory:" | "sqlite::memory:" => Self::Memory,
            _ => {
                let path = url.strip_prefix("sqlite://").unwrap_or(url);
                let path = path.strip_prefix("sqlite:").unwrap_or(path);
                Self::File(path.to_string())
            }
        }
    }

    fn connection_url(&self) -> String {
        match self {
            Self::Memory => "sqlite::memory:".to_string(),
            Self::File(path) if path.contains('?') => format!("sqlite:{}", path),
            Self::File(path) => format!("sqlite:{}?mode=rwc", path),
        }
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        let Self::File(path) = self else {
            return Ok(());
        };
        let file = path.split('?').next().unwrap_or(path);
        match Path::new(file).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent)),
            _ => Ok(()),
        }
    }
}

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        let target = SqliteTarget::parse(url);
        target.ensure_parent_dir()?;

        let mut options = SqliteConnectOptions::from_str(&target.connection_url())
            .with_context(|| format!("Invalid SQLite URL: {}", url))?
            .foreign_keys(true)
            .busy_timeout(SQLITE_BUSY_TIMEOUT);
        if target != SqliteTarget::Memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database: {}", url))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        Ok(sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?
            .rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("SQLite ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }
}

pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        let connection_url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&connection_url)
            .await
            .context("Failed to connect to MySQL database")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        Ok(sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?
            .rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("MySQL ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }
}

/// Open the configured database.
///
/// ```ignore
/// let pool = folio::db::create_pool(&DatabaseConfig::default()).await?;
/// pool.ping().await?;
/// ```
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => {
            Arc::new(SqliteDatabase::new(&config.url, config.max_connections).await?)
        }
        DatabaseDriver::Mysql => {
            Arc::new(MysqlDatabase::new(&config.url, config.max_connections).await?)
        }
    };
    Ok(pool)
}

/// In-memory SQLite for tests.
///
/// One connection only: each connection to `:memory:` is its own database.
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    create_pool(&DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
        max_connections: 1,
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: url.to_string(),
            max_connections: 2,
        }
    }

    #[test]
    fn test_sqlite_target_parsing() {
        assert_eq!(SqliteTarget::parse(":memory:"), SqliteTarget::Memory);
        assert_eq!(SqliteTarget::parse("sqlite::memory:"), SqliteTarget::Memory);
        assert_eq!(
            SqliteTarget::parse("sqlite:data/folio.db"),
            SqliteTarget::File("data/folio.db".to_string())
        );
        assert_eq!(
            SqliteTarget::parse("data/folio.db").connection_url(),
            "sqlite:data/folio.db?mode=rwc"
        );
        assert_eq!(
            SqliteTarget::parse("sqlite:folio.db?mode=ro").connection_url(),
            "sqlite:folio.db?mode=ro"
        );
    }

    #[tokio::test]
    async fn test_test_pool_is_sqlite() {
        let pool = create_test_pool().await.unwrap();
        assert_eq!(pool.driver(), DatabaseDriver::Sqlite);
        assert!(pool.as_sqlite().is_some());
        assert!(pool.as_mysql().is_none());
        pool.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_reports_affected_rows() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
            .await
            .unwrap();
        let affected = pool
            .execute("INSERT INTO notes (body) VALUES ('a'), ('b')")
            .await
            .unwrap();
        assert_eq!(affected, 2);
    }

    #[tokio::test]
    async fn test_file_database_creates_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("folio.db");

        let pool = create_pool(&sqlite_config(&db_path.to_string_lossy()))
            .await
            .unwrap();
        pool.ping().await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE parent (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();
        pool.execute(
            "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL REFERENCES parent(id))",
        )
        .await
        .unwrap();

        assert!(pool
            .execute("INSERT INTO child (parent_id) VALUES (42)")
            .await
            .is_err());
    }

    #[tokio::test]
    #[ignore = "Requires MySQL server (set MYSQL_TEST_URL)"]
    async fn test_mysql_pool() {
        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/folio_test".to_string());
        let pool = create_pool(&DatabaseConfig {
            driver: DatabaseDriver::Mysql,
            url,
            max_connections: 2,
        })
        .await
        .unwrap();
        assert_eq!(pool.driver(), DatabaseDriver::Mysql);
        pool.ping().await.unwrap();
    }
}
