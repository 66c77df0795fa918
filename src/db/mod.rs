//! Database layer
//!
//! Folio stores everything in a relational database:
//! - SQLite (default, for single-binary deployment)
//! - MySQL (for larger deployments)
//!
//! The driver is selected from configuration and hidden behind the
//! `DatabasePool` trait. Repositories dispatch on `DatabasePool::driver()`
//! and run the matching SQL dialect.
//!
//! ```ignore
//! use folio::config::DatabaseConfig;
//! use folio::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
