//! Settings repository
//!
//! Key-value storage for site settings editable at runtime.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;

/// A setting key-value pair
#[derive(Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Repository trait for settings operations
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Setting>>;

    async fn get_all(&self) -> Result<Vec<Setting>>;

    /// Insert or overwrite a setting
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// SQLx-based settings repository
pub struct SqlxSettingsRepository {
    pool: DynDatabasePool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<Setting>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_setting_sqlite(self.pool.as_sqlite().unwrap(), key).await
            }
            DatabaseDriver::Mysql => {
                get_setting_mysql(self.pool.as_mysql().unwrap(), key).await
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<Setting>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_all_settings_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                get_all_settings_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_setting_sqlite(self.pool.as_sqlite().unwrap(), key, value).await
            }
            DatabaseDriver::Mysql => {
                set_setting_mysql(self.pool.as_mysql().unwrap(), key, value).await
            }
        }
    }

    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()> {
        for (key, value) in settings {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_setting_sqlite(self.pool.as_sqlite().unwrap(), key).await
            }
            DatabaseDriver::Mysql => {
                delete_setting_mysql(self.pool.as_mysql().unwrap(), key).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_setting_sqlite(pool: &SqlitePool, key: &str) -> Result<Option<Setting>> {
    let row = sqlx::query("SELECT key, value, updated_at FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get setting")?;

    Ok(row.map(|r| Setting {
        key: r.get("key"),
        value: r.get("value"),
        updated_at: r.get("updated_at"),
    }))
}

async fn get_all_settings_sqlite(pool: &SqlitePool) -> Result<Vec<Setting>> {
    let rows = sqlx::query("SELECT key, value, updated_at FROM settings ORDER BY key")
        .fetch_all(pool)
        .await
        .context("Failed to list settings")?;

    Ok(rows
        .iter()
        .map(|r| Setting {
            key: r.get("key"),
            value: r.get("value"),
            updated_at: r.get("updated_at"),
        })
        .collect())
}

async fn set_setting_sqlite(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(pool)
    .await
    .with_context(|| format!("Failed to set setting '{}'", key))?;
    Ok(())
}

async fn delete_setting_sqlite(pool: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await
        .context("Failed to delete setting")?;
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_setting_mysql(pool: &MySqlPool, key: &str) -> Result<Option<Setting>> {
    let row = sqlx::query("SELECT `key`, value, updated_at FROM settings WHERE `key` = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get setting")?;

    Ok(row.map(|r| Setting {
        key: r.get("key"),
        value: r.get("value"),
        updated_at: r.get("updated_at"),
    }))
}

async fn get_all_settings_mysql(pool: &MySqlPool) -> Result<Vec<Setting>> {
    let rows = sqlx::query("SELECT `key`, value, updated_at FROM settings ORDER BY `key`")
        .fetch_all(pool)
        .await
        .context("Failed to list settings")?;

    Ok(rows
        .iter()
        .map(|r| Setting {
            key: r.get("key"),
            value: r.get("value"),
            updated_at: r.get("updated_at"),
        })
        .collect())
}

async fn set_setting_mysql(pool: &MySqlPool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (`key`, value, updated_at) VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE value = VALUES(value), updated_at = VALUES(updated_at)
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(pool)
    .await
    .with_context(|| format!("Failed to set setting '{}'", key))?;
    Ok(())
}

async fn delete_setting_mysql(pool: &MySqlPool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE `key` = ?")
        .bind(key)
        .execute(pool)
        .await
        .context("Failed to delete setting")?;
    Ok(())
}
