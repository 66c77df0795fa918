//! Knowledge preset repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::KnowledgePreset;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Knowledge preset repository trait
#[async_trait]
pub trait PresetRepository: Send + Sync {
    async fn create(&self, preset: &KnowledgePreset) -> Result<KnowledgePreset>;

    async fn get_by_id(&self, id: i64) -> Result<Option<KnowledgePreset>>;

    /// Case-insensitive lookup, used to keep names unique
    async fn get_by_name(&self, name: &str) -> Result<Option<KnowledgePreset>>;

    async fn list(&self) -> Result<Vec<KnowledgePreset>>;

    async fn update(&self, preset: &KnowledgePreset) -> Result<KnowledgePreset>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based preset repository (SQLite and MySQL)
pub struct SqlxPresetRepository {
    pool: DynDatabasePool,
}

impl SqlxPresetRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PresetRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PresetRepository for SqlxPresetRepository {
    async fn create(&self, preset: &KnowledgePreset) -> Result<KnowledgePreset> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_preset_sqlite(self.pool.as_sqlite().unwrap(), preset).await
            }
            DatabaseDriver::Mysql => {
                create_preset_mysql(self.pool.as_mysql().unwrap(), preset).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<KnowledgePreset>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_preset_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_preset_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<KnowledgePreset>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_preset_by_name_sqlite(self.pool.as_sqlite().unwrap(), name).await
            }
            DatabaseDriver::Mysql => {
                get_preset_by_name_mysql(self.pool.as_mysql().unwrap(), name).await
            }
        }
    }

    async fn list(&self) -> Result<Vec<KnowledgePreset>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_presets_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                list_presets_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }

    async fn update(&self, preset: &KnowledgePreset) -> Result<KnowledgePreset> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_preset_sqlite(self.pool.as_sqlite().unwrap(), preset).await
            }
            DatabaseDriver::Mysql => {
                update_preset_mysql(self.pool.as_mysql().unwrap(), preset).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_preset_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                delete_preset_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }
}

const PRESET_COLUMNS: &str =
    "id, name, description, system_prompt, context, model, temperature, created_at, updated_at";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_preset_sqlite(pool: &SqlitePool, preset: &KnowledgePreset) -> Result<KnowledgePreset> {
    let result = sqlx::query(
        r#"
        INSERT INTO knowledge_presets (
            name, description, system_prompt, context, model, temperature, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&preset.name)
    .bind(&preset.description)
    .bind(&preset.system_prompt)
    .bind(&preset.context)
    .bind(&preset.model)
    .bind(preset.temperature)
    .bind(preset.created_at)
    .bind(preset.updated_at)
    .execute(pool)
    .await
    .context("Failed to create preset")?;

    let mut created = preset.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn get_preset_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<KnowledgePreset>> {
    let row = sqlx::query(&format!("SELECT {} FROM knowledge_presets WHERE id = ?", PRESET_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get preset")?;
    Ok(row.as_ref().map(row_to_preset_sqlite))
}

async fn get_preset_by_name_sqlite(pool: &SqlitePool, name: &str) -> Result<Option<KnowledgePreset>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM knowledge_presets WHERE LOWER(name) = LOWER(?)",
        PRESET_COLUMNS
    ))
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("Failed to get preset by name")?;
    Ok(row.as_ref().map(row_to_preset_sqlite))
}

async fn list_presets_sqlite(pool: &SqlitePool) -> Result<Vec<KnowledgePreset>> {
    let rows = sqlx::query(&format!("SELECT {} FROM knowledge_presets ORDER BY name", PRESET_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list presets")?;
    Ok(rows.iter().map(row_to_preset_sqlite).collect())
}

async fn update_preset_sqlite(pool: &SqlitePool, preset: &KnowledgePreset) -> Result<KnowledgePreset> {
    sqlx::query(
        r#"
        UPDATE knowledge_presets
        SET name = ?, description = ?, system_prompt = ?, context = ?, model = ?,
            temperature = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&preset.name)
    .bind(&preset.description)
    .bind(&preset.system_prompt)
    .bind(&preset.context)
    .bind(&preset.model)
    .bind(preset.temperature)
    .bind(preset.updated_at)
    .bind(preset.id)
    .execute(pool)
    .await
    .context("Failed to update preset")?;
    Ok(preset.clone())
}

async fn delete_preset_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM knowledge_presets WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete preset")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_preset_sqlite(row: &sqlx::sqlite::SqliteRow) -> KnowledgePreset {
    KnowledgePreset {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        system_prompt: row.get("system_prompt"),
        context: row.get("context"),
        model: row.get("model"),
        temperature: row.get("temperature"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_preset_mysql(pool: &MySqlPool, preset: &KnowledgePreset) -> Result<KnowledgePreset> {
    let result = sqlx::query(
        r#"
        INSERT INTO knowledge_presets (
            name, description, system_prompt, context, model, temperature, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&preset.name)
    .bind(&preset.description)
    .bind(&preset.system_prompt)
    .bind(&preset.context)
    .bind(&preset.model)
    .bind(preset.temperature)
    .bind(preset.created_at)
    .bind(preset.updated_at)
    .execute(pool)
    .await
    .context("Failed to create preset")?;

    let mut created = preset.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

async fn get_preset_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<KnowledgePreset>> {
    let row = sqlx::query(&format!("SELECT {} FROM knowledge_presets WHERE id = ?", PRESET_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get preset")?;
    Ok(row.as_ref().map(row_to_preset_mysql))
}

async fn get_preset_by_name_mysql(pool: &MySqlPool, name: &str) -> Result<Option<KnowledgePreset>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM knowledge_presets WHERE LOWER(name) = LOWER(?)",
        PRESET_COLUMNS
    ))
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("Failed to get preset by name")?;
    Ok(row.as_ref().map(row_to_preset_mysql))
}

async fn list_presets_mysql(pool: &MySqlPool) -> Result<Vec<KnowledgePreset>> {
    let rows = sqlx::query(&format!("SELECT {} FROM knowledge_presets ORDER BY name", PRESET_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list presets")?;
    Ok(rows.iter().map(row_to_preset_mysql).collect())
}

async fn update_preset_mysql(pool: &MySqlPool, preset: &KnowledgePreset) -> Result<KnowledgePreset> {
    sqlx::query(
        r#"
        UPDATE knowledge_presets
        SET name = ?, description = ?, system_prompt = ?, context = ?, model = ?,
            temperature = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&preset.name)
    .bind(&preset.description)
    .bind(&preset.system_prompt)
    .bind(&preset.context)
    .bind(&preset.model)
    .bind(preset.temperature)
    .bind(preset.updated_at)
    .bind(preset.id)
    .execute(pool)
    .await
    .context("Failed to update preset")?;
    Ok(preset.clone())
}

async fn delete_preset_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM knowledge_presets WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete preset")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_preset_mysql(row: &sqlx::mysql::MySqlRow) -> KnowledgePreset {
    KnowledgePreset {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        system_prompt: row.get("system_prompt"),
        context: row.get("context"),
        model: row.get("model"),
        temperature: row.get("temperature"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use chrono::Utc;

    #[tokio::test]
    async fn test_preset_crud() {
        let repo = SqlxPresetRepository::new(setup_pool().await);
        let now = Utc::now();
        let created = repo
            .create(&KnowledgePreset {
                id: 0,
                name: "Voice".to_string(),
                description: String::new(),
                system_prompt: "Write plainly.".to_string(),
                context: "The blog is about Rust.".to_string(),
                model: None,
                temperature: 0.3,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let found = repo.get_by_name("voice").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!((found.temperature - 0.3).abs() < f64::EPSILON);

        let mut changed = found.clone();
        changed.model = Some("gpt-4o".to_string());
        repo.update(&changed).await.unwrap();
        assert_eq!(
            repo.get_by_id(created.id).await.unwrap().unwrap().model.as_deref(),
            Some("gpt-4o")
        );

        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.list().await.unwrap().is_empty());
    }
}
