//! Admin repository
//!
//! Database access for admin accounts.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Admin, AdminRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Admin repository trait
#[async_trait]
pub trait AdminRepository: Send + Sync {
    /// Insert a new admin, returning it with its assigned ID
    async fn create(&self, admin: &Admin) -> Result<Admin>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Admin>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<Admin>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<Admin>>;

    /// All admins, oldest first
    async fn list(&self) -> Result<Vec<Admin>>;

    async fn count(&self) -> Result<i64>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based admin repository (SQLite and MySQL)
pub struct SqlxAdminRepository {
    pool: DynDatabasePool,
}

impl SqlxAdminRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AdminRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AdminRepository for SqlxAdminRepository {
    async fn create(&self, admin: &Admin) -> Result<Admin> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_admin_sqlite(self.pool.as_sqlite().unwrap(), admin).await
            }
            DatabaseDriver::Mysql => {
                create_admin_mysql(self.pool.as_mysql().unwrap(), admin).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Admin>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_admin_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_admin_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Admin>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_admin_by_username_sqlite(self.pool.as_sqlite().unwrap(), username).await
            }
            DatabaseDriver::Mysql => {
                get_admin_by_username_mysql(self.pool.as_mysql().unwrap(), username).await
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Admin>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_admin_by_email_sqlite(self.pool.as_sqlite().unwrap(), email).await
            }
            DatabaseDriver::Mysql => {
                get_admin_by_email_mysql(self.pool.as_mysql().unwrap(), email).await
            }
        }
    }

    async fn list(&self) -> Result<Vec<Admin>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_admins_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                list_admins_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                count_admins_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                count_admins_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_admin_password_sqlite(self.pool.as_sqlite().unwrap(), id, password_hash).await
            }
            DatabaseDriver::Mysql => {
                update_admin_password_mysql(self.pool.as_mysql().unwrap(), id, password_hash).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_admin_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                delete_admin_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }
}

const ADMIN_COLUMNS: &str =
    "id, username, email, password_hash, display_name, role, created_at, updated_at";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_admin_sqlite(pool: &SqlitePool, admin: &Admin) -> Result<Admin> {
    let result = sqlx::query(
        r#"
        INSERT INTO admins (username, email, password_hash, display_name, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&admin.username)
    .bind(&admin.email)
    .bind(&admin.password_hash)
    .bind(&admin.display_name)
    .bind(admin.role.as_str())
    .bind(admin.created_at)
    .bind(admin.updated_at)
    .execute(pool)
    .await
    .context("Failed to create admin")?;

    let mut created = admin.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn get_admin_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Admin>> {
    let row = sqlx::query(&format!("SELECT {} FROM admins WHERE id = ?", ADMIN_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get admin by ID")?;

    row.map(|r| row_to_admin_sqlite(&r)).transpose()
}

async fn get_admin_by_username_sqlite(pool: &SqlitePool, username: &str) -> Result<Option<Admin>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM admins WHERE LOWER(username) = LOWER(?)",
        ADMIN_COLUMNS
    ))
    .bind(username)
    .fetch_optional(pool)
    .await
    .context("Failed to get admin by username")?;

    row.map(|r| row_to_admin_sqlite(&r)).transpose()
}

async fn get_admin_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<Admin>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM admins WHERE LOWER(email) = LOWER(?)",
        ADMIN_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get admin by email")?;

    row.map(|r| row_to_admin_sqlite(&r)).transpose()
}

async fn list_admins_sqlite(pool: &SqlitePool) -> Result<Vec<Admin>> {
    let rows = sqlx::query(&format!("SELECT {} FROM admins ORDER BY id", ADMIN_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list admins")?;

    rows.iter().map(row_to_admin_sqlite).collect()
}

async fn count_admins_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM admins")
        .fetch_one(pool)
        .await
        .context("Failed to count admins")?;
    Ok(row.get("count"))
}

async fn update_admin_password_sqlite(pool: &SqlitePool, id: i64, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE admins SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update admin password")?;
    Ok(())
}

async fn delete_admin_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM admins WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete admin")?;
    Ok(())
}

fn row_to_admin_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Admin> {
    let role: String = row.get("role");
    Ok(Admin {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        role: role.parse().unwrap_or(AdminRole::Editor),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_admin_mysql(pool: &MySqlPool, admin: &Admin) -> Result<Admin> {
    let result = sqlx::query(
        r#"
        INSERT INTO admins (username, email, password_hash, display_name, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&admin.username)
    .bind(&admin.email)
    .bind(&admin.password_hash)
    .bind(&admin.display_name)
    .bind(admin.role.as_str())
    .bind(admin.created_at)
    .bind(admin.updated_at)
    .execute(pool)
    .await
    .context("Failed to create admin")?;

    let mut created = admin.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

async fn get_admin_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Admin>> {
    let row = sqlx::query(&format!("SELECT {} FROM admins WHERE id = ?", ADMIN_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get admin by ID")?;

    row.map(|r| row_to_admin_mysql(&r)).transpose()
}

async fn get_admin_by_username_mysql(pool: &MySqlPool, username: &str) -> Result<Option<Admin>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM admins WHERE LOWER(username) = LOWER(?)",
        ADMIN_COLUMNS
    ))
    .bind(username)
    .fetch_optional(pool)
    .await
    .context("Failed to get admin by username")?;

    row.map(|r| row_to_admin_mysql(&r)).transpose()
}

async fn get_admin_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<Admin>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM admins WHERE LOWER(email) = LOWER(?)",
        ADMIN_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get admin by email")?;

    row.map(|r| row_to_admin_mysql(&r)).transpose()
}

async fn list_admins_mysql(pool: &MySqlPool) -> Result<Vec<Admin>> {
    let rows = sqlx::query(&format!("SELECT {} FROM admins ORDER BY id", ADMIN_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list admins")?;

    rows.iter().map(row_to_admin_mysql).collect()
}

async fn count_admins_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM admins")
        .fetch_one(pool)
        .await
        .context("Failed to count admins")?;
    Ok(row.get("count"))
}

async fn update_admin_password_mysql(pool: &MySqlPool, id: i64, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE admins SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update admin password")?;
    Ok(())
}

async fn delete_admin_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM admins WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete admin")?;
    Ok(())
}

fn row_to_admin_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Admin> {
    let role: String = row.get("role");
    Ok(Admin {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        role: role.parse().unwrap_or(AdminRole::Editor),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;

    fn admin(username: &str, role: AdminRole) -> Admin {
        Admin::new(
            username.to_string(),
            format!("{}@example.com", username),
            "hash".to_string(),
            role,
        )
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = SqlxAdminRepository::new(setup_pool().await);

        let created = repo.create(&admin("ada", AdminRole::Owner)).await.unwrap();
        assert!(created.id > 0);

        let by_name = repo.get_by_username("ADA").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.role, AdminRole::Owner);

        let by_email = repo.get_by_email("ada@example.com").await.unwrap();
        assert!(by_email.is_some());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let repo = SqlxAdminRepository::new(setup_pool().await);
        repo.create(&admin("ada", AdminRole::Owner)).await.unwrap();

        assert!(repo.create(&admin("ada", AdminRole::Editor)).await.is_err());
    }

    #[tokio::test]
    async fn test_update_password_and_delete() {
        let repo = SqlxAdminRepository::new(setup_pool().await);
        let created = repo.create(&admin("bob", AdminRole::Editor)).await.unwrap();

        repo.update_password(created.id, "new-hash").await.unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.password_hash, "new-hash");

        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
        assert!(repo.list().await.unwrap().is_empty());
    }
}
