//! Session repository
//!
//! Only the SHA-256 digest of a session token is stored, so a copy of the
//! database cannot be replayed as live logins. Callers pass and receive the
//! raw token; hashing happens here.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::fmt::Write;
use std::sync::Arc;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Look a session up by its raw token
    async fn get_by_token(&self, token: &str) -> Result<Option<Session>>;

    async fn delete(&self, token: &str) -> Result<()>;

    /// Sign an admin out everywhere, optionally sparing one token
    async fn delete_by_admin(&self, admin_id: i64, keep: Option<&str>) -> Result<u64>;

    /// Drop sessions that expired before `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Hex SHA-256 of a session token, as stored in `sessions.id`
pub fn token_digest(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{:02x}", byte);
            out
        })
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let digest = token_digest(&session.id);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                insert_sqlite(self.pool.as_sqlite().unwrap(), &digest, session).await?
            }
            DatabaseDriver::Mysql => {
                insert_mysql(self.pool.as_mysql().unwrap(), &digest, session).await?
            }
        }
        Ok(session.clone())
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Session>> {
        let digest = token_digest(token);
        let found = match self.pool.driver() {
            DatabaseDriver::Sqlite => find_sqlite(self.pool.as_sqlite().unwrap(), &digest).await?,
            DatabaseDriver::Mysql => find_mysql(self.pool.as_mysql().unwrap(), &digest).await?,
        };
        Ok(found.map(|(admin_id, expires_at, created_at)| Session {
            id: token.to_string(),
            admin_id,
            expires_at,
            created_at,
        }))
    }

    async fn delete(&self, token: &str) -> Result<()> {
        let digest = token_digest(token);
        let sql = "DELETE FROM sessions WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&digest)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to delete session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&digest)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to delete session")?;
            }
        }
        Ok(())
    }

    async fn delete_by_admin(&self, admin_id: i64, keep: Option<&str>) -> Result<u64> {
        // An empty digest matches no row, so `keep = None` removes everything
        let keep = keep.map(token_digest).unwrap_or_default();
        let sql = "DELETE FROM sessions WHERE admin_id = ? AND id <> ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(admin_id)
                .bind(&keep)
                .execute(self.pool.as_sqlite().unwrap())
                .await?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(admin_id)
                .bind(&keep)
                .execute(self.pool.as_mysql().unwrap())
                .await?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE expires_at < ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
        };
        Ok(affected)
    }
}

type SessionRow = (i64, DateTime<Utc>, DateTime<Utc>);

const INSERT_SESSION: &str =
    "INSERT INTO sessions (id, admin_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
const SELECT_SESSION: &str = "SELECT admin_id, expires_at, created_at FROM sessions WHERE id = ?";

async fn insert_sqlite(pool: &SqlitePool, digest: &str, session: &Session) -> Result<()> {
    sqlx::query(INSERT_SESSION)
        .bind(digest)
        .bind(session.admin_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;
    Ok(())
}

async fn find_sqlite(pool: &SqlitePool, digest: &str) -> Result<Option<SessionRow>> {
    let row = sqlx::query(SELECT_SESSION)
        .bind(digest)
        .fetch_optional(pool)
        .await
        .context("Failed to get session")?;
    Ok(row.map(|r| (r.get("admin_id"), r.get("expires_at"), r.get("created_at"))))
}

async fn insert_mysql(pool: &MySqlPool, digest: &str, session: &Session) -> Result<()> {
    sqlx::query(INSERT_SESSION)
        .bind(digest)
        .bind(session.admin_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;
    Ok(())
}

async fn find_mysql(pool: &MySqlPool, digest: &str) -> Result<Option<SessionRow>> {
    let row = sqlx::query(SELECT_SESSION)
        .bind(digest)
        .fetch_optional(pool)
        .await
        .context("Failed to get session")?;
    Ok(row.map(|r| (r.get("admin_id"), r.get("expires_at"), r.get("created_at"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_admin, setup_pool};
    use chrono::Duration;

    fn session(token: &str, admin_id: i64, expires_in: Duration) -> Session {
        let now = Utc::now();
        Session {
            id: token.to_string(),
            admin_id,
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[test]
    fn test_token_digest_is_hex_sha256() {
        let digest = token_digest("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_tokens_are_not_stored_in_clear() {
        let pool = setup_pool().await;
        let admin_id = insert_admin(&pool, "ada").await;
        let repo = SqlxSessionRepository::new(pool.clone());

        repo.create(&session("tok-1", admin_id, Duration::days(1)))
            .await
            .unwrap();

        let stored: String = sqlx::query_scalar("SELECT id FROM sessions")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(stored, token_digest("tok-1"));

        let fetched = repo.get_by_token("tok-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "tok-1");
        assert_eq!(fetched.admin_id, admin_id);
        assert!(!fetched.is_expired());

        repo.delete("tok-1").await.unwrap();
        assert!(repo.get_by_token("tok-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_admin_can_spare_one_token() {
        let pool = setup_pool().await;
        let admin_id = insert_admin(&pool, "ada").await;
        let repo = SqlxSessionRepository::new(pool);

        for token in ["laptop", "phone", "tablet"] {
            repo.create(&session(token, admin_id, Duration::days(1)))
                .await
                .unwrap();
        }

        assert_eq!(repo.delete_by_admin(admin_id, Some("laptop")).await.unwrap(), 2);
        assert!(repo.get_by_token("laptop").await.unwrap().is_some());
        assert!(repo.get_by_token("phone").await.unwrap().is_none());

        assert_eq!(repo.delete_by_admin(admin_id, None).await.unwrap(), 1);
        assert!(repo.get_by_token("laptop").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_only_removes_stale() {
        let pool = setup_pool().await;
        let admin_id = insert_admin(&pool, "ada").await;
        let repo = SqlxSessionRepository::new(pool);

        repo.create(&session("old", admin_id, Duration::hours(-1)))
            .await
            .unwrap();
        repo.create(&session("fresh", admin_id, Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(repo.delete_expired(Utc::now()).await.unwrap(), 1);
        assert!(repo.get_by_token("fresh").await.unwrap().is_some());
        assert!(repo.get_by_token("old").await.unwrap().is_none());
    }
}
