//! Admin accounts and sessions
//!
//! The first account registered becomes the owner. Further accounts are
//! editors and can only be created by the owner. Logging in issues a uuid
//! session token that is sent back as a bearer token or `session` cookie.

use anyhow::Context;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::repositories::{AdminRepository, SessionRepository};
use crate::models::{Admin, AdminRole, CreateAdminInput, Session};
use crate::services::password::{hash_password, validate_password, verify_password};

const DEFAULT_SESSION_DAYS: i64 = 7;
const MAX_USERNAME_CHARS: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AdminServiceError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Admin already exists: {0}")]
    AdminExists(String),

    #[error("Admin not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    /// Username or email
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

/// A fresh session and the admin it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
    pub admin: Admin,
}

pub struct AdminService {
    admin_repo: Arc<dyn AdminRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_days: i64,
}

impl AdminService {
    pub fn new(
        admin_repo: Arc<dyn AdminRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_days(admin_repo, session_repo, DEFAULT_SESSION_DAYS)
    }

    pub fn with_session_days(
        admin_repo: Arc<dyn AdminRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_days: i64,
    ) -> Self {
        Self {
            admin_repo,
            session_repo,
            session_days: session_days.max(1),
        }
    }

    /// Whether setup has happened
    pub async fn has_admin(&self) -> Result<bool, AdminServiceError> {
        Ok(self.admin_repo.count().await? > 0)
    }

    /// Register an admin.
    ///
    /// With no accounts yet, anyone may register and becomes the owner.
    /// Afterwards `caller` must be the owner and the new account is an editor.
    pub async fn register(
        &self,
        input: CreateAdminInput,
        caller: Option<&Admin>,
    ) -> Result<Admin, AdminServiceError> {
        let role = if self.has_admin().await? {
            match caller {
                Some(admin) if admin.is_owner() => AdminRole::Editor,
                Some(_) => {
                    return Err(AdminServiceError::Forbidden(
                        "Only the owner can add admins".to_string(),
                    ))
                }
                None => {
                    return Err(AdminServiceError::Forbidden(
                        "Registration is closed".to_string(),
                    ))
                }
            }
        } else {
            AdminRole::Owner
        };

        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        validate_account(&username, &email)?;
        validate_password(&input.password).map_err(AdminServiceError::ValidationError)?;

        if self.admin_repo.get_by_username(&username).await?.is_some() {
            return Err(AdminServiceError::AdminExists(format!(
                "Username '{}' is already taken",
                username
            )));
        }
        if self.admin_repo.get_by_email(&email).await?.is_some() {
            return Err(AdminServiceError::AdminExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let mut admin = Admin::new(username, email, password_hash, role);
        admin.display_name = input
            .display_name
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let created = self.admin_repo.create(&admin).await?;
        tracing::info!(admin_id = created.id, role = %created.role, "Admin registered");
        Ok(created)
    }

    pub async fn login(&self, input: LoginInput) -> Result<LoginResult, AdminServiceError> {
        let invalid =
            || AdminServiceError::AuthenticationError("Invalid username or password".to_string());

        let admin = match self.admin_repo.get_by_username(input.username.trim()).await? {
            Some(admin) => admin,
            None => self
                .admin_repo
                .get_by_email(&input.username.trim().to_lowercase())
                .await?
                .ok_or_else(invalid)?,
        };

        let valid = verify_password(&input.password, &admin.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            tracing::info!(admin_id = admin.id, "Rejected login");
            return Err(invalid());
        }

        let session = self.create_session(admin.id).await?;
        Ok(LoginResult {
            token: session.id,
            expires_at: session.expires_at,
            admin,
        })
    }

    pub async fn logout(&self, token: &str) -> Result<(), AdminServiceError> {
        self.session_repo.delete(token).await?;
        Ok(())
    }

    /// The admin behind a session token, or `None` for unknown or expired
    /// tokens. Expired sessions are deleted on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<Admin>, AdminServiceError> {
        let Some(session) = self.session_repo.get_by_token(token).await? else {
            return Ok(None);
        };
        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }
        Ok(self.admin_repo.get_by_id(session.admin_id).await?)
    }

    pub async fn list(&self, caller: &Admin) -> Result<Vec<Admin>, AdminServiceError> {
        require_owner(caller)?;
        Ok(self.admin_repo.list().await?)
    }

    /// Remove another admin and their sessions
    pub async fn delete(&self, caller: &Admin, id: i64) -> Result<(), AdminServiceError> {
        require_owner(caller)?;
        if caller.id == id {
            return Err(AdminServiceError::ValidationError(
                "You cannot delete your own account".to_string(),
            ));
        }
        if self.admin_repo.get_by_id(id).await?.is_none() {
            return Err(AdminServiceError::NotFound(id.to_string()));
        }
        self.session_repo.delete_by_admin(id, None).await?;
        self.admin_repo.delete(id).await?;
        tracing::info!(admin_id = id, "Admin deleted");
        Ok(())
    }

    /// Change the caller's password; every other session is signed out
    pub async fn change_password(
        &self,
        admin: &Admin,
        current_token: &str,
        input: ChangePasswordInput,
    ) -> Result<(), AdminServiceError> {
        let valid = verify_password(&input.current_password, &admin.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            return Err(AdminServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }
        validate_password(&input.new_password).map_err(AdminServiceError::ValidationError)?;

        let password_hash =
            hash_password(&input.new_password).context("Failed to hash password")?;
        self.admin_repo.update_password(admin.id, &password_hash).await?;

        let signed_out = self
            .session_repo
            .delete_by_admin(admin.id, Some(current_token))
            .await?;
        tracing::info!(admin_id = admin.id, signed_out, "Password changed");
        Ok(())
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, AdminServiceError> {
        Ok(self.session_repo.delete_expired(Utc::now()).await?)
    }

    async fn create_session(&self, admin_id: i64) -> Result<Session, AdminServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            admin_id,
            expires_at: now + Duration::days(self.session_days),
            created_at: now,
        };
        Ok(self.session_repo.create(&session).await?)
    }
}

fn require_owner(admin: &Admin) -> Result<(), AdminServiceError> {
    if !admin.is_owner() {
        return Err(AdminServiceError::Forbidden(
            "Owner permission required".to_string(),
        ));
    }
    Ok(())
}

fn validate_account(username: &str, email: &str) -> Result<(), AdminServiceError> {
    if username.is_empty() || username.chars().count() > MAX_USERNAME_CHARS {
        return Err(AdminServiceError::ValidationError(format!(
            "Username must be 1 to {} characters",
            MAX_USERNAME_CHARS
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(AdminServiceError::ValidationError(
            "Username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }
    let valid_email = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !valid_email {
        return Err(AdminServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{SqlxAdminRepository, SqlxSessionRepository};

    async fn setup_service() -> AdminService {
        let pool = setup_pool().await;
        AdminService::new(
            SqlxAdminRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
        )
    }

    fn account(username: &str) -> CreateAdminInput {
        CreateAdminInput {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "correct horse".to_string(),
            display_name: None,
        }
    }

    fn login(username: &str, password: &str) -> LoginInput {
        LoginInput {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_admin_is_owner_then_registration_closes() {
        let service = setup_service().await;
        assert!(!service.has_admin().await.unwrap());

        let owner = service.register(account("sam"), None).await.unwrap();
        assert_eq!(owner.role, AdminRole::Owner);
        assert!(service.has_admin().await.unwrap());

        assert!(matches!(
            service.register(account("eve"), None).await,
            Err(AdminServiceError::Forbidden(_))
        ));

        let editor = service.register(account("kim"), Some(&owner)).await.unwrap();
        assert_eq!(editor.role, AdminRole::Editor);
        assert!(matches!(
            service.register(account("lee"), Some(&editor)).await,
            Err(AdminServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.register(account("kim"), Some(&owner)).await,
            Err(AdminServiceError::AdminExists(_))
        ));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let service = setup_service().await;
        let short = CreateAdminInput {
            password: "short".to_string(),
            ..account("sam")
        };
        assert!(matches!(
            service.register(short, None).await,
            Err(AdminServiceError::ValidationError(_))
        ));
        let bad_email = CreateAdminInput {
            email: "not-an-email".to_string(),
            ..account("sam")
        };
        assert!(service.register(bad_email, None).await.is_err());
        assert!(!service.has_admin().await.unwrap());
    }

    #[tokio::test]
    async fn test_login_logout_and_session() {
        let service = setup_service().await;
        let owner = service.register(account("sam"), None).await.unwrap();

        assert!(matches!(
            service.login(login("sam", "wrong password")).await,
            Err(AdminServiceError::AuthenticationError(_))
        ));
        assert!(service.login(login("nobody", "correct horse")).await.is_err());

        let by_email = service
            .login(login("SAM@example.com", "correct horse"))
            .await
            .unwrap();
        assert_eq!(by_email.admin.id, owner.id);

        let result = service.login(login("sam", "correct horse")).await.unwrap();
        let current = service.validate_session(&result.token).await.unwrap().unwrap();
        assert_eq!(current.id, owner.id);

        service.logout(&result.token).await.unwrap();
        assert!(service.validate_session(&result.token).await.unwrap().is_none());
        assert!(service.validate_session("garbage").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owner_manages_admins() {
        let service = setup_service().await;
        let owner = service.register(account("sam"), None).await.unwrap();
        let editor = service.register(account("kim"), Some(&owner)).await.unwrap();

        assert_eq!(service.list(&owner).await.unwrap().len(), 2);
        assert!(matches!(
            service.list(&editor).await,
            Err(AdminServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete(&owner, owner.id).await,
            Err(AdminServiceError::ValidationError(_))
        ));

        let session = service.login(login("kim", "correct horse")).await.unwrap();
        service.delete(&owner, editor.id).await.unwrap();
        assert!(service.validate_session(&session.token).await.unwrap().is_none());
        assert!(matches!(
            service.delete(&owner, editor.id).await,
            Err(AdminServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password_keeps_current_session() {
        let service = setup_service().await;
        service.register(account("sam"), None).await.unwrap();
        let current = service.login(login("sam", "correct horse")).await.unwrap();
        let other = service.login(login("sam", "correct horse")).await.unwrap();

        let change = ChangePasswordInput {
            current_password: "correct horse".to_string(),
            new_password: "battery staple".to_string(),
        };
        service
            .change_password(&current.admin, &current.token, change)
            .await
            .unwrap();

        assert!(service.validate_session(&current.token).await.unwrap().is_some());
        assert!(service.validate_session(&other.token).await.unwrap().is_none());
        assert!(service.login(login("sam", "correct horse")).await.is_err());
        assert!(service.login(login("sam", "battery staple")).await.is_ok());
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }
}
