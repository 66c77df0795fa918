//! Admin model
//!
//! Admins are the only authenticated principals. The first account created
//! becomes the `Owner`; later accounts are `Editor`s created by the owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Admin account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub role: AdminRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Admin {
    /// The password must already be hashed (see `services::password`).
    pub fn new(username: String, email: String, password_hash: String, role: AdminRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            password_hash,
            display_name: None,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owner(&self) -> bool {
        self.role == AdminRole::Owner
    }

    /// Name used for bylines and feeds
    pub fn byline(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Admin role
///
/// - Owner: everything, including site settings and other admins
/// - Editor: content, comments, analytics and tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    Owner,
    #[default]
    Editor,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::Owner => "owner",
            AdminRole::Editor => "editor",
        }
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AdminRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(AdminRole::Owner),
            "editor" => Ok(AdminRole::Editor),
            _ => Err(anyhow::anyhow!("Invalid admin role: {}", s)),
        }
    }
}

/// Input for creating an admin (before password hashing)
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAdminInput {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_not_serialized() {
        let admin = Admin::new(
            "ada".to_string(),
            "ada@example.com".to_string(),
            "$argon2id$secret".to_string(),
            AdminRole::Owner,
        );
        let json = serde_json::to_string(&admin).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"owner\""));
    }

    #[test]
    fn test_byline_prefers_display_name() {
        let mut admin = Admin::new("ada".into(), "a@x.io".into(), "h".into(), AdminRole::Editor);
        assert_eq!(admin.byline(), "ada");
        admin.display_name = Some("Ada L.".into());
        assert_eq!(admin.byline(), "Ada L.");
        assert!(!admin.is_owner());
    }
}
