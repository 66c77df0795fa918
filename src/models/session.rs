//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login session for an admin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (bearer token)
    pub id: String,
    pub admin_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
