//! Draft (autosave) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PostKind;

/// Autosaved editor content, optionally tied to an existing post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: i64,
    pub post_id: Option<i64>,
    pub kind: PostKind,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Autosave payload. With `id` the draft is overwritten, otherwise created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveDraftInput {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub kind: PostKind,
    #[serde(default)]
    pub title: String,
    pub content: String,
}
