//! Snippet library model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reusable code snippet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    /// Highlighting language (`rust`, `sql`, `text`, ...)
    pub language: String,
    pub code: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSnippetInput {
    pub title: String,
    #[serde(default)]
    pub language: Option<String>,
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSnippetInput {
    pub title: Option<String>,
    pub language: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
}
