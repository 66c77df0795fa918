//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag entity. Tags are shared by articles and short posts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    /// URL-friendly slug
    pub slug: String,
    /// Display name (unique)
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// The ID is assigned by the database.
    pub fn new(slug: String, name: String) -> Self {
        Self {
            id: 0,
            slug,
            name,
            created_at: Utc::now(),
        }
    }
}

/// Tag with the number of published posts carrying it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub post_count: i64,
}

impl TagWithCount {
    pub fn new(tag: Tag, post_count: i64) -> Self {
        Self { tag, post_count }
    }
}
