//! Series model
//!
//! A series is an ordered collection of posts (a tutorial in parts, a
//! travelogue). Membership lives on the post (`series_id`, `series_order`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Post;

/// Series entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Series with the number of published posts in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesWithCount {
    #[serde(flatten)]
    pub series: Series,
    pub post_count: i64,
}

/// Series with its published posts in reading order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesWithPosts {
    #[serde(flatten)]
    pub series: Series,
    pub posts: Vec<Post>,
}

/// Lightweight pointer to a neighbouring post in a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesLink {
    pub id: i64,
    pub slug: String,
    pub title: String,
}

/// Where a post sits inside its series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesNavigation {
    pub series_id: i64,
    pub series_slug: String,
    pub series_title: String,
    /// 1-based position among published posts
    pub position: usize,
    pub total: usize,
    pub previous: Option<SeriesLink>,
    pub next: Option<SeriesLink>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSeriesInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSeriesInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "super::post::double_option")]
    pub cover_image: Option<Option<String>>,
}

impl UpdateSeriesInput {
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.slug.is_some()
            || self.description.is_some()
            || self.cover_image.is_some()
    }
}
