//! Post model
//!
//! Posts come in two kinds: long-form articles and short posts (untitled
//! notes). Both share one table, one status lifecycle and one slug space.
//!
//! Also home to the pagination types used by every list query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Tag;

/// Post entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// URL-friendly slug (unique across all posts)
    pub slug: String,
    pub kind: PostKind,
    /// Title (may be empty for short posts)
    pub title: String,
    /// Markdown source
    pub content: String,
    /// Rendered HTML
    pub content_html: String,
    /// Plain-text summary
    pub excerpt: String,
    pub cover_image: Option<String>,
    /// SEO title override
    pub meta_title: Option<String>,
    /// SEO description override
    pub meta_description: Option<String>,
    /// Canonical URL override (for cross-posted content)
    pub canonical_url: Option<String>,
    pub status: PostStatus,
    pub author_id: Option<i64>,
    pub series_id: Option<i64>,
    /// Position inside the series (ascending)
    pub series_order: i32,
    pub reading_time_minutes: i32,
    pub view_count: i64,
    pub comment_count: i64,
    /// Set on first publish, kept when a post is later archived
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Whether the post is visible to the public
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }

    /// Title shown in listings; short posts fall back to their excerpt
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.excerpt
        } else {
            &self.title
        }
    }
}

/// Post kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    /// Long-form article with a title
    #[default]
    Article,
    /// Short post, title optional
    Short,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Article => "article",
            PostKind::Short => "short",
        }
    }
}

impl FromStr for PostKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "article" => Ok(PostKind::Article),
            "short" => Ok(PostKind::Short),
            _ => Err(format!("Invalid post kind: {}", s)),
        }
    }
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Post publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Draft - not visible to public
    #[default]
    Draft,
    /// Published - visible to public
    Published,
    /// Archived - hidden but not deleted
    Archived,
}

impl PostStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "archived" => Ok(PostStatus::Archived),
            _ => Err(format!("Invalid post status: {}", s)),
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for creating a new post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePostInput {
    #[serde(default)]
    pub kind: PostKind,
    #[serde(default)]
    pub title: String,
    pub content: String,
    /// Explicit slug; generated from the title (or content for shorts) when absent
    #[serde(default)]
    pub slug: Option<String>,
    /// Explicit excerpt; generated from the content when absent
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub series_id: Option<i64>,
    #[serde(default)]
    pub series_order: Option<i32>,
    /// Tag names; unknown tags are created
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreatePostInput {
    pub fn article(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: PostKind::Article,
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn short(content: impl Into<String>) -> Self {
        Self {
            kind: PostKind::Short,
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn in_series(mut self, series_id: i64, order: i32) -> Self {
        self.series_id = Some(series_id);
        self.series_order = Some(order);
        self
    }
}

/// Input for updating an existing post. `None` leaves a field unchanged.
///
/// Nullable columns use `Option<Option<_>>`: `Some(None)` clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub cover_image: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub meta_title: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub meta_description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub canonical_url: Option<Option<String>>,
    pub status: Option<PostStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub series_id: Option<Option<i64>>,
    pub series_order: Option<i32>,
    pub tags: Option<Vec<String>>,
}

impl UpdatePostInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Check if any field is set
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.content.is_some()
            || self.slug.is_some()
            || self.excerpt.is_some()
            || self.cover_image.is_some()
            || self.meta_title.is_some()
            || self.meta_description.is_some()
            || self.canonical_url.is_some()
            || self.status.is_some()
            || self.series_id.is_some()
            || self.series_order.is_some()
            || self.tags.is_some()
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Filters for the public post listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostFilter {
    pub kind: Option<PostKind>,
    /// Tag slug
    pub tag: Option<String>,
    pub series_id: Option<i64>,
    /// Case-insensitive match on title and content
    pub query: Option<String>,
    /// Admin listings only; public listings are always `Published`
    pub status: Option<PostStatus>,
}

/// A post together with its tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithTags {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters, clamping to sane bounds
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// Calculate the total number of pages
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        ((self.total as u64 + self.per_page as u64 - 1) / self.per_page as u64) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Transform the items, keeping the pagination metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

impl<T> Default for PagedResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: 1,
            per_page: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [PostStatus::Draft, PostStatus::Published, PostStatus::Archived] {
            assert_eq!(status.as_str().parse::<PostStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<PostStatus>().is_err());
        assert_eq!("SHORT".parse::<PostKind>().unwrap(), PostKind::Short);
    }

    #[test]
    fn test_list_params_clamp() {
        let params = ListParams::new(0, 500);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
        assert_eq!(ListParams::new(3, 20).offset(), 40);
    }

    #[test]
    fn test_paged_result_navigation() {
        let params = ListParams::new(2, 10);
        let result = PagedResult::new(vec![1, 2, 3], 25, &params);
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_next());
        assert!(result.has_prev());

        let empty: PagedResult<i32> = PagedResult::new(vec![], 0, &ListParams::default());
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next());
    }

    #[test]
    fn test_update_input_distinguishes_null_from_absent() {
        let input: UpdatePostInput =
            serde_json::from_str(r#"{"cover_image": null, "title": "New"}"#).unwrap();
        assert_eq!(input.cover_image, Some(None));
        assert_eq!(input.series_id, None);
        assert!(input.has_changes());

        assert!(!UpdatePostInput::new().has_changes());
    }
}
