//! Tag service
//!
//! Tag cloud with post counts, tag creation (reusing an existing tag of the
//! same name) and the per-tag post listing.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::TagRepository;
use crate::models::{ListParams, PagedResult, PostFilter, PostWithTags, Tag, TagWithCount};
use crate::services::post::{invalidate_content_cache, PostService, PostServiceError};
use crate::services::text::{generate_slug, unique_slug};

const TAG_LIST_CACHE_KEY: &str = "tags:list";
const TAG_CACHE_TTL_SECS: u64 = 600;
const MAX_TAG_NAME_CHARS: usize = 50;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<PostServiceError> for TagServiceError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound(what) => TagServiceError::NotFound(what),
            PostServiceError::ValidationError(msg) => TagServiceError::ValidationError(msg),
            PostServiceError::DuplicateSlug(slug) => TagServiceError::ValidationError(slug),
            PostServiceError::InternalError(e) => TagServiceError::InternalError(e),
        }
    }
}

/// A tag and one page of its published posts
#[derive(Debug, Clone, serde::Serialize)]
pub struct TagPosts {
    pub tag: Tag,
    pub posts: PagedResult<PostWithTags>,
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
    posts: Arc<PostService>,
    cache: Arc<Cache>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>, posts: Arc<PostService>, cache: Arc<Cache>) -> Self {
        Self { repo, posts, cache }
    }

    /// Tags with their published post counts, most used first
    pub async fn list(&self) -> Result<Vec<TagWithCount>, TagServiceError> {
        if let Ok(Some(cached)) = self.cache.get::<Vec<TagWithCount>>(TAG_LIST_CACHE_KEY).await {
            return Ok(cached);
        }

        let tags = self.repo.list_with_counts().await?;
        let _ = self
            .cache
            .set(TAG_LIST_CACHE_KEY, &tags, Duration::from_secs(TAG_CACHE_TTL_SECS))
            .await;
        Ok(tags)
    }

    /// Create a tag, or return the existing one with the same name
    /// (case-insensitive).
    pub async fn create(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TagServiceError::ValidationError(
                "Tag name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_TAG_NAME_CHARS {
            return Err(TagServiceError::ValidationError(format!(
                "Tag name must be at most {} characters",
                MAX_TAG_NAME_CHARS
            )));
        }

        if let Some(existing) = self.repo.get_by_name(name).await? {
            return Ok(existing);
        }

        let repo = self.repo.clone();
        let slug = unique_slug(&generate_slug(name), "tag", |candidate| {
            let repo = repo.clone();
            async move { Ok(repo.get_by_slug(&candidate).await?.is_some()) }
        })
        .await?;

        let tag = self.repo.create(&Tag::new(slug, name.to_string())).await?;
        invalidate_content_cache(&self.cache).await;
        Ok(tag)
    }

    /// Delete a tag; posts lose it
    pub async fn delete(&self, id: i64) -> Result<(), TagServiceError> {
        if self.repo.get_by_id(id).await?.is_none() {
            return Err(TagServiceError::NotFound(id.to_string()));
        }
        self.repo.delete(id).await?;
        invalidate_content_cache(&self.cache).await;
        Ok(())
    }

    /// Published posts carrying the tag, newest first
    pub async fn posts_by_tag(
        &self,
        slug: &str,
        params: &ListParams,
    ) -> Result<TagPosts, TagServiceError> {
        let tag = self
            .repo
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| TagServiceError::NotFound(slug.to_string()))?;

        let filter = PostFilter {
            tag: Some(tag.slug.clone()),
            ..Default::default()
        };
        let posts = self.posts.list_published(params, &filter).await?;
        Ok(TagPosts { tag, posts })
    }
}
