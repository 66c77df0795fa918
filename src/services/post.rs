//! Post service
//!
//! Business logic for articles and short posts:
//! - create, update, delete with validation
//! - slug, excerpt, reading time and HTML derived from the markdown source
//! - tags assigned by name and created on demand
//! - cached public reads, invalidated on every write

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{PostRepository, SeriesRepository, TagRepository};
use crate::models::{
    CreatePostInput, ListParams, PagedResult, Post, PostFilter, PostKind, PostStatus,
    PostWithTags, SeriesNavigation, Tag, UpdatePostInput,
};
use crate::services::markdown::{MarkdownRenderer, TocEntry};
use crate::services::series::navigation_for;
use crate::services::text::{
    excerpt, generate_slug, reading_time_minutes, strip_markdown, unique_slug,
};

/// Public post detail cache TTL; short because view and comment counters move
const POST_CACHE_TTL_SECS: u64 = 60;
const POST_LIST_CACHE_TTL_SECS: u64 = 300;

const CACHE_KEY_POST_BY_SLUG: &str = "post:slug:";
const CACHE_KEY_POST_LIST: &str = "posts:list:";

pub const EXCERPT_CHARS: usize = 200;
pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_TAGS_PER_POST: usize = 20;
const MAX_TAG_NAME_CHARS: usize = 50;
/// Characters of a short post used to derive its slug
const SHORT_SLUG_SOURCE_CHARS: usize = 48;

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Post slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A published post as served to readers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
    pub series: Option<SeriesNavigation>,
    pub toc: Vec<TocEntry>,
}

/// Post counts for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostCounts {
    pub published: i64,
    pub drafts: i64,
    pub archived: i64,
}

/// Drop every cached post, listing, tag and series entry.
///
/// Posts show up in all of those, so any content write clears them together.
pub(crate) async fn invalidate_content_cache(cache: &Cache) {
    for pattern in ["post:*", "posts:*", "tags:*", "series:*"] {
        if let Err(e) = cache.delete_pattern(pattern).await {
            tracing::warn!(pattern, error = %e, "Failed to invalidate cache");
        }
    }
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    tag_repo: Arc<dyn TagRepository>,
    series_repo: Arc<dyn SeriesRepository>,
    cache: Arc<Cache>,
    markdown_renderer: MarkdownRenderer,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        tag_repo: Arc<dyn TagRepository>,
        series_repo: Arc<dyn SeriesRepository>,
        cache: Arc<Cache>,
        markdown_renderer: MarkdownRenderer,
    ) -> Self {
        Self {
            repo,
            tag_repo,
            series_repo,
            cache,
            markdown_renderer,
        }
    }

    pub fn renderer(&self) -> &MarkdownRenderer {
        &self.markdown_renderer
    }

    /// Create a post.
    ///
    /// # Errors
    /// - `ValidationError` for an empty content, an article without title or
    ///   an unknown series
    /// - `DuplicateSlug` if an explicitly requested slug is taken
    pub async fn create(
        &self,
        input: CreatePostInput,
        author_id: Option<i64>,
    ) -> Result<PostWithTags, PostServiceError> {
        let title = input.title.trim().to_string();
        validate_title(input.kind, &title)?;
        validate_content(&input.content)?;
        if let Some(series_id) = input.series_id {
            self.ensure_series(series_id).await?;
        }
        let tag_names = normalize_tag_names(&input.tags)?;

        let slug = self
            .pick_slug(input.slug.as_deref(), input.kind, &title, &input.content, None)
            .await?;

        let series_order = match (input.series_id, input.series_order) {
            (Some(_), Some(order)) => order,
            (Some(series_id), None) => self.next_series_order(series_id).await?,
            (None, _) => 0,
        };

        let status = input.status.unwrap_or_default();
        let now = Utc::now();
        let mut post = Post {
            id: 0,
            slug,
            kind: input.kind,
            title,
            content: input.content,
            content_html: String::new(),
            excerpt: String::new(),
            cover_image: non_empty(input.cover_image),
            meta_title: non_empty(input.meta_title),
            meta_description: non_empty(input.meta_description),
            canonical_url: non_empty(input.canonical_url),
            status,
            author_id,
            series_id: input.series_id,
            series_order,
            reading_time_minutes: 1,
            view_count: 0,
            comment_count: 0,
            published_at: (status == PostStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
        };
        self.derive_fields(&mut post, input.excerpt.as_deref());

        let post = self.repo.create(&post).await?;
        let tags = self.assign_tags(post.id, &tag_names).await?;

        invalidate_content_cache(&self.cache).await;
        tracing::info!(post_id = post.id, slug = %post.slug, status = %post.status, "Post created");

        Ok(PostWithTags { post, tags })
    }

    /// Apply a partial update.
    ///
    /// The slug follows the title only while the post has never been
    /// published; after that it changes only when asked for explicitly.
    pub async fn update(
        &self,
        id: i64,
        input: UpdatePostInput,
    ) -> Result<PostWithTags, PostServiceError> {
        let mut post = self.get_post(id).await?;
        let old_slug = post.slug.clone();
        // A stored excerpt that doesn't match the generated one was written by hand
        let custom_excerpt =
            (post.excerpt != generated_excerpt(&post.content)).then(|| post.excerpt.clone());

        if let Some(title) = &input.title {
            let title = title.trim().to_string();
            validate_title(post.kind, &title)?;
            post.title = title;
        }
        if let Some(content) = input.content {
            validate_content(&content)?;
            post.content = content;
        }

        let tag_names = match &input.tags {
            Some(tags) => Some(normalize_tag_names(tags)?),
            None => None,
        };

        if let Some(slug) = input.slug.as_deref() {
            post.slug = self
                .pick_slug(Some(slug), post.kind, &post.title, &post.content, Some(id))
                .await?;
        } else if input.title.is_some() && post.published_at.is_none() {
            post.slug = self
                .pick_slug(None, post.kind, &post.title, &post.content, Some(id))
                .await?;
        }

        if let Some(cover_image) = input.cover_image {
            post.cover_image = non_empty(cover_image);
        }
        if let Some(meta_title) = input.meta_title {
            post.meta_title = non_empty(meta_title);
        }
        if let Some(meta_description) = input.meta_description {
            post.meta_description = non_empty(meta_description);
        }
        if let Some(canonical_url) = input.canonical_url {
            post.canonical_url = non_empty(canonical_url);
        }

        if let Some(series_id) = input.series_id {
            match series_id {
                Some(series_id) if post.series_id != Some(series_id) => {
                    self.ensure_series(series_id).await?;
                    post.series_id = Some(series_id);
                    if input.series_order.is_none() {
                        post.series_order = self.next_series_order(series_id).await?;
                    }
                }
                Some(_) => {}
                None => {
                    post.series_id = None;
                    post.series_order = 0;
                }
            }
        }
        if let Some(order) = input.series_order {
            post.series_order = order;
        }

        let now = Utc::now();
        if let Some(status) = input.status {
            post.status = status;
            if status == PostStatus::Published && post.published_at.is_none() {
                post.published_at = Some(now);
            }
        }

        let requested_excerpt = input.excerpt.or(custom_excerpt);
        self.derive_fields(&mut post, requested_excerpt.as_deref());
        post.updated_at = now;

        let post = self.repo.update(&post).await?;
        let tags = match tag_names {
            Some(names) => self.assign_tags(post.id, &names).await?,
            None => self.tag_repo.get_for_post(post.id).await?,
        };

        invalidate_content_cache(&self.cache).await;
        if old_slug != post.slug {
            tracing::info!(post_id = id, from = %old_slug, to = %post.slug, "Post slug changed");
        }

        Ok(PostWithTags { post, tags })
    }

    pub async fn delete(&self, id: i64) -> Result<(), PostServiceError> {
        let post = self.get_post(id).await?;
        self.repo.delete(id).await?;
        invalidate_content_cache(&self.cache).await;
        tracing::info!(post_id = id, slug = %post.slug, "Post deleted");
        Ok(())
    }

    /// Any post by ID, whatever its status (admin)
    pub async fn get_by_id(&self, id: i64) -> Result<PostWithTags, PostServiceError> {
        let post = self.get_post(id).await?;
        let tags = self.tag_repo.get_for_post(id).await?;
        Ok(PostWithTags { post, tags })
    }

    /// A published post with tags, series navigation and table of contents
    pub async fn get_published_by_slug(&self, slug: &str) -> Result<PostDetail, PostServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_POST_BY_SLUG, slug);
        if let Ok(Some(cached)) = self.cache.get::<PostDetail>(&cache_key).await {
            return Ok(cached);
        }

        let post = self
            .repo
            .get_by_slug(slug)
            .await?
            .filter(Post::is_published)
            .ok_or_else(|| PostServiceError::NotFound(slug.to_string()))?;

        let tags = self.tag_repo.get_for_post(post.id).await?;
        let series = match post.series_id {
            Some(series_id) => match self.series_repo.get_by_id(series_id).await? {
                Some(series) => {
                    let members = self.repo.list_by_series(series_id, true).await?;
                    navigation_for(&series, &members, post.id)
                }
                None => None,
            },
            None => None,
        };
        let (_, toc) = self.markdown_renderer.render_with_toc(&post.content);

        let detail = PostDetail {
            post,
            tags,
            series,
            toc,
        };
        let _ = self
            .cache
            .set(&cache_key, &detail, Duration::from_secs(POST_CACHE_TTL_SECS))
            .await;
        Ok(detail)
    }

    /// Published posts, newest first
    pub async fn list_published(
        &self,
        params: &ListParams,
        filter: &PostFilter,
    ) -> Result<PagedResult<PostWithTags>, PostServiceError> {
        let filter = PostFilter {
            status: Some(PostStatus::Published),
            ..filter.clone()
        };

        let cache_key = format!(
            "{}{}:{}:{:?}:{:?}:{:?}:{:?}",
            CACHE_KEY_POST_LIST,
            params.page,
            params.per_page,
            filter.kind,
            filter.tag,
            filter.series_id,
            filter.query
        );
        if let Ok(Some(cached)) = self.cache.get::<PagedResult<PostWithTags>>(&cache_key).await {
            return Ok(cached);
        }

        let result = self.list_with_tags(params, &filter).await?;
        let _ = self
            .cache
            .set(
                &cache_key,
                &result,
                Duration::from_secs(POST_LIST_CACHE_TTL_SECS),
            )
            .await;
        Ok(result)
    }

    /// Every post matching the filter, any status (admin)
    pub async fn list_admin(
        &self,
        params: &ListParams,
        filter: &PostFilter,
    ) -> Result<PagedResult<PostWithTags>, PostServiceError> {
        self.list_with_tags(params, filter).await
    }

    pub async fn counts(&self) -> Result<PostCounts, PostServiceError> {
        let counts = self.repo.count_by_status().await?;
        let get = |status| counts.get(&status).copied().unwrap_or(0);
        Ok(PostCounts {
            published: get(PostStatus::Published),
            drafts: get(PostStatus::Draft),
            archived: get(PostStatus::Archived),
        })
    }

    /// Latest published posts (feed, dashboard)
    pub async fn recent_published(&self, limit: i64) -> Result<Vec<Post>, PostServiceError> {
        Ok(self.repo.recent_published(limit).await?)
    }

    async fn list_with_tags(
        &self,
        params: &ListParams,
        filter: &PostFilter,
    ) -> Result<PagedResult<PostWithTags>, PostServiceError> {
        let (posts, total) = self.repo.list(params, filter).await?;
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        let mut tags: HashMap<i64, Vec<Tag>> = self.tag_repo.get_for_posts(&ids).await?;

        Ok(PagedResult::new(posts, total, params).map(|post| PostWithTags {
            tags: tags.remove(&post.id).unwrap_or_default(),
            post,
        }))
    }

    async fn get_post(&self, id: i64) -> Result<Post, PostServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))
    }

    async fn ensure_series(&self, series_id: i64) -> Result<(), PostServiceError> {
        if self.series_repo.get_by_id(series_id).await?.is_none() {
            return Err(PostServiceError::ValidationError(format!(
                "Series {} does not exist",
                series_id
            )));
        }
        Ok(())
    }

    async fn next_series_order(&self, series_id: i64) -> Result<i32, PostServiceError> {
        let members = self.repo.list_by_series(series_id, false).await?;
        Ok(members.iter().map(|p| p.series_order).max().unwrap_or(0) + 1)
    }

    /// Recompute HTML, excerpt and reading time from the markdown source
    fn derive_fields(&self, post: &mut Post, requested_excerpt: Option<&str>) {
        post.content_html = self.markdown_renderer.render(&post.content);
        post.reading_time_minutes = reading_time_minutes(&post.content);
        post.excerpt = match requested_excerpt.map(str::trim).filter(|e| !e.is_empty()) {
            Some(custom) => custom.to_string(),
            None => generated_excerpt(&post.content),
        };
    }

    /// Explicit slugs must be free; derived ones get the first free suffix
    async fn pick_slug(
        &self,
        requested: Option<&str>,
        kind: PostKind,
        title: &str,
        content: &str,
        exclude_id: Option<i64>,
    ) -> Result<String, PostServiceError> {
        if let Some(requested) = requested.map(generate_slug).filter(|s| !s.is_empty()) {
            if self.repo.slug_exists(&requested, exclude_id).await? {
                return Err(PostServiceError::DuplicateSlug(requested));
            }
            return Ok(requested);
        }

        let base = match kind {
            PostKind::Short if title.is_empty() => {
                generate_slug(&excerpt(&strip_markdown(content), SHORT_SLUG_SOURCE_CHARS))
            }
            _ => generate_slug(title),
        };

        let repo = self.repo.clone();
        Ok(unique_slug(&base, "post", |candidate| {
            let repo = repo.clone();
            async move { repo.slug_exists(&candidate, exclude_id).await }
        })
        .await?)
    }

    /// Replace the post's tags, creating unknown names
    async fn assign_tags(&self, post_id: i64, names: &[String]) -> Result<Vec<Tag>, PostServiceError> {
        let mut tags = Vec::with_capacity(names.len());
        for name in names {
            let tag = match self.tag_repo.get_by_name(name).await? {
                Some(tag) => tag,
                None => {
                    let repo = self.tag_repo.clone();
                    let slug = unique_slug(&generate_slug(name), "tag", |candidate| {
                        let repo = repo.clone();
                        async move { Ok(repo.get_by_slug(&candidate).await?.is_some()) }
                    })
                    .await?;
                    self.tag_repo.create(&Tag::new(slug, name.clone())).await?
                }
            };
            tags.push(tag);
        }

        let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
        self.tag_repo.set_post_tags(post_id, &ids).await?;
        Ok(tags)
    }
}

fn generated_excerpt(content: &str) -> String {
    excerpt(&strip_markdown(content), EXCERPT_CHARS)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_title(kind: PostKind, title: &str) -> Result<(), PostServiceError> {
    if kind == PostKind::Article && title.is_empty() {
        return Err(PostServiceError::ValidationError(
            "Article title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(PostServiceError::ValidationError(format!(
            "Title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), PostServiceError> {
    if content.trim().is_empty() {
        return Err(PostServiceError::ValidationError(
            "Post content cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Trim, drop empties and case-insensitive duplicates, keep first spelling
fn normalize_tag_names(names: &[String]) -> Result<Vec<String>, PostServiceError> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for name in names {
        let name = name.trim();
        if name.is_empty() || !seen.insert(name.to_lowercase()) {
            continue;
        }
        if name.chars().count() > MAX_TAG_NAME_CHARS {
            return Err(PostServiceError::ValidationError(format!(
                "Tag names must be at most {} characters",
                MAX_TAG_NAME_CHARS
            )));
        }
        result.push(name.to_string());
    }
    if result.len() > MAX_TAGS_PER_POST {
        return Err(PostServiceError::ValidationError(format!(
            "A post can have at most {} tags",
            MAX_TAGS_PER_POST
        )));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{SqlxPostRepository, SqlxSeriesRepository, SqlxTagRepository};
    use crate::db::DynDatabasePool;
    use crate::models::{CreateSeriesInput, Series};

    async fn setup_service() -> (DynDatabasePool, PostService) {
        let pool = setup_pool().await;
        let service = PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool.clone()),
            SqlxSeriesRepository::boxed(pool.clone()),
            create_cache(&CacheConfig::default()).unwrap(),
            MarkdownRenderer::new(),
        );
        (pool, service)
    }

    async fn create_series(pool: &DynDatabasePool, title: &str) -> Series {
        let input = CreateSeriesInput {
            title: title.to_string(),
            ..Default::default()
        };
        let now = Utc::now();
        SqlxSeriesRepository::boxed(pool.clone())
            .create(&Series {
                id: 0,
                slug: generate_slug(&input.title),
                title: input.title,
                description: input.description,
                cover_image: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_normalize_tag_names() {
        let names = vec![
            " Rust ".to_string(),
            "rust".to_string(),
            "".to_string(),
            "Web Dev".to_string(),
        ];
        assert_eq!(normalize_tag_names(&names).unwrap(), vec!["Rust", "Web Dev"]);

        let too_many: Vec<String> = (0..=MAX_TAGS_PER_POST).map(|i| format!("t{}", i)).collect();
        assert!(normalize_tag_names(&too_many).is_err());
    }

    #[tokio::test]
    async fn test_create_derives_fields() {
        let (_pool, service) = setup_service().await;
        let content = format!("# Intro\n\n{}", "word ".repeat(450));
        let created = service
            .create(
                CreatePostInput::article("Hello World", content).with_tags(&["Rust", "rust", "Web"]),
                None,
            )
            .await
            .unwrap();

        let post = &created.post;
        assert_eq!(post.slug, "hello-world");
        assert_eq!(post.status, PostStatus::Draft);
        assert!(post.published_at.is_none());
        assert_eq!(post.reading_time_minutes, 3);
        assert!(post.content_html.contains("<h1 id=\"intro\">"));
        assert!(post.excerpt.starts_with("Intro word"));
        assert!(post.excerpt.ends_with("..."));
        assert_eq!(created.tags.len(), 2);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (_pool, service) = setup_service().await;
        assert!(matches!(
            service.create(CreatePostInput::article("  ", "Body"), None).await,
            Err(PostServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create(CreatePostInput::article("Title", "   "), None).await,
            Err(PostServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service
                .create(CreatePostInput::article("Title", "Body").in_series(999, 1), None)
                .await,
            Err(PostServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_slugs_get_suffixes_but_explicit_conflicts_fail() {
        let (_pool, service) = setup_service().await;
        let a = service.create(CreatePostInput::article("Same", "One"), None).await.unwrap();
        let b = service.create(CreatePostInput::article("Same", "Two"), None).await.unwrap();
        let c = service.create(CreatePostInput::article("Same", "Three"), None).await.unwrap();
        assert_eq!(a.post.slug, "same");
        assert_eq!(b.post.slug, "same-2");
        assert_eq!(c.post.slug, "same-3");

        assert!(matches!(
            service
                .create(CreatePostInput::article("Other", "Body").with_slug("same"), None)
                .await,
            Err(PostServiceError::DuplicateSlug(_))
        ));
    }

    #[tokio::test]
    async fn test_short_post_slug_from_content() {
        let (_pool, service) = setup_service().await;
        let short = service
            .create(CreatePostInput::short("Just shipped **v2** of the site!"), None)
            .await
            .unwrap();
        assert_eq!(short.post.slug, "just-shipped-v2-of-the-site");
        assert_eq!(short.post.kind, PostKind::Short);
        assert_eq!(short.post.display_title(), short.post.excerpt);
    }

    #[tokio::test]
    async fn test_published_at_set_on_first_publish_only() {
        let (_pool, service) = setup_service().await;
        let created = service
            .create(CreatePostInput::article("Draft Title", "Body"), None)
            .await
            .unwrap();
        let id = created.post.id;

        // Unpublished posts follow their title
        let renamed = service
            .update(id, UpdatePostInput::new().with_title("Better Title"))
            .await
            .unwrap();
        assert_eq!(renamed.post.slug, "better-title");

        let published = service
            .update(id, UpdatePostInput::new().with_status(PostStatus::Published))
            .await
            .unwrap();
        let first_publish = published.post.published_at.unwrap();

        service
            .update(id, UpdatePostInput::new().with_status(PostStatus::Draft))
            .await
            .unwrap();
        let republished = service
            .update(
                id,
                UpdatePostInput::new()
                    .with_status(PostStatus::Published)
                    .with_title("Final Title"),
            )
            .await
            .unwrap();
        assert_eq!(republished.post.published_at.unwrap(), first_publish);
        // Published URLs stay stable
        assert_eq!(republished.post.slug, "better-title");
    }

    #[tokio::test]
    async fn test_hand_written_excerpt_survives_updates() {
        let (_pool, service) = setup_service().await;
        let mut input = CreatePostInput::article("Summary", "Body text that is long enough");
        input.excerpt = Some("Hand written summary".to_string());
        let id = service.create(input, None).await.unwrap().post.id;

        let published = service
            .update(id, UpdatePostInput::new().with_status(PostStatus::Published))
            .await
            .unwrap();
        assert_eq!(published.post.excerpt, "Hand written summary");

        let edited = service
            .update(id, UpdatePostInput::new().with_content("Rewritten body"))
            .await
            .unwrap();
        assert_eq!(edited.post.excerpt, "Hand written summary");

        // An empty excerpt hands it back to the generator
        let mut reset = UpdatePostInput::new();
        reset.excerpt = Some(String::new());
        let reset = service.update(id, reset).await.unwrap();
        assert_eq!(reset.post.excerpt, "Rewritten body");

        let regenerated = service
            .update(id, UpdatePostInput::new().with_content("Fresh words"))
            .await
            .unwrap();
        assert_eq!(regenerated.post.excerpt, "Fresh words");
    }

    #[tokio::test]
    async fn test_update_tags_and_clear_fields() {
        let (_pool, service) = setup_service().await;
        let mut input = CreatePostInput::article("Tagged", "Body").with_tags(&["a", "b"]);
        input.cover_image = Some("/uploads/x.png".to_string());
        let created = service.create(input, None).await.unwrap();

        let update: UpdatePostInput =
            serde_json::from_str(r#"{"tags": ["b", "c"], "cover_image": null}"#).unwrap();
        let updated = service.update(created.post.id, update).await.unwrap();
        let names: Vec<&str> = updated.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(updated.post.cover_image, None);

        assert!(matches!(
            service.update(999, UpdatePostInput::new().with_title("x")).await,
            Err(PostServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_public_reads_hide_drafts_and_see_writes() {
        let (_pool, service) = setup_service().await;
        let published = service
            .create(
                CreatePostInput::article("Visible", "Body")
                    .with_status(PostStatus::Published)
                    .with_tags(&["News"]),
                None,
            )
            .await
            .unwrap();
        service
            .create(CreatePostInput::article("Hidden", "Body"), None)
            .await
            .unwrap();

        let params = ListParams::default();
        let page = service.list_published(&params, &PostFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].tags[0].slug, "news");

        let by_tag = PostFilter {
            tag: Some("news".to_string()),
            ..Default::default()
        };
        assert_eq!(service.list_published(&params, &by_tag).await.unwrap().total, 1);

        assert!(matches!(
            service.get_published_by_slug("hidden").await,
            Err(PostServiceError::NotFound(_))
        ));
        let detail = service.get_published_by_slug("visible").await.unwrap();
        assert_eq!(detail.post.id, published.post.id);

        // Cached listing is invalidated by the next write
        service
            .create(
                CreatePostInput::article("Second", "Body").with_status(PostStatus::Published),
                None,
            )
            .await
            .unwrap();
        let page = service.list_published(&params, &PostFilter::default()).await.unwrap();
        assert_eq!(page.total, 2);

        let admin = service.list_admin(&params, &PostFilter::default()).await.unwrap();
        assert_eq!(admin.total, 3);
        let counts = service.counts().await.unwrap();
        assert_eq!(counts, PostCounts { published: 2, drafts: 1, archived: 0 });
    }

    #[tokio::test]
    async fn test_series_membership_and_navigation() {
        let (pool, service) = setup_service().await;
        let series = create_series(&pool, "Guide").await;

        let mut ids = Vec::new();
        for title in ["Part One", "Part Two", "Part Three"] {
            let mut input = CreatePostInput::article(title, "Body").with_status(PostStatus::Published);
            input.series_id = Some(series.id);
            ids.push(service.create(input, None).await.unwrap().post);
        }
        assert_eq!(
            ids.iter().map(|p| p.series_order).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let detail = service.get_published_by_slug("part-two").await.unwrap();
        let nav = detail.series.unwrap();
        assert_eq!(nav.position, 2);
        assert_eq!(nav.previous.unwrap().slug, "part-one");
        assert_eq!(nav.next.unwrap().slug, "part-three");

        let leave: UpdatePostInput = serde_json::from_str(r#"{"series_id": null}"#).unwrap();
        let left = service.update(ids[0].id, leave).await.unwrap();
        assert_eq!(left.post.series_id, None);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_pool, service) = setup_service().await;
        let created = service
            .create(CreatePostInput::article("Doomed", "Body"), None)
            .await
            .unwrap();
        service.delete(created.post.id).await.unwrap();
        assert!(matches!(
            service.get_by_id(created.post.id).await,
            Err(PostServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(created.post.id).await,
            Err(PostServiceError::NotFound(_))
        ));
    }
}
