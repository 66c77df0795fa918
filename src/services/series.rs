//! Series service
//!
//! Ordered collections of posts. Membership and position live on the post;
//! this service manages the series records, their reading order and the
//! previous/next navigation shown on each post.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{PostRepository, SeriesRepository};
use crate::models::{
    CreateSeriesInput, Post, Series, SeriesLink, SeriesNavigation, SeriesWithCount,
    SeriesWithPosts, UpdateSeriesInput,
};
use crate::services::post::invalidate_content_cache;
use crate::services::text::{generate_slug, unique_slug};

const SERIES_LIST_CACHE_KEY: &str = "series:list";
const SERIES_CACHE_TTL_SECS: u64 = 600;
const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum SeriesServiceError {
    #[error("Series not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Series slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Where `post_id` sits among `posts` (already in reading order).
///
/// Returns `None` when the post is not part of the list.
pub fn navigation_for(series: &Series, posts: &[Post], post_id: i64) -> Option<SeriesNavigation> {
    let index = posts.iter().position(|p| p.id == post_id)?;
    let link = |p: &Post| SeriesLink {
        id: p.id,
        slug: p.slug.clone(),
        title: p.display_title().to_string(),
    };

    Some(SeriesNavigation {
        series_id: series.id,
        series_slug: series.slug.clone(),
        series_title: series.title.clone(),
        position: index + 1,
        total: posts.len(),
        previous: index.checked_sub(1).map(|i| link(&posts[i])),
        next: posts.get(index + 1).map(link),
    })
}

pub struct SeriesService {
    repo: Arc<dyn SeriesRepository>,
    post_repo: Arc<dyn PostRepository>,
    cache: Arc<Cache>,
}

impl SeriesService {
    pub fn new(
        repo: Arc<dyn SeriesRepository>,
        post_repo: Arc<dyn PostRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            repo,
            post_repo,
            cache,
        }
    }

    /// All series with their published post counts
    pub async fn list(&self) -> Result<Vec<SeriesWithCount>, SeriesServiceError> {
        if let Ok(Some(cached)) = self
            .cache
            .get::<Vec<SeriesWithCount>>(SERIES_LIST_CACHE_KEY)
            .await
        {
            return Ok(cached);
        }

        let series = self.repo.list_with_counts().await?;
        let _ = self
            .cache
            .set(
                SERIES_LIST_CACHE_KEY,
                &series,
                Duration::from_secs(SERIES_CACHE_TTL_SECS),
            )
            .await;
        Ok(series)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Series, SeriesServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| SeriesServiceError::NotFound(id.to_string()))
    }

    /// Look a series up by numeric ID or by slug
    pub async fn resolve(&self, id_or_slug: &str) -> Result<Series, SeriesServiceError> {
        let found = match id_or_slug.parse::<i64>() {
            Ok(id) => self.repo.get_by_id(id).await?,
            Err(_) => None,
        };
        let found = match found {
            Some(series) => Some(series),
            None => self.repo.get_by_slug(id_or_slug).await?,
        };
        found.ok_or_else(|| SeriesServiceError::NotFound(id_or_slug.to_string()))
    }

    /// Series with its posts in reading order. Public callers only see
    /// published posts.
    pub async fn get_with_posts(
        &self,
        id_or_slug: &str,
        published_only: bool,
    ) -> Result<SeriesWithPosts, SeriesServiceError> {
        let series = self.resolve(id_or_slug).await?;
        let posts = self.post_repo.list_by_series(series.id, published_only).await?;
        Ok(SeriesWithPosts { series, posts })
    }

    /// Previous/next navigation for a published post
    pub async fn navigation(&self, post: &Post) -> Result<Option<SeriesNavigation>, SeriesServiceError> {
        let Some(series_id) = post.series_id else {
            return Ok(None);
        };
        let Some(series) = self.repo.get_by_id(series_id).await? else {
            return Ok(None);
        };
        let posts = self.post_repo.list_by_series(series_id, true).await?;
        Ok(navigation_for(&series, &posts, post.id))
    }

    pub async fn create(&self, input: CreateSeriesInput) -> Result<Series, SeriesServiceError> {
        let title = validate_title(&input.title)?;
        let slug = self.pick_slug(input.slug.as_deref(), &title, None).await?;

        let now = Utc::now();
        let series = self
            .repo
            .create(&Series {
                id: 0,
                slug,
                title,
                description: input.description,
                cover_image: input.cover_image,
                created_at: now,
                updated_at: now,
            })
            .await?;

        invalidate_content_cache(&self.cache).await;
        Ok(series)
    }

    pub async fn update(&self, id: i64, input: UpdateSeriesInput) -> Result<Series, SeriesServiceError> {
        let mut series = self.get_by_id(id).await?;
        if !input.has_changes() {
            return Ok(series);
        }

        if let Some(title) = input.title {
            series.title = validate_title(&title)?;
        }
        if let Some(slug) = input.slug {
            series.slug = self.pick_slug(Some(&slug), &series.title, Some(id)).await?;
        }
        if let Some(description) = input.description {
            series.description = description;
        }
        if let Some(cover_image) = input.cover_image {
            series.cover_image = cover_image;
        }
        series.updated_at = Utc::now();

        let series = self.repo.update(&series).await?;
        invalidate_content_cache(&self.cache).await;
        Ok(series)
    }

    /// Delete a series; its posts stay and simply leave the series
    pub async fn delete(&self, id: i64) -> Result<(), SeriesServiceError> {
        self.get_by_id(id).await?;
        self.repo.delete(id).await?;
        invalidate_content_cache(&self.cache).await;
        Ok(())
    }

    /// Set the reading order. `post_ids` must all belong to the series;
    /// members left out keep their relative order after the listed ones.
    pub async fn reorder(
        &self,
        series_id: i64,
        post_ids: &[i64],
    ) -> Result<Vec<Post>, SeriesServiceError> {
        self.get_by_id(series_id).await?;
        let members = self.post_repo.list_by_series(series_id, false).await?;

        let mut seen = std::collections::HashSet::new();
        for id in post_ids {
            if !members.iter().any(|p| p.id == *id) {
                return Err(SeriesServiceError::ValidationError(format!(
                    "Post {} is not part of this series",
                    id
                )));
            }
            if !seen.insert(*id) {
                return Err(SeriesServiceError::ValidationError(format!(
                    "Post {} is listed twice",
                    id
                )));
            }
        }

        let ordered: Vec<i64> = post_ids
            .iter()
            .copied()
            .chain(members.iter().map(|p| p.id).filter(|id| !seen.contains(id)))
            .collect();
        self.post_repo.reorder_series(series_id, &ordered).await?;

        invalidate_content_cache(&self.cache).await;
        Ok(self.post_repo.list_by_series(series_id, false).await?)
    }

    async fn pick_slug(
        &self,
        requested: Option<&str>,
        title: &str,
        exclude_id: Option<i64>,
    ) -> Result<String, SeriesServiceError> {
        if let Some(requested) = requested.map(generate_slug).filter(|s| !s.is_empty()) {
            if self.repo.slug_exists(&requested, exclude_id).await? {
                return Err(SeriesServiceError::DuplicateSlug(requested));
            }
            return Ok(requested);
        }

        let repo = self.repo.clone();
        Ok(unique_slug(&generate_slug(title), "series", |candidate| {
            let repo = repo.clone();
            async move { repo.slug_exists(&candidate, exclude_id).await }
        })
        .await?)
    }
}

fn validate_title(title: &str) -> Result<String, SeriesServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(SeriesServiceError::ValidationError(
            "Series title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(SeriesServiceError::ValidationError(format!(
            "Series title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::test_support::{insert_post, setup_pool};
    use crate::db::repositories::{SqlxPostRepository, SqlxSeriesRepository};
    use crate::db::DynDatabasePool;
    use crate::models::PostStatus;

    async fn setup_service() -> (DynDatabasePool, SeriesService) {
        let pool = setup_pool().await;
        let service = SeriesService::new(
            SqlxSeriesRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            create_cache(&CacheConfig::default()).unwrap(),
        );
        (pool, service)
    }

    async fn attach(pool: &DynDatabasePool, post_id: i64, series_id: i64, order: i32) {
        sqlx::query("UPDATE posts SET series_id = ?, series_order = ? WHERE id = ?")
            .bind(series_id)
            .bind(order)
            .bind(post_id)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();
    }

    fn series_input(title: &str) -> CreateSeriesInput {
        CreateSeriesInput {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_generates_unique_slugs() {
        let (_pool, service) = setup_service().await;
        let first = service.create(series_input("Rust in Practice")).await.unwrap();
        let second = service.create(series_input("Rust in Practice")).await.unwrap();
        assert_eq!(first.slug, "rust-in-practice");
        assert_eq!(second.slug, "rust-in-practice-2");

        let explicit = CreateSeriesInput {
            slug: Some("rust-in-practice".to_string()),
            ..series_input("Other")
        };
        assert!(matches!(
            service.create(explicit).await,
            Err(SeriesServiceError::DuplicateSlug(_))
        ));
        assert!(matches!(
            service.create(series_input("   ")).await,
            Err(SeriesServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_by_id_or_slug() {
        let (_pool, service) = setup_service().await;
        let series = service.create(series_input("Trip Notes")).await.unwrap();
        assert_eq!(service.resolve(&series.id.to_string()).await.unwrap().id, series.id);
        assert_eq!(service.resolve("trip-notes").await.unwrap().id, series.id);
        assert!(matches!(
            service.resolve("missing").await,
            Err(SeriesServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reorder_and_navigation() {
        let (pool, service) = setup_service().await;
        let series = service.create(series_input("Parts")).await.unwrap();
        let a = insert_post(&pool, "part-a", PostStatus::Published).await;
        let b = insert_post(&pool, "part-b", PostStatus::Published).await;
        let c = insert_post(&pool, "part-c", PostStatus::Published).await;
        let hidden = insert_post(&pool, "part-draft", PostStatus::Draft).await;
        for (i, id) in [a, b, c, hidden].into_iter().enumerate() {
            attach(&pool, id, series.id, i as i32 + 1).await;
        }

        let ordered = service.reorder(series.id, &[c, a]).await.unwrap();
        let ids: Vec<i64> = ordered.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![c, a, b, hidden]);

        let public = service.get_with_posts("parts", true).await.unwrap();
        assert_eq!(public.posts.len(), 3);

        let post_a = public.posts.iter().find(|p| p.id == a).unwrap();
        let nav = service.navigation(post_a).await.unwrap().unwrap();
        assert_eq!(nav.position, 2);
        assert_eq!(nav.total, 3);
        assert_eq!(nav.previous.unwrap().id, c);
        assert_eq!(nav.next.unwrap().id, b);

        assert!(service.reorder(series.id, &[a, a]).await.is_err());
        let outsider = insert_post(&pool, "outsider", PostStatus::Published).await;
        assert!(matches!(
            service.reorder(series.id, &[outsider]).await,
            Err(SeriesServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_detaches_posts() {
        let (pool, service) = setup_service().await;
        let series = service.create(series_input("Short lived")).await.unwrap();
        let post = insert_post(&pool, "member", PostStatus::Published).await;
        attach(&pool, post, series.id, 1).await;

        service.delete(series.id).await.unwrap();
        let series_id: Option<i64> = sqlx::query_scalar("SELECT series_id FROM posts WHERE id = ?")
            .bind(post)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(series_id, None);
        assert!(service.list().await.unwrap().is_empty());
    }
}
