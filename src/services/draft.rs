//! Draft service
//!
//! Editor autosaves. A draft is either free-standing (a post not written
//! yet) or tied to an existing post; promoting it turns it into a new draft
//! post or writes it back into the linked post.

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::db::repositories::{DraftRepository, PostRepository};
use crate::models::{CreatePostInput, Draft, PostWithTags, SaveDraftInput, UpdatePostInput};
use crate::services::post::{PostService, PostServiceError};

/// Drafts untouched for this long are purged by the housekeeping task
pub const DRAFT_RETENTION_DAYS: i64 = 180;

#[derive(Debug, thiserror::Error)]
pub enum DraftServiceError {
    #[error("Draft not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Post(#[from] PostServiceError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct DraftService {
    repo: Arc<dyn DraftRepository>,
    post_repo: Arc<dyn PostRepository>,
    posts: Arc<PostService>,
}

impl DraftService {
    pub fn new(
        repo: Arc<dyn DraftRepository>,
        post_repo: Arc<dyn PostRepository>,
        posts: Arc<PostService>,
    ) -> Self {
        Self {
            repo,
            post_repo,
            posts,
        }
    }

    /// Create a draft, or overwrite the one named by `input.id`
    pub async fn save(&self, input: SaveDraftInput) -> Result<Draft, DraftServiceError> {
        if let Some(post_id) = input.post_id {
            if self.post_repo.get_by_id(post_id).await?.is_none() {
                return Err(DraftServiceError::ValidationError(format!(
                    "Post {} does not exist",
                    post_id
                )));
            }
        }

        let now = Utc::now();
        match input.id {
            Some(id) => {
                let mut draft = self.get(id).await?;
                draft.post_id = input.post_id.or(draft.post_id);
                draft.kind = input.kind;
                draft.title = input.title;
                draft.content = input.content;
                draft.updated_at = now;
                if !self.repo.update(&draft).await? {
                    return Err(DraftServiceError::NotFound(id.to_string()));
                }
                Ok(draft)
            }
            None => Ok(self
                .repo
                .create(&Draft {
                    id: 0,
                    post_id: input.post_id,
                    kind: input.kind,
                    title: input.title,
                    content: input.content,
                    created_at: now,
                    updated_at: now,
                })
                .await?),
        }
    }

    /// All drafts, most recently saved first
    pub async fn list(&self) -> Result<Vec<Draft>, DraftServiceError> {
        Ok(self.repo.list().await?)
    }

    pub async fn get(&self, id: i64) -> Result<Draft, DraftServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| DraftServiceError::NotFound(id.to_string()))
    }

    pub async fn delete(&self, id: i64) -> Result<(), DraftServiceError> {
        if !self.repo.delete(id).await? {
            return Err(DraftServiceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Turn a draft into post content and discard the draft.
    ///
    /// Linked drafts overwrite their post's title and content (status is
    /// left alone); free-standing drafts become a new unpublished post.
    pub async fn promote(
        &self,
        id: i64,
        author_id: Option<i64>,
    ) -> Result<PostWithTags, DraftServiceError> {
        let draft = self.get(id).await?;

        let post = match draft.post_id {
            Some(post_id) => {
                let update = UpdatePostInput {
                    title: Some(draft.title.clone()),
                    content: Some(draft.content.clone()),
                    ..Default::default()
                };
                self.posts.update(post_id, update).await?
            }
            None => {
                let input = CreatePostInput {
                    kind: draft.kind,
                    title: draft.title.clone(),
                    content: draft.content.clone(),
                    ..Default::default()
                };
                self.posts.create(input, author_id).await?
            }
        };

        self.repo.delete(id).await?;
        tracing::info!(draft_id = id, post_id = post.post.id, "Draft promoted");
        Ok(post)
    }

    /// Remove drafts not saved for `DRAFT_RETENTION_DAYS`
    pub async fn purge_stale(&self) -> Result<u64, DraftServiceError> {
        let cutoff = Utc::now() - Duration::days(DRAFT_RETENTION_DAYS);
        Ok(self.repo.delete_older_than(cutoff).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{
        SqlxDraftRepository, SqlxPostRepository, SqlxSeriesRepository, SqlxTagRepository,
    };
    use crate::models::{PostKind, PostStatus};
    use crate::services::markdown::MarkdownRenderer;

    async fn setup_service() -> DraftService {
        let pool = setup_pool().await;
        let posts = Arc::new(PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool.clone()),
            SqlxSeriesRepository::boxed(pool.clone()),
            create_cache(&CacheConfig::default()).unwrap(),
            MarkdownRenderer::new(),
        ));
        DraftService::new(
            SqlxDraftRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool),
            posts,
        )
    }

    fn autosave(title: &str, content: &str) -> SaveDraftInput {
        SaveDraftInput {
            title: title.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_creates_then_overwrites() {
        let service = setup_service().await;
        let draft = service.save(autosave("Idea", "First pass")).await.unwrap();

        let saved = service
            .save(SaveDraftInput {
                id: Some(draft.id),
                ..autosave("Idea", "Second pass")
            })
            .await
            .unwrap();
        assert_eq!(saved.id, draft.id);
        assert_eq!(service.get(draft.id).await.unwrap().content, "Second pass");
        assert_eq!(service.list().await.unwrap().len(), 1);

        assert!(matches!(
            service
                .save(SaveDraftInput {
                    id: Some(999),
                    ..autosave("x", "y")
                })
                .await,
            Err(DraftServiceError::NotFound(_))
        ));
        assert!(matches!(
            service
                .save(SaveDraftInput {
                    post_id: Some(999),
                    ..autosave("x", "y")
                })
                .await,
            Err(DraftServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_promote_free_standing_draft() {
        let service = setup_service().await;
        let draft = service
            .save(SaveDraftInput {
                kind: PostKind::Short,
                ..autosave("", "Quick thought")
            })
            .await
            .unwrap();

        let post = service.promote(draft.id, None).await.unwrap();
        assert_eq!(post.post.kind, PostKind::Short);
        assert_eq!(post.post.status, PostStatus::Draft);
        assert_eq!(post.post.content, "Quick thought");
        assert!(matches!(
            service.get(draft.id).await,
            Err(DraftServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_promote_linked_draft_updates_post() {
        let service = setup_service().await;
        let original = service
            .posts
            .create(
                CreatePostInput::article("Live", "Old body").with_status(PostStatus::Published),
                None,
            )
            .await
            .unwrap();

        let draft = service
            .save(SaveDraftInput {
                post_id: Some(original.post.id),
                ..autosave("Live", "New body")
            })
            .await
            .unwrap();
        let promoted = service.promote(draft.id, None).await.unwrap();

        assert_eq!(promoted.post.id, original.post.id);
        assert_eq!(promoted.post.content, "New body");
        assert_eq!(promoted.post.status, PostStatus::Published);
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_promote_rejects_empty_content() {
        let service = setup_service().await;
        let draft = service.save(autosave("Title only", "")).await.unwrap();
        assert!(matches!(
            service.promote(draft.id, None).await,
            Err(DraftServiceError::Post(PostServiceError::ValidationError(_)))
        ));
        // The draft survives a failed promotion
        assert!(service.get(draft.id).await.is_ok());
        assert_eq!(service.purge_stale().await.unwrap(), 0);
    }
}
