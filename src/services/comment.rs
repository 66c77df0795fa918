//! Comment service
//!
//! Threaded visitor comments with moderation and reactions. Comments nest
//! under a parent on the same post; a reply aimed below the deepest allowed
//! level is attached one level up instead, so threads never exceed
//! `MAX_COMMENT_DEPTH`.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{
    gravatar_url, Comment, CommentStatus, CommentTree, CreateCommentInput, ListParams,
    PagedResult, ReactionKind, ReactionSummary,
};
use crate::services::settings::SettingsService;

/// Deepest reply level; top-level comments are depth 0
pub const MAX_COMMENT_DEPTH: usize = 5;
pub const MAX_NAME_CHARS: usize = 50;
pub const MAX_CONTENT_CHARS: usize = 2000;
const MAX_EMAIL_CHARS: usize = 254;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<crate::services::settings::SettingsServiceError> for CommentServiceError {
    fn from(e: crate::services::settings::SettingsServiceError) -> Self {
        CommentServiceError::InternalError(anyhow::anyhow!(e))
    }
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    post_repo: Arc<dyn PostRepository>,
    settings: Arc<SettingsService>,
}

impl CommentService {
    pub fn new(
        repo: Arc<dyn CommentRepository>,
        post_repo: Arc<dyn PostRepository>,
        settings: Arc<SettingsService>,
    ) -> Self {
        Self {
            repo,
            post_repo,
            settings,
        }
    }

    /// Create a comment on a published post.
    ///
    /// The comment is approved immediately when moderation is off.
    pub async fn create(
        &self,
        input: CreateCommentInput,
        visitor_hash: &str,
    ) -> Result<Comment, CommentServiceError> {
        let author_name = input.author_name.trim().to_string();
        let content = input.content.trim().to_string();
        let author_email = input
            .author_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        validate_comment(&author_name, &content, author_email.as_deref())?;

        match self.post_repo.get_by_id(input.post_id).await? {
            Some(post) if post.is_published() => {}
            _ => {
                return Err(CommentServiceError::NotFound(format!(
                    "post {}",
                    input.post_id
                )))
            }
        }

        let parent_id = match input.parent_id {
            Some(parent_id) => Some(self.resolve_parent(input.post_id, parent_id).await?),
            None => None,
        };

        let status = if self.settings.get_site_settings().await?.comment_moderation {
            CommentStatus::Pending
        } else {
            CommentStatus::Approved
        };

        let now = Utc::now();
        let comment = self
            .repo
            .create(&Comment {
                id: 0,
                post_id: input.post_id,
                parent_id,
                author_name,
                author_email,
                content,
                status,
                visitor_hash: visitor_hash.to_string(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::debug!(comment_id = comment.id, post_id = comment.post_id, status = %comment.status, "Comment created");
        Ok(comment)
    }

    /// Pick the parent a reply attaches to, flattening replies that would
    /// exceed the depth cap.
    async fn resolve_parent(&self, post_id: i64, parent_id: i64) -> Result<i64, CommentServiceError> {
        let parent = self
            .repo
            .get_by_id(parent_id)
            .await?
            .filter(|c| c.post_id == post_id)
            .ok_or_else(|| {
                CommentServiceError::ValidationError(format!(
                    "Parent comment {} does not belong to this post",
                    parent_id
                ))
            })?;

        // Ancestor chain from the target parent up to the root
        let mut chain = vec![parent.id];
        let mut next = parent.parent_id;
        while let Some(id) = next {
            if chain.len() > MAX_COMMENT_DEPTH + 1 {
                break;
            }
            chain.push(id);
            next = self.repo.get_by_id(id).await?.and_then(|c| c.parent_id);
        }

        // chain[i] sits at depth (chain.len() - 1 - i); the new reply must
        // hang off something at depth MAX_COMMENT_DEPTH - 1 or shallower.
        let parent_depth = chain.len() - 1;
        if parent_depth < MAX_COMMENT_DEPTH {
            return Ok(parent.id);
        }
        let skip = parent_depth - (MAX_COMMENT_DEPTH - 1);
        Ok(chain[skip])
    }

    /// Approved comments of a post as a thread, oldest first
    pub async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentTree>, CommentServiceError> {
        let comments = self
            .repo
            .list_by_post(post_id, Some(CommentStatus::Approved))
            .await?;
        let ids: Vec<i64> = comments.iter().map(|c| c.id).collect();
        let mut reactions = self.repo.reaction_counts(&ids).await?;

        let mut children: HashMap<Option<i64>, Vec<Comment>> = HashMap::new();
        for comment in comments {
            children.entry(comment.parent_id).or_default().push(comment);
        }

        Ok(build_tree(None, 0, &mut children, &mut reactions))
    }

    /// Add the reaction if the visitor has not given it yet, else remove it
    pub async fn toggle_reaction(
        &self,
        comment_id: i64,
        kind: ReactionKind,
        visitor_hash: &str,
    ) -> Result<ReactionSummary, CommentServiceError> {
        self.get_approved(comment_id).await?;

        if !self.repo.remove_reaction(comment_id, kind, visitor_hash).await? {
            self.repo.add_reaction(comment_id, kind, visitor_hash).await?;
        }

        self.summary(comment_id, visitor_hash).await
    }

    pub async fn reactions(
        &self,
        comment_id: i64,
        visitor_hash: &str,
    ) -> Result<ReactionSummary, CommentServiceError> {
        self.get_approved(comment_id).await?;
        self.summary(comment_id, visitor_hash).await
    }

    async fn summary(
        &self,
        comment_id: i64,
        visitor_hash: &str,
    ) -> Result<ReactionSummary, CommentServiceError> {
        let counts = self
            .repo
            .reaction_counts(&[comment_id])
            .await?
            .remove(&comment_id)
            .unwrap_or_default();
        let mine = self.repo.visitor_reactions(comment_id, visitor_hash).await?;
        Ok(ReactionSummary {
            comment_id,
            counts,
            mine,
        })
    }

    async fn get_approved(&self, comment_id: i64) -> Result<Comment, CommentServiceError> {
        self.repo
            .get_by_id(comment_id)
            .await?
            .filter(|c| c.status == CommentStatus::Approved)
            .ok_or_else(|| CommentServiceError::NotFound(format!("comment {}", comment_id)))
    }

    /// Moderation queue, newest first
    pub async fn list_by_status(
        &self,
        params: &ListParams,
        status: Option<CommentStatus>,
    ) -> Result<PagedResult<Comment>, CommentServiceError> {
        let (items, total) = self.repo.list_by_status(params, status).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn set_status(
        &self,
        id: i64,
        status: CommentStatus,
    ) -> Result<Comment, CommentServiceError> {
        if !self.repo.update_status(id, status).await? {
            return Err(CommentServiceError::NotFound(format!("comment {}", id)));
        }
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CommentServiceError::NotFound(format!("comment {}", id)))
    }

    /// Delete a comment with its replies and reactions
    pub async fn delete(&self, id: i64) -> Result<(), CommentServiceError> {
        if !self.repo.delete(id).await? {
            return Err(CommentServiceError::NotFound(format!("comment {}", id)));
        }
        Ok(())
    }

    pub async fn pending_count(&self) -> Result<i64, CommentServiceError> {
        Ok(self.repo.count_by_status(CommentStatus::Pending).await?)
    }
}

fn validate_comment(
    author_name: &str,
    content: &str,
    author_email: Option<&str>,
) -> Result<(), CommentServiceError> {
    let name_len = author_name.chars().count();
    if name_len == 0 || name_len > MAX_NAME_CHARS {
        return Err(CommentServiceError::ValidationError(format!(
            "Name must be 1 to {} characters",
            MAX_NAME_CHARS
        )));
    }

    let content_len = content.chars().count();
    if content_len == 0 || content_len > MAX_CONTENT_CHARS {
        return Err(CommentServiceError::ValidationError(format!(
            "Comment must be 1 to {} characters",
            MAX_CONTENT_CHARS
        )));
    }

    if let Some(email) = author_email {
        if !is_plausible_email(email) {
            return Err(CommentServiceError::ValidationError(
                "Invalid email address".to_string(),
            ));
        }
    }

    Ok(())
}

/// `local@domain.tld` with no whitespace
fn is_plausible_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_CHARS || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Comments whose parent is not in `children` (unapproved) are left out
/// together with their replies.
fn build_tree(
    parent: Option<i64>,
    depth: usize,
    children: &mut HashMap<Option<i64>, Vec<Comment>>,
    reactions: &mut HashMap<i64, std::collections::BTreeMap<ReactionKind, i64>>,
) -> Vec<CommentTree> {
    let Some(level) = children.remove(&parent) else {
        return Vec::new();
    };

    level
        .into_iter()
        .map(|comment| CommentTree {
            id: comment.id,
            post_id: comment.post_id,
            parent_id: comment.parent_id,
            avatar_url: gravatar_url(comment.author_email.as_deref()),
            author_name: comment.author_name,
            content: comment.content,
            created_at: comment.created_at,
            depth,
            reactions: reactions.remove(&comment.id).unwrap_or_default(),
            replies: build_tree(Some(comment.id), depth + 1, children, reactions),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::{CacheConfig, SiteConfig};
    use crate::db::repositories::test_support::{insert_post, setup_pool};
    use crate::db::repositories::{SqlxCommentRepository, SqlxPostRepository, SqlxSettingsRepository};
    use crate::db::DynDatabasePool;
    use crate::models::PostStatus;
    use crate::services::settings::UpdateSettingsInput;

    async fn setup_service(moderation: bool) -> (DynDatabasePool, CommentService) {
        let pool = setup_pool().await;
        let cache = create_cache(&CacheConfig::default()).unwrap();
        let settings = Arc::new(SettingsService::new(
            SqlxSettingsRepository::boxed(pool.clone()),
            cache,
            &SiteConfig::default(),
        ));
        settings
            .update_site_settings(UpdateSettingsInput {
                comment_moderation: Some(moderation),
                ..Default::default()
            })
            .await
            .unwrap();

        let service = CommentService::new(
            SqlxCommentRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            settings,
        );
        (pool, service)
    }

    fn input(post_id: i64, parent_id: Option<i64>, content: &str) -> CreateCommentInput {
        CreateCommentInput {
            post_id,
            parent_id,
            author_name: "Reader".to_string(),
            author_email: Some("reader@example.com".to_string()),
            content: content.to_string(),
        }
    }

    async fn post_comment_count(pool: &DynDatabasePool, post_id: i64) -> i64 {
        sqlx::query_scalar("SELECT comment_count FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_validation() {
        assert!(validate_comment("Ann", "Nice post", None).is_ok());
        assert!(validate_comment("", "Nice post", None).is_err());
        assert!(validate_comment(&"n".repeat(51), "Nice post", None).is_err());
        assert!(validate_comment("Ann", "", None).is_err());
        assert!(validate_comment("Ann", &"x".repeat(2001), None).is_err());
        assert!(validate_comment("Ann", &"字".repeat(2000), None).is_ok());
        assert!(validate_comment("Ann", "Hi", Some("ann@example.org")).is_ok());
        assert!(validate_comment("Ann", "Hi", Some("not-an-email")).is_err());
        assert!(validate_comment("Ann", "Hi", Some("a b@example.org")).is_err());
        assert!(validate_comment("Ann", "Hi", Some("ann@localhost")).is_err());
    }

    #[tokio::test]
    async fn test_moderation_controls_initial_status() {
        let (pool, moderated) = setup_service(true).await;
        let post_id = insert_post(&pool, "p", PostStatus::Published).await;
        let comment = moderated.create(input(post_id, None, "First!"), "v1").await.unwrap();
        assert_eq!(comment.status, CommentStatus::Pending);
        assert!(moderated.list_for_post(post_id).await.unwrap().is_empty());
        assert_eq!(moderated.pending_count().await.unwrap(), 1);
        assert_eq!(post_comment_count(&pool, post_id).await, 0);

        let approved = moderated.set_status(comment.id, CommentStatus::Approved).await.unwrap();
        assert_eq!(approved.status, CommentStatus::Approved);
        assert_eq!(post_comment_count(&pool, post_id).await, 1);

        let (pool, open) = setup_service(false).await;
        let post_id = insert_post(&pool, "p", PostStatus::Published).await;
        let comment = open.create(input(post_id, None, "Hello"), "v1").await.unwrap();
        assert_eq!(comment.status, CommentStatus::Approved);
        assert_eq!(post_comment_count(&pool, post_id).await, 1);
    }

    #[tokio::test]
    async fn test_comments_require_published_post() {
        let (pool, service) = setup_service(false).await;
        let draft = insert_post(&pool, "draft", PostStatus::Draft).await;
        assert!(matches!(
            service.create(input(draft, None, "Hi"), "v1").await,
            Err(CommentServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_parent_must_be_on_same_post() {
        let (pool, service) = setup_service(false).await;
        let a = insert_post(&pool, "a", PostStatus::Published).await;
        let b = insert_post(&pool, "b", PostStatus::Published).await;
        let on_a = service.create(input(a, None, "On A"), "v1").await.unwrap();

        assert!(matches!(
            service.create(input(b, Some(on_a.id), "Cross"), "v1").await,
            Err(CommentServiceError::ValidationError(_))
        ));
        assert!(service.create(input(a, Some(9999), "Ghost"), "v1").await.is_err());
    }

    #[tokio::test]
    async fn test_thread_shape_and_depth_cap() {
        let (pool, service) = setup_service(false).await;
        let post_id = insert_post(&pool, "thread", PostStatus::Published).await;

        let root = service.create(input(post_id, None, "root"), "v1").await.unwrap();
        let mut parent = root.id;
        let mut chain = vec![root.id];
        for i in 1..=MAX_COMMENT_DEPTH {
            let reply = service
                .create(input(post_id, Some(parent), &format!("depth {}", i)), "v1")
                .await
                .unwrap();
            assert_eq!(reply.parent_id, Some(parent));
            chain.push(reply.id);
            parent = reply.id;
        }

        // Replying to the deepest comment attaches to its parent instead
        let flattened = service
            .create(input(post_id, Some(parent), "too deep"), "v1")
            .await
            .unwrap();
        assert_eq!(flattened.parent_id, Some(chain[MAX_COMMENT_DEPTH - 1]));

        let second_root = service.create(input(post_id, None, "another"), "v2").await.unwrap();

        let tree = service.list_for_post(post_id).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].id, root.id);
        assert_eq!(tree[1].id, second_root.id);
        assert_eq!(tree[0].size(), MAX_COMMENT_DEPTH + 2);
        assert!(tree[0].avatar_url.contains("gravatar.com/avatar/"));

        let mut node = &tree[0];
        let mut max_depth = 0;
        while let Some(child) = node.replies.first() {
            max_depth = child.depth;
            node = child;
        }
        assert_eq!(max_depth, MAX_COMMENT_DEPTH);
    }

    #[tokio::test]
    async fn test_toggle_reaction() {
        let (pool, service) = setup_service(false).await;
        let post_id = insert_post(&pool, "react", PostStatus::Published).await;
        let comment = service.create(input(post_id, None, "React to me"), "v1").await.unwrap();

        let summary = service.toggle_reaction(comment.id, ReactionKind::Like, "v1").await.unwrap();
        assert_eq!(summary.count(ReactionKind::Like), 1);
        assert_eq!(summary.mine, vec![ReactionKind::Like]);

        let summary = service.toggle_reaction(comment.id, ReactionKind::Like, "v2").await.unwrap();
        assert_eq!(summary.count(ReactionKind::Like), 2);

        let summary = service.toggle_reaction(comment.id, ReactionKind::Like, "v1").await.unwrap();
        assert_eq!(summary.count(ReactionKind::Like), 1);
        assert!(summary.mine.is_empty());

        let seen_by_v2 = service.reactions(comment.id, "v2").await.unwrap();
        assert_eq!(seen_by_v2.mine, vec![ReactionKind::Like]);

        let tree = service.list_for_post(post_id).await.unwrap();
        assert_eq!(tree[0].reactions.get(&ReactionKind::Like), Some(&1));

        assert!(matches!(
            service.toggle_reaction(9999, ReactionKind::Love, "v1").await,
            Err(CommentServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_and_recounts() {
        let (pool, service) = setup_service(false).await;
        let post_id = insert_post(&pool, "cascade", PostStatus::Published).await;
        let root = service.create(input(post_id, None, "root"), "v1").await.unwrap();
        service.create(input(post_id, Some(root.id), "reply"), "v2").await.unwrap();
        assert_eq!(post_comment_count(&pool, post_id).await, 2);

        service.delete(root.id).await.unwrap();
        assert!(service.list_for_post(post_id).await.unwrap().is_empty());
        assert_eq!(post_comment_count(&pool, post_id).await, 0);

        assert!(matches!(
            service.delete(root.id).await,
            Err(CommentServiceError::NotFound(_))
        ));
    }
}
