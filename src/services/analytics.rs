//! Analytics service
//!
//! Counts post views (deduplicated per visitor), tracks reading sessions via
//! heartbeats and assembles the dashboard report. Visitors are identified by
//! a keyed hash of IP and user agent; raw addresses are never stored.

use chrono::{Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AnalyticsConfig;
use crate::db::repositories::{AnalyticsRepository, PostRepository};
use crate::models::{
    AnalyticsOverview, PostStats, PostView, ReadingSession, SessionHeartbeat, SiteCounter,
};

type HmacSha256 = Hmac<Sha256>;

/// Longest report window accepted by `overview`
pub const MAX_OVERVIEW_DAYS: u32 = 365;

const TOP_POSTS_LIMIT: i64 = 10;
const TOP_REFERRERS_LIMIT: i64 = 10;
const MAX_REFERRER_CHARS: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Hex HMAC-SHA256 of `ip|user_agent` under the site secret
pub fn visitor_hash(secret: &str, ip: &str, user_agent: &str) -> String {
    let input = format!("{}|{}", ip, user_agent);
    let digest = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(input.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Sha256::digest(input.as_bytes()).to_vec(),
    };
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Reduce a referrer URL to its host (`https://a.b/c?d` -> `a.b`)
pub fn normalize_referrer(referrer: &str) -> Option<String> {
    let trimmed = referrer.trim();
    if trimmed.is_empty() {
        return None;
    }
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .rsplit('@')
        .next()
        .unwrap_or("")
        .to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return None;
    }
    Some(host.chars().take(MAX_REFERRER_CHARS).collect())
}

pub struct AnalyticsService {
    repo: Arc<dyn AnalyticsRepository>,
    post_repo: Arc<dyn PostRepository>,
    secret: String,
    dedup_window: Duration,
}

impl AnalyticsService {
    pub fn new(
        repo: Arc<dyn AnalyticsRepository>,
        post_repo: Arc<dyn PostRepository>,
        config: &AnalyticsConfig,
    ) -> Self {
        Self {
            repo,
            post_repo,
            secret: config.visitor_secret.clone(),
            dedup_window: Duration::minutes(config.view_dedup_minutes.max(0)),
        }
    }

    pub fn visitor_hash(&self, ip: &str, user_agent: &str) -> String {
        visitor_hash(&self.secret, ip, user_agent)
    }

    async fn ensure_published(&self, post_id: i64) -> Result<(), AnalyticsServiceError> {
        match self.post_repo.get_by_id(post_id).await? {
            Some(post) if post.is_published() => Ok(()),
            _ => Err(AnalyticsServiceError::NotFound(format!("post {}", post_id))),
        }
    }

    /// Count a view unless this visitor viewed the post within the dedup
    /// window. Returns whether the view was counted.
    pub async fn record_view(
        &self,
        post_id: i64,
        visitor_hash: &str,
        referrer: Option<&str>,
    ) -> Result<bool, AnalyticsServiceError> {
        self.ensure_published(post_id).await?;

        let now = Utc::now();
        let recorded = self
            .repo
            .record_view(
                &PostView {
                    id: 0,
                    post_id,
                    visitor_hash: visitor_hash.to_string(),
                    referrer: referrer.and_then(normalize_referrer),
                    viewed_at: now,
                },
                now - self.dedup_window,
            )
            .await?;
        Ok(recorded.is_some())
    }

    pub async fn start_session(
        &self,
        post_id: i64,
        visitor_hash: &str,
    ) -> Result<ReadingSession, AnalyticsServiceError> {
        self.ensure_published(post_id).await?;

        let now = Utc::now();
        let session = ReadingSession {
            id: Uuid::new_v4().to_string(),
            post_id,
            visitor_hash: visitor_hash.to_string(),
            started_at: now,
            last_active_at: now,
            duration_seconds: 0,
            max_scroll_depth: 0,
            completed: false,
        };
        self.repo.create_session(&session).await?;
        Ok(session)
    }

    /// Fold a heartbeat into the session. Duration and scroll depth only
    /// grow, scroll depth is clamped to 0..=100 and completion is sticky.
    pub async fn heartbeat(
        &self,
        session_id: &str,
        visitor_hash: &str,
        beat: &SessionHeartbeat,
    ) -> Result<ReadingSession, AnalyticsServiceError> {
        if beat.duration_seconds < 0 {
            return Err(AnalyticsServiceError::ValidationError(
                "duration_seconds cannot be negative".to_string(),
            ));
        }

        let mut session = self
            .repo
            .get_session(session_id)
            .await?
            .filter(|s| s.visitor_hash == visitor_hash)
            .ok_or_else(|| AnalyticsServiceError::NotFound(format!("session {}", session_id)))?;

        session.duration_seconds = session.duration_seconds.max(beat.duration_seconds);
        session.max_scroll_depth = session.max_scroll_depth.max(beat.scroll_depth.clamp(0, 100));
        session.completed = session.completed || beat.completed;
        session.last_active_at = Utc::now();

        self.repo.update_session(&session).await?;
        Ok(session)
    }

    pub async fn post_stats(&self, post_id: i64) -> Result<PostStats, AnalyticsServiceError> {
        if self.post_repo.get_by_id(post_id).await?.is_none() {
            return Err(AnalyticsServiceError::NotFound(format!("post {}", post_id)));
        }
        Ok(self.repo.post_stats(post_id).await?)
    }

    /// Dashboard report covering the last `days` days (today included)
    pub async fn overview(&self, days: u32) -> Result<AnalyticsOverview, AnalyticsServiceError> {
        let days = days.clamp(1, MAX_OVERVIEW_DAYS);
        let now = Utc::now();
        let today = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| Utc.from_utc_datetime(&midnight))
            .unwrap_or(now);
        let since = today - Duration::days(i64::from(days) - 1);

        let (total_views, unique_visitors) = self.repo.view_totals(since).await?;
        let (views_today, _) = self.repo.view_totals(today).await?;

        Ok(AnalyticsOverview {
            days,
            total_views,
            unique_visitors,
            views_today,
            daily: self.repo.daily_views(since).await?,
            top_posts: self.repo.top_posts(since, TOP_POSTS_LIMIT).await?,
            top_referrers: self.repo.top_referrers(since, TOP_REFERRERS_LIMIT).await?,
            reading: self.repo.reading_summary(since).await?,
        })
    }

    pub async fn site_counter(&self) -> Result<SiteCounter, AnalyticsServiceError> {
        Ok(self.repo.site_counter().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_post, setup_pool};
    use crate::db::repositories::{SqlxAnalyticsRepository, SqlxPostRepository};
    use crate::db::DynDatabasePool;
    use crate::models::PostStatus;

    async fn setup_service() -> (DynDatabasePool, AnalyticsService) {
        let pool = setup_pool().await;
        let service = AnalyticsService::new(
            SqlxAnalyticsRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            &AnalyticsConfig::default(),
        );
        (pool, service)
    }

    #[test]
    fn test_visitor_hash_is_keyed_and_stable() {
        let a = visitor_hash("secret", "1.2.3.4", "Firefox");
        assert_eq!(a, visitor_hash("secret", "1.2.3.4", "Firefox"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, visitor_hash("other", "1.2.3.4", "Firefox"));
        assert_ne!(a, visitor_hash("secret", "1.2.3.5", "Firefox"));
        assert!(!a.contains("1.2.3.4"));
    }

    #[test]
    fn test_normalize_referrer() {
        assert_eq!(
            normalize_referrer("https://www.Example.com/path?q=1").as_deref(),
            Some("example.com")
        );
        assert_eq!(normalize_referrer("news.ycombinator.com/item").as_deref(), Some("news.ycombinator.com"));
        assert_eq!(normalize_referrer("   "), None);
        assert_eq!(normalize_referrer("https://"), None);
    }

    #[tokio::test]
    async fn test_views_are_deduplicated_per_visitor() {
        let (pool, service) = setup_service().await;
        let post_id = insert_post(&pool, "hello", PostStatus::Published).await;

        assert!(service.record_view(post_id, "v1", Some("https://t.co/x")).await.unwrap());
        assert!(!service.record_view(post_id, "v1", None).await.unwrap());
        assert!(service.record_view(post_id, "v2", None).await.unwrap());

        let stats = service.post_stats(post_id).await.unwrap();
        assert_eq!(stats.views, 2);
        assert_eq!(stats.unique_visitors, 2);

        let counter = service.site_counter().await.unwrap();
        assert_eq!(counter.total_views, 2);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_views_count_once() {
        let (pool, service) = setup_service().await;
        let post_id = insert_post(&pool, "busy", PostStatus::Published).await;

        let (a, b) = tokio::join!(
            service.record_view(post_id, "v1", None),
            service.record_view(post_id, "v1", None)
        );
        assert!(a.unwrap() ^ b.unwrap());

        let stats = service.post_stats(post_id).await.unwrap();
        assert_eq!(stats.views, 1);
    }

    #[tokio::test]
    async fn test_views_on_drafts_are_rejected() {
        let (pool, service) = setup_service().await;
        let draft = insert_post(&pool, "secret", PostStatus::Draft).await;
        assert!(matches!(
            service.record_view(draft, "v1", None).await,
            Err(AnalyticsServiceError::NotFound(_))
        ));
        assert!(service.record_view(9999, "v1", None).await.is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_only_grows() {
        let (pool, service) = setup_service().await;
        let post_id = insert_post(&pool, "long-read", PostStatus::Published).await;
        let session = service.start_session(post_id, "v1").await.unwrap();

        let beat = |duration_seconds, scroll_depth, completed| SessionHeartbeat {
            duration_seconds,
            scroll_depth,
            completed,
        };

        let s = service.heartbeat(&session.id, "v1", &beat(30, 40, false)).await.unwrap();
        assert_eq!((s.duration_seconds, s.max_scroll_depth), (30, 40));

        let s = service.heartbeat(&session.id, "v1", &beat(10, 250, true)).await.unwrap();
        assert_eq!(s.duration_seconds, 30);
        assert_eq!(s.max_scroll_depth, 100);
        assert!(s.completed);

        let s = service.heartbeat(&session.id, "v1", &beat(90, 20, false)).await.unwrap();
        assert_eq!(s.duration_seconds, 90);
        assert!(s.completed, "completion is sticky");

        // Another visitor cannot drive this session
        assert!(matches!(
            service.heartbeat(&session.id, "v2", &beat(100, 0, false)).await,
            Err(AnalyticsServiceError::NotFound(_))
        ));
        assert!(service.heartbeat(&session.id, "v1", &beat(-1, 0, false)).await.is_err());
    }

    #[tokio::test]
    async fn test_overview() {
        let (pool, service) = setup_service().await;
        let a = insert_post(&pool, "a", PostStatus::Published).await;
        let b = insert_post(&pool, "b", PostStatus::Published).await;

        service.record_view(a, "v1", Some("https://google.com/")).await.unwrap();
        service.record_view(a, "v2", Some("https://google.com/search")).await.unwrap();
        service.record_view(b, "v1", None).await.unwrap();

        let overview = service.overview(0).await.unwrap();
        assert_eq!(overview.days, 1);
        assert_eq!(overview.total_views, 3);
        assert_eq!(overview.unique_visitors, 2);
        assert_eq!(overview.views_today, 3);
        assert_eq!(overview.top_posts[0].post_id, a);
        assert_eq!(overview.top_referrers[0].referrer, "google.com");
        assert_eq!(overview.top_referrers[0].views, 2);
        assert_eq!(overview.daily.iter().map(|d| d.views).sum::<i64>(), 3);

        assert_eq!(service.overview(10_000).await.unwrap().days, MAX_OVERVIEW_DAYS);
    }
}
