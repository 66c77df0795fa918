//! Analytics models: page views, reading sessions and aggregate reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single counted view of a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: i64,
    pub post_id: i64,
    pub visitor_hash: String,
    pub referrer: Option<String>,
    pub viewed_at: DateTime<Utc>,
}

/// One visitor's reading of one post, kept alive by heartbeats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingSession {
    pub id: String,
    pub post_id: i64,
    #[serde(skip_serializing)]
    pub visitor_hash: String,
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub duration_seconds: i64,
    /// Furthest scroll position reached, in percent
    pub max_scroll_depth: i32,
    pub completed: bool,
}

/// Heartbeat sent by the reader while a session is open
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionHeartbeat {
    pub duration_seconds: i64,
    #[serde(default)]
    pub scroll_depth: i32,
    #[serde(default)]
    pub completed: bool,
}

/// Per-post audience numbers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostStats {
    pub post_id: i64,
    pub views: i64,
    pub unique_visitors: i64,
    pub reading_sessions: i64,
    pub avg_read_seconds: f64,
    /// Share of reading sessions marked completed (0.0..=1.0)
    pub completion_rate: f64,
}

/// Views and visitors on a single day (`YYYY-MM-DD`, UTC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyViews {
    pub date: String,
    pub views: i64,
    pub visitors: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPost {
    pub post_id: i64,
    pub slug: String,
    pub title: String,
    pub views: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferrerCount {
    pub referrer: String,
    pub views: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingSummary {
    pub sessions: i64,
    pub avg_duration_seconds: f64,
    pub avg_scroll_depth: f64,
}

/// Dashboard report over the last `days` days
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsOverview {
    pub days: u32,
    pub total_views: i64,
    pub unique_visitors: i64,
    pub views_today: i64,
    pub daily: Vec<DailyViews>,
    pub top_posts: Vec<TopPost>,
    pub top_referrers: Vec<ReferrerCount>,
    pub reading: ReadingSummary,
}

/// All-time counter shown in the public site footer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteCounter {
    pub total_views: i64,
    pub unique_visitors: i64,
}
