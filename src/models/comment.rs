//! Comment and reaction models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Comment moderation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    #[default]
    Pending,
    Approved,
    Spam,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Spam => "spam",
        }
    }
}

impl fmt::Display for CommentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CommentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "spam" => Ok(Self::Spam),
            _ => Err(format!("Invalid comment status: {}", s)),
        }
    }
}

/// Comment entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    pub content: String,
    pub status: CommentStatus,
    /// Keyed hash of the commenter's IP and user agent
    #[serde(skip_serializing)]
    pub visitor_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A comment node in a thread, with its replies and reactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentTree {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author_name: String,
    pub avatar_url: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub depth: usize,
    pub reactions: BTreeMap<ReactionKind, i64>,
    pub replies: Vec<CommentTree>,
}

impl CommentTree {
    /// Number of comments in this subtree, including the root
    pub fn size(&self) -> usize {
        1 + self.replies.iter().map(CommentTree::size).sum::<usize>()
    }
}

/// Gravatar URL for an optional email
pub fn gravatar_url(email: Option<&str>) -> String {
    match email.map(str::trim) {
        Some(e) if !e.is_empty() => {
            let hash = format!("{:x}", md5::compute(e.to_lowercase()));
            format!("https://www.gravatar.com/avatar/{}?d=mp&s=80", hash)
        }
        _ => "https://www.gravatar.com/avatar/?d=mp&s=80".to_string(),
    }
}

/// Input for creating a comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentInput {
    pub post_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub author_name: String,
    #[serde(default)]
    pub author_email: Option<String>,
    pub content: String,
}

/// Reaction kinds offered on comments
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Love,
    Laugh,
    Insightful,
    Celebrate,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 5] = [
        ReactionKind::Like,
        ReactionKind::Love,
        ReactionKind::Laugh,
        ReactionKind::Insightful,
        ReactionKind::Celebrate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Love => "love",
            Self::Laugh => "laugh",
            Self::Insightful => "insightful",
            Self::Celebrate => "celebrate",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Invalid reaction: {}", s))
    }
}

/// Reaction counts on a comment plus the caller's own reactions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub comment_id: i64,
    pub counts: BTreeMap<ReactionKind, i64>,
    pub mine: Vec<ReactionKind>,
}

impl ReactionSummary {
    pub fn count(&self, kind: ReactionKind) -> i64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gravatar_url_normalizes_email() {
        let a = gravatar_url(Some(" Reader@Example.com "));
        let b = gravatar_url(Some("reader@example.com"));
        assert_eq!(a, b);
        assert!(a.starts_with("https://www.gravatar.com/avatar/"));
        assert_eq!(gravatar_url(None), "https://www.gravatar.com/avatar/?d=mp&s=80");
    }

    #[test]
    fn test_reaction_kind_parse() {
        assert_eq!("Love".parse::<ReactionKind>().unwrap(), ReactionKind::Love);
        assert!("angry".parse::<ReactionKind>().is_err());
    }

    #[test]
    fn test_reaction_counts_serialize_as_map() {
        let mut summary = ReactionSummary {
            comment_id: 1,
            ..Default::default()
        };
        summary.counts.insert(ReactionKind::Like, 2);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["counts"]["like"], 2);
        assert_eq!(summary.count(ReactionKind::Laugh), 0);
    }
}
