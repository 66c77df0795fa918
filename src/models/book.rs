//! Book note model
//!
//! A book note records a book that was (or is being) read, with a rating and
//! markdown notes. Private notes are hidden from the public listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Book note entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub cover_image: Option<String>,
    /// 1..=5 stars
    pub rating: Option<i32>,
    pub status: ReadingStatus,
    /// Markdown notes
    pub notes: String,
    pub notes_html: String,
    pub is_public: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reading progress of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    #[default]
    WantToRead,
    Reading,
    Finished,
    Abandoned,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::WantToRead => "want_to_read",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Finished => "finished",
            ReadingStatus::Abandoned => "abandoned",
        }
    }
}

impl FromStr for ReadingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "want_to_read" => Ok(ReadingStatus::WantToRead),
            "reading" => Ok(ReadingStatus::Reading),
            "finished" => Ok(ReadingStatus::Finished),
            "abandoned" => Ok(ReadingStatus::Abandoned),
            _ => Err(format!("Invalid reading status: {}", s)),
        }
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBookInput {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub status: ReadingStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBookInput {
    pub title: Option<String>,
    pub author: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "super::post::double_option")]
    pub isbn: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::post::double_option")]
    pub cover_image: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::post::double_option")]
    pub rating: Option<Option<i32>>,
    pub status: Option<ReadingStatus>,
    pub notes: Option<String>,
    pub is_public: Option<bool>,
    #[serde(default, deserialize_with = "super::post::double_option")]
    pub started_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "super::post::double_option")]
    pub finished_at: Option<Option<DateTime<Utc>>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_status_serde() {
        let json = serde_json::to_string(&ReadingStatus::WantToRead).unwrap();
        assert_eq!(json, "\"want_to_read\"");
        assert_eq!(
            "finished".parse::<ReadingStatus>().unwrap(),
            ReadingStatus::Finished
        );
    }

    #[test]
    fn test_create_input_defaults_to_public() {
        let input: CreateBookInput = serde_json::from_str(r#"{"title": "Dune"}"#).unwrap();
        assert!(input.is_public);
        assert_eq!(input.status, ReadingStatus::WantToRead);
    }
}
