//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a specific entity, on both
//! SQLite and MySQL.

pub mod admin;
pub mod analytics;
pub mod book;
pub mod comment;
pub mod draft;
pub mod post;
pub mod preset;
pub mod series;
pub mod session;
pub mod settings;
pub mod snippet;
pub mod tag;

pub use admin::{AdminRepository, SqlxAdminRepository};
pub use analytics::{AnalyticsRepository, SqlxAnalyticsRepository};
pub use book::{BookRepository, SqlxBookRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use draft::{DraftRepository, SqlxDraftRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use preset::{PresetRepository, SqlxPresetRepository};
pub use series::{SeriesRepository, SqlxSeriesRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use settings::{Setting, SettingsRepository, SqlxSettingsRepository};
pub use snippet::{SnippetRepository, SqlxSnippetRepository};
pub use tag::{SqlxTagRepository, TagRepository};
