//! Services layer - Business logic
//!
//! Services validate input, apply the publishing rules and coordinate the
//! repositories with the content cache. Each service has its own error enum;
//! the API layer maps them onto HTTP responses.

pub mod admin;
pub mod ai;
pub mod analytics;
pub mod book;
pub mod comment;
pub mod draft;
pub mod markdown;
pub mod password;
pub mod post;
pub mod preset;
pub mod rate_limiter;
pub mod seo;
pub mod series;
pub mod settings;
pub mod snippet;
pub mod tag;
pub mod text;
pub mod upload;

pub use admin::{AdminService, AdminServiceError, ChangePasswordInput, LoginInput, LoginResult};
pub use ai::{AiService, AiServiceError, Completion, CompletionRequest};
pub use analytics::{AnalyticsService, AnalyticsServiceError};
pub use book::{BookService, BookServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use draft::{DraftService, DraftServiceError};
pub use markdown::{MarkdownRenderer, TocEntry};
pub use password::{hash_password, verify_password};
pub use post::{PostCounts, PostDetail, PostService, PostServiceError};
pub use preset::{PresetService, PresetServiceError};
pub use rate_limiter::{RateLimitDecision, RateLimitScope, RateLimiters};
pub use seo::{SeoMeta, SeoService, SeoServiceError};
pub use series::{SeriesService, SeriesServiceError};
pub use settings::{SettingsService, SettingsServiceError, SiteSettings, UpdateSettingsInput};
pub use snippet::{SnippetService, SnippetServiceError};
pub use tag::{TagService, TagServiceError};
pub use upload::{StoredFile, UploadService, UploadServiceError};
