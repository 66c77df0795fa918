//! Data models
//!
//! Database entities (Post, Series, Book, Tag, Comment, Admin, ...), the
//! inputs used to create and update them, and pagination helpers.

mod admin;
mod analytics;
mod book;
mod comment;
mod draft;
mod post;
mod preset;
mod series;
mod session;
mod snippet;
mod tag;

pub use admin::{Admin, AdminRole, CreateAdminInput};
pub use analytics::{
    AnalyticsOverview, DailyViews, PostStats, PostView, ReadingSession, ReadingSummary,
    ReferrerCount, SessionHeartbeat, SiteCounter, TopPost,
};
pub use book::{Book, CreateBookInput, ReadingStatus, UpdateBookInput};
pub use comment::{
    gravatar_url, Comment, CommentStatus, CommentTree, CreateCommentInput, ReactionKind,
    ReactionSummary,
};
pub use draft::{Draft, SaveDraftInput};
pub use post::{
    CreatePostInput, ListParams, PagedResult, Post, PostFilter, PostKind, PostStatus,
    PostWithTags, UpdatePostInput,
};
pub use preset::{CreatePresetInput, KnowledgePreset, UpdatePresetInput};
pub use series::{
    CreateSeriesInput, Series, SeriesLink, SeriesNavigation, SeriesWithCount, SeriesWithPosts,
    UpdateSeriesInput,
};
pub use session::Session;
pub use snippet::{CreateSnippetInput, Snippet, UpdateSnippetInput};
pub use tag::{Tag, TagWithCount};
