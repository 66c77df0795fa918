//! Book note service
//!
//! Reading log entries with a rating and markdown notes. Only public notes
//! are listed on the site.

use chrono::Utc;
use std::sync::Arc;

use crate::db::repositories::BookRepository;
use crate::models::{
    Book, CreateBookInput, ListParams, PagedResult, ReadingStatus, UpdateBookInput,
};
use crate::services::markdown::MarkdownRenderer;
use crate::services::text::{generate_slug, unique_slug};

const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum BookServiceError {
    #[error("Book not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Book slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct BookService {
    repo: Arc<dyn BookRepository>,
    markdown_renderer: MarkdownRenderer,
}

impl BookService {
    pub fn new(repo: Arc<dyn BookRepository>, markdown_renderer: MarkdownRenderer) -> Self {
        Self {
            repo,
            markdown_renderer,
        }
    }

    pub async fn create(&self, input: CreateBookInput) -> Result<Book, BookServiceError> {
        let title = validate_title(&input.title)?;
        validate_rating(input.rating)?;
        validate_dates(&input.started_at, &input.finished_at)?;

        let slug_source = if input.author.trim().is_empty() {
            title.clone()
        } else {
            format!("{} {}", title, input.author.trim())
        };
        let slug = self.pick_slug(input.slug.as_deref(), &slug_source, None).await?;

        let now = Utc::now();
        let book = Book {
            id: 0,
            slug,
            title,
            author: input.author.trim().to_string(),
            isbn: input.isbn.map(|i| i.trim().to_string()).filter(|i| !i.is_empty()),
            cover_image: input.cover_image.filter(|c| !c.trim().is_empty()),
            rating: input.rating,
            status: input.status,
            notes_html: self.markdown_renderer.render(&input.notes),
            notes: input.notes,
            is_public: input.is_public,
            started_at: input.started_at,
            finished_at: input.finished_at.or_else(|| {
                (input.status == ReadingStatus::Finished).then_some(now)
            }),
            created_at: now,
            updated_at: now,
        };

        Ok(self.repo.create(&book).await?)
    }

    pub async fn update(&self, id: i64, input: UpdateBookInput) -> Result<Book, BookServiceError> {
        let mut book = self.get_by_id(id).await?;

        if let Some(title) = input.title {
            book.title = validate_title(&title)?;
        }
        if let Some(author) = input.author {
            book.author = author.trim().to_string();
        }
        if let Some(slug) = input.slug {
            book.slug = self.pick_slug(Some(&slug), &book.title, Some(id)).await?;
        }
        if let Some(isbn) = input.isbn {
            book.isbn = isbn.map(|i| i.trim().to_string()).filter(|i| !i.is_empty());
        }
        if let Some(cover_image) = input.cover_image {
            book.cover_image = cover_image.filter(|c| !c.trim().is_empty());
        }
        if let Some(rating) = input.rating {
            validate_rating(rating)?;
            book.rating = rating;
        }
        if let Some(notes) = input.notes {
            book.notes_html = self.markdown_renderer.render(&notes);
            book.notes = notes;
        }
        if let Some(is_public) = input.is_public {
            book.is_public = is_public;
        }
        if let Some(started_at) = input.started_at {
            book.started_at = started_at;
        }
        if let Some(finished_at) = input.finished_at {
            book.finished_at = finished_at;
        }

        let now = Utc::now();
        if let Some(status) = input.status {
            if status == ReadingStatus::Finished && book.finished_at.is_none() {
                book.finished_at = Some(now);
            }
            book.status = status;
        }
        validate_dates(&book.started_at, &book.finished_at)?;
        book.updated_at = now;

        Ok(self.repo.update(&book).await?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), BookServiceError> {
        self.get_by_id(id).await?;
        self.repo.delete(id).await?;
        Ok(())
    }

    /// Any book note (admin)
    pub async fn get_by_id(&self, id: i64) -> Result<Book, BookServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| BookServiceError::NotFound(id.to_string()))
    }

    /// A public book note; private notes look missing
    pub async fn get_public_by_slug(&self, slug: &str) -> Result<Book, BookServiceError> {
        self.repo
            .get_by_slug(slug)
            .await?
            .filter(|b| b.is_public)
            .ok_or_else(|| BookServiceError::NotFound(slug.to_string()))
    }

    pub async fn list_public(
        &self,
        params: &ListParams,
        status: Option<ReadingStatus>,
    ) -> Result<PagedResult<Book>, BookServiceError> {
        let (items, total) = self.repo.list(params, status, true).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn list_admin(
        &self,
        params: &ListParams,
        status: Option<ReadingStatus>,
    ) -> Result<PagedResult<Book>, BookServiceError> {
        let (items, total) = self.repo.list(params, status, false).await?;
        Ok(PagedResult::new(items, total, params))
    }

    async fn pick_slug(
        &self,
        requested: Option<&str>,
        source: &str,
        exclude_id: Option<i64>,
    ) -> Result<String, BookServiceError> {
        if let Some(requested) = requested.map(generate_slug).filter(|s| !s.is_empty()) {
            if self.repo.slug_exists(&requested, exclude_id).await? {
                return Err(BookServiceError::DuplicateSlug(requested));
            }
            return Ok(requested);
        }

        let repo = self.repo.clone();
        Ok(unique_slug(&generate_slug(source), "book", |candidate| {
            let repo = repo.clone();
            async move { repo.slug_exists(&candidate, exclude_id).await }
        })
        .await?)
    }
}

fn validate_title(title: &str) -> Result<String, BookServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(BookServiceError::ValidationError(
            "Book title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(BookServiceError::ValidationError(format!(
            "Book title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

fn validate_rating(rating: Option<i32>) -> Result<(), BookServiceError> {
    match rating {
        Some(r) if !(1..=5).contains(&r) => Err(BookServiceError::ValidationError(
            "Rating must be between 1 and 5".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_dates(
    started_at: &Option<chrono::DateTime<Utc>>,
    finished_at: &Option<chrono::DateTime<Utc>>,
) -> Result<(), BookServiceError> {
    if let (Some(start), Some(end)) = (started_at, finished_at) {
        if end < start {
            return Err(BookServiceError::ValidationError(
                "Finish date cannot be before start date".to_string(),
            ));
        }
    }
    Ok(())
}
