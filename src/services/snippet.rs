//! Snippet library service

use chrono::Utc;
use std::sync::Arc;

use crate::db::repositories::SnippetRepository;
use crate::models::{CreateSnippetInput, ListParams, PagedResult, Snippet, UpdateSnippetInput};

const DEFAULT_LANGUAGE: &str = "text";
const MAX_TITLE_CHARS: usize = 200;
const MAX_LANGUAGE_CHARS: usize = 32;
const MAX_CODE_BYTES: usize = 100 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SnippetServiceError {
    #[error("Snippet not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SnippetService {
    repo: Arc<dyn SnippetRepository>,
}

impl SnippetService {
    pub fn new(repo: Arc<dyn SnippetRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, input: CreateSnippetInput) -> Result<Snippet, SnippetServiceError> {
        let now = Utc::now();
        let snippet = Snippet {
            id: 0,
            title: validate_title(&input.title)?,
            language: normalize_language(input.language.as_deref())?,
            code: validate_code(input.code)?,
            description: input.description.trim().to_string(),
            created_at: now,
            updated_at: now,
        };
        Ok(self.repo.create(&snippet).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Snippet, SnippetServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| SnippetServiceError::NotFound(id.to_string()))
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateSnippetInput,
    ) -> Result<Snippet, SnippetServiceError> {
        let mut snippet = self.get(id).await?;
        if let Some(title) = input.title {
            snippet.title = validate_title(&title)?;
        }
        if let Some(language) = input.language {
            snippet.language = normalize_language(Some(&language))?;
        }
        if let Some(code) = input.code {
            snippet.code = validate_code(code)?;
        }
        if let Some(description) = input.description {
            snippet.description = description.trim().to_string();
        }
        snippet.updated_at = Utc::now();
        Ok(self.repo.update(&snippet).await?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), SnippetServiceError> {
        if !self.repo.delete(id).await? {
            return Err(SnippetServiceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Search title, description and code; optionally restrict the language
    pub async fn search(
        &self,
        params: &ListParams,
        query: Option<&str>,
        language: Option<&str>,
    ) -> Result<PagedResult<Snippet>, SnippetServiceError> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let language = language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());
        let (items, total) = self
            .repo
            .search(params, query, language.as_deref())
            .await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Languages in use, for the filter dropdown
    pub async fn languages(&self) -> Result<Vec<String>, SnippetServiceError> {
        Ok(self.repo.languages().await?)
    }
}

fn validate_title(title: &str) -> Result<String, SnippetServiceError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return Err(SnippetServiceError::ValidationError(format!(
            "Title must be 1 to {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

fn validate_code(code: String) -> Result<String, SnippetServiceError> {
    if code.trim().is_empty() {
        return Err(SnippetServiceError::ValidationError(
            "Code cannot be empty".to_string(),
        ));
    }
    if code.len() > MAX_CODE_BYTES {
        return Err(SnippetServiceError::ValidationError(
            "Snippet is too large".to_string(),
        ));
    }
    Ok(code)
}

/// Lowercase language token; missing means plain text
fn normalize_language(language: Option<&str>) -> Result<String, SnippetServiceError> {
    let language = language.map(str::trim).unwrap_or("").to_lowercase();
    if language.is_empty() {
        return Ok(DEFAULT_LANGUAGE.to_string());
    }
    let valid = language.len() <= MAX_LANGUAGE_CHARS
        && language
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '-' | '_' | '.'));
    if !valid {
        return Err(SnippetServiceError::ValidationError(format!(
            "Invalid language: {}",
            language
        )));
    }
    Ok(language)
}
