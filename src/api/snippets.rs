//! Code snippet library (admin only)
//!
//! - GET/POST /api/admin/snippets (`q`, `language` filters)
//! - GET /api/admin/snippets/languages
//! - GET/PUT/DELETE /api/admin/snippets/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_admin_per_page, default_page};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{CreateSnippetInput, ListParams, PagedResult, Snippet, UpdateSnippetInput};

#[derive(Debug, Deserialize)]
pub struct SearchSnippetsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_admin_per_page")]
    pub per_page: u32,
    pub q: Option<String>,
    pub language: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(search_snippets).post(create_snippet))
        .route("/languages", get(list_languages))
        .route(
            "/{id}",
            get(get_snippet).put(update_snippet).delete(delete_snippet),
        )
}

async fn search_snippets(
    State(state): State<AppState>,
    Query(query): Query<SearchSnippetsQuery>,
) -> Result<Json<PagedResult<Snippet>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(
        state
            .snippet_service
            .search(&params, query.q.as_deref(), query.language.as_deref())
            .await?,
    ))
}

async fn list_languages(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.snippet_service.languages().await?))
}

async fn get_snippet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Snippet>, ApiError> {
    Ok(Json(state.snippet_service.get(id).await?))
}

async fn create_snippet(
    State(state): State<AppState>,
    Json(input): Json<CreateSnippetInput>,
) -> Result<(StatusCode, Json<Snippet>), ApiError> {
    let snippet = state.snippet_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(snippet)))
}

async fn update_snippet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateSnippetInput>,
) -> Result<Json<Snippet>, ApiError> {
    Ok(Json(state.snippet_service.update(id, input).await?))
}

async fn delete_snippet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.snippet_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
