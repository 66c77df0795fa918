//! Book note API endpoints
//!
//! - GET /api/books - Public book notes (`status` filter)
//! - GET /api/books/{slug} - Book note with SEO metadata
//! - /api/admin/books[/{id}] - Admin CRUD

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_admin_per_page, default_page, default_per_page};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{Book, CreateBookInput, ListParams, PagedResult, ReadingStatus, UpdateBookInput};
use crate::services::seo::{book_meta, SeoMeta};

#[derive(Debug, Deserialize)]
pub struct ListBooksQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<ReadingStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AdminListBooksQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_admin_per_page")]
    pub per_page: u32,
    pub status: Option<ReadingStatus>,
}

#[derive(Debug, Serialize)]
pub struct BookDetailResponse {
    #[serde(flatten)]
    pub book: Book,
    pub seo: SeoMeta,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_books))
        .route("/{slug}", get(get_book))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list_books).post(create_book))
        .route(
            "/{id}",
            get(admin_get_book).put(update_book).delete(delete_book),
        )
}

async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<ListBooksQuery>,
) -> Result<Json<PagedResult<Book>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(state.book_service.list_public(&params, query.status).await?))
}

async fn get_book(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BookDetailResponse>, ApiError> {
    let book = state.book_service.get_public_by_slug(&slug).await?;
    let site = state.settings_service.get_site_settings().await?;
    let seo = book_meta(&book, &site);
    Ok(Json(BookDetailResponse { book, seo }))
}

async fn admin_list_books(
    State(state): State<AppState>,
    Query(query): Query<AdminListBooksQuery>,
) -> Result<Json<PagedResult<Book>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(state.book_service.list_admin(&params, query.status).await?))
}

async fn admin_get_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Book>, ApiError> {
    Ok(Json(state.book_service.get_by_id(id).await?))
}

async fn create_book(
    State(state): State<AppState>,
    Json(input): Json<CreateBookInput>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let book = state.book_service.create(input).await?;
    state.seo_service.invalidate().await;
    Ok((StatusCode::CREATED, Json(book)))
}

async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateBookInput>,
) -> Result<Json<Book>, ApiError> {
    let book = state.book_service.update(id, input).await?;
    state.seo_service.invalidate().await;
    Ok(Json(book))
}

async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.book_service.delete(id).await?;
    state.seo_service.invalidate().await;
    Ok(StatusCode::NO_CONTENT)
}
