//! Upload API endpoints
//!
//! - POST /api/admin/upload/image - Single image, multipart field "file"

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::services::StoredFile;

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the upload router. The body limit follows the configured file size.
pub fn router(max_file_size: u64) -> Router<AppState> {
    let limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/image", post(upload_image))
        .layer(DefaultBodyLimit::max(limit))
}

/// POST /api/admin/upload/image
async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StoredFile>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("unknown").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        let stored = state
            .upload_service
            .store_image(&filename, &content_type, &data)
            .await?;
        return Ok((StatusCode::CREATED, Json(stored)));
    }

    Err(ApiError::validation_error("No file provided"))
}
