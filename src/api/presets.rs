//! AI knowledge presets (admin only)
//!
//! - GET/POST /api/admin/presets
//! - GET/PUT/DELETE /api/admin/presets/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{CreatePresetInput, KnowledgePreset, UpdatePresetInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_presets).post(create_preset))
        .route(
            "/{id}",
            get(get_preset).put(update_preset).delete(delete_preset),
        )
}

async fn list_presets(
    State(state): State<AppState>,
) -> Result<Json<Vec<KnowledgePreset>>, ApiError> {
    Ok(Json(state.preset_service.list().await?))
}

async fn get_preset(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<KnowledgePreset>, ApiError> {
    Ok(Json(state.preset_service.get(id).await?))
}

async fn create_preset(
    State(state): State<AppState>,
    Json(input): Json<CreatePresetInput>,
) -> Result<(StatusCode, Json<KnowledgePreset>), ApiError> {
    let preset = state.preset_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(preset)))
}

async fn update_preset(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePresetInput>,
) -> Result<Json<KnowledgePreset>, ApiError> {
    Ok(Json(state.preset_service.update(id, input).await?))
}

async fn delete_preset(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.preset_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
