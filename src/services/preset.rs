//! Knowledge preset service

use chrono::Utc;
use std::sync::Arc;

use crate::db::repositories::PresetRepository;
use crate::models::{CreatePresetInput, KnowledgePreset, UpdatePresetInput};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
const MAX_NAME_CHARS: usize = 100;
const MAX_CONTEXT_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum PresetServiceError {
    #[error("Preset not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Preset name already exists: {0}")]
    DuplicateName(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct PresetService {
    repo: Arc<dyn PresetRepository>,
}

impl PresetService {
    pub fn new(repo: Arc<dyn PresetRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<KnowledgePreset>, PresetServiceError> {
        Ok(self.repo.list().await?)
    }

    pub async fn get(&self, id: i64) -> Result<KnowledgePreset, PresetServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| PresetServiceError::NotFound(id.to_string()))
    }

    pub async fn create(
        &self,
        input: CreatePresetInput,
    ) -> Result<KnowledgePreset, PresetServiceError> {
        let name = validate_name(&input.name)?;
        self.ensure_name_free(&name, None).await?;

        let now = Utc::now();
        let preset = KnowledgePreset {
            id: 0,
            name,
            description: input.description.trim().to_string(),
            system_prompt: validate_prompt(input.system_prompt)?,
            context: validate_context(input.context)?,
            model: normalize_model(input.model),
            temperature: validate_temperature(input.temperature.unwrap_or(DEFAULT_TEMPERATURE))?,
            created_at: now,
            updated_at: now,
        };
        Ok(self.repo.create(&preset).await?)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdatePresetInput,
    ) -> Result<KnowledgePreset, PresetServiceError> {
        let mut preset = self.get(id).await?;

        if let Some(name) = input.name {
            let name = validate_name(&name)?;
            self.ensure_name_free(&name, Some(id)).await?;
            preset.name = name;
        }
        if let Some(description) = input.description {
            preset.description = description.trim().to_string();
        }
        if let Some(system_prompt) = input.system_prompt {
            preset.system_prompt = validate_prompt(system_prompt)?;
        }
        if let Some(context) = input.context {
            preset.context = validate_context(context)?;
        }
        if let Some(model) = input.model {
            preset.model = normalize_model(model);
        }
        if let Some(temperature) = input.temperature {
            preset.temperature = validate_temperature(temperature)?;
        }
        preset.updated_at = Utc::now();

        Ok(self.repo.update(&preset).await?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), PresetServiceError> {
        if !self.repo.delete(id).await? {
            return Err(PresetServiceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn ensure_name_free(
        &self,
        name: &str,
        exclude_id: Option<i64>,
    ) -> Result<(), PresetServiceError> {
        match self.repo.get_by_name(name).await? {
            Some(existing) if Some(existing.id) != exclude_id => {
                Err(PresetServiceError::DuplicateName(name.to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn validate_name(name: &str) -> Result<String, PresetServiceError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return Err(PresetServiceError::ValidationError(format!(
            "Preset name must be 1 to {} characters",
            MAX_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

fn validate_prompt(prompt: String) -> Result<String, PresetServiceError> {
    if prompt.trim().is_empty() {
        return Err(PresetServiceError::ValidationError(
            "System prompt cannot be empty".to_string(),
        ));
    }
    Ok(prompt)
}

fn validate_context(context: String) -> Result<String, PresetServiceError> {
    if context.len() > MAX_CONTEXT_BYTES {
        return Err(PresetServiceError::ValidationError(
            "Preset context is too large".to_string(),
        ));
    }
    Ok(context)
}

fn validate_temperature(temperature: f64) -> Result<f64, PresetServiceError> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(PresetServiceError::ValidationError(
            "Temperature must be between 0 and 2".to_string(),
        ));
    }
    Ok(temperature)
}

fn normalize_model(model: Option<String>) -> Option<String> {
    model
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::SqlxPresetRepository;

    async fn setup_service() -> PresetService {
        PresetService::new(SqlxPresetRepository::boxed(setup_pool().await))
    }

    fn preset(name: &str) -> CreatePresetInput {
        CreatePresetInput {
            name: name.to_string(),
            system_prompt: "You are an editor for a personal blog.".to_string(),
            context: "Prefer short sentences.".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_defaults_and_unique_name() {
        let service = setup_service().await;
        let created = service.create(preset("Editor")).await.unwrap();
        assert_eq!(created.temperature, DEFAULT_TEMPERATURE);
        assert!(created.model.is_none());

        assert!(matches!(
            service.create(preset("editor")).await,
            Err(PresetServiceError::DuplicateName(_))
        ));
        assert!(matches!(
            service
                .create(CreatePresetInput {
                    temperature: Some(2.5),
                    ..preset("Hot")
                })
                .await,
            Err(PresetServiceError::ValidationError(_))
        ));
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let service = setup_service().await;
        let editor = service.create(preset("Editor")).await.unwrap();
        let other = service.create(preset("Outliner")).await.unwrap();

        // Renaming onto itself is fine, onto another preset is not
        let same = UpdatePresetInput {
            name: Some("Editor".to_string()),
            model: Some(Some("gpt-4o-mini".to_string())),
            ..Default::default()
        };
        let updated = service.update(editor.id, same).await.unwrap();
        assert_eq!(updated.model.as_deref(), Some("gpt-4o-mini"));

        let clash = UpdatePresetInput {
            name: Some("Outliner".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(editor.id, clash).await,
            Err(PresetServiceError::DuplicateName(_))
        ));

        let clear = UpdatePresetInput {
            model: Some(None),
            ..Default::default()
        };
        assert!(service.update(editor.id, clear).await.unwrap().model.is_none());

        service.delete(other.id).await.unwrap();
        assert!(matches!(
            service.delete(other.id).await,
            Err(PresetServiceError::NotFound(_))
        ));
    }
}
