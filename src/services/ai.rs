//! AI completion service
//!
//! Talks to any OpenAI-compatible `chat/completions` endpoint. A knowledge
//! preset supplies the system prompt and background context; a post can be
//! attached so the model sees what is being edited.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AiConfig;
use crate::db::repositories::{PostRepository, PresetRepository};
use crate::models::{KnowledgePreset, Post};
use crate::services::preset::DEFAULT_TEMPERATURE;

const MAX_PROMPT_CHARS: usize = 8000;

#[derive(Debug, thiserror::Error)]
pub enum AiServiceError {
    #[error("AI assistance is disabled")]
    Disabled,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Request body for `POST /api/admin/ai/complete`
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    pub preset_id: Option<i64>,
    pub prompt: String,
    pub post_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct AiService {
    config: AiConfig,
    client: reqwest::Client,
    presets: Arc<dyn PresetRepository>,
    posts: Arc<dyn PostRepository>,
}

impl AiService {
    pub fn new(
        config: &AiConfig,
        presets: Arc<dyn PresetRepository>,
        posts: Arc<dyn PostRepository>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config: config.clone(),
            client,
            presets,
            posts,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<Completion, AiServiceError> {
        if !self.config.enabled {
            return Err(AiServiceError::Disabled);
        }

        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(AiServiceError::ValidationError(
                "Prompt cannot be empty".to_string(),
            ));
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(AiServiceError::ValidationError(format!(
                "Prompt must be at most {} characters",
                MAX_PROMPT_CHARS
            )));
        }

        let preset = match request.preset_id {
            Some(id) => Some(
                self.presets
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| AiServiceError::NotFound(format!("Preset {}", id)))?,
            ),
            None => None,
        };
        let post = match request.post_id {
            Some(id) => Some(
                self.posts
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| AiServiceError::NotFound(format!("Post {}", id)))?,
            ),
            None => None,
        };

        let model = preset
            .as_ref()
            .and_then(|p| p.model.clone())
            .unwrap_or_else(|| self.config.model.clone());
        let body = ChatRequest {
            model: &model,
            messages: build_messages(preset.as_ref(), post.as_ref(), prompt),
            temperature: preset
                .as_ref()
                .map(|p| p.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!("AI request failed: {}", e);
            AiServiceError::Upstream(format!("Request failed: {}", e))
        })?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "AI endpoint returned an error");
            return Err(AiServiceError::Upstream(format!(
                "Endpoint returned status {}",
                status.as_u16()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiServiceError::Upstream(format!("Invalid response: {}", e)))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiServiceError::Upstream("Response contained no text".to_string()))?;

        Ok(Completion { text, model })
    }
}

/// System message from the preset (and the attached post), then the prompt
fn build_messages(
    preset: Option<&KnowledgePreset>,
    post: Option<&Post>,
    prompt: &str,
) -> Vec<ChatMessage> {
    let mut system = Vec::new();
    if let Some(preset) = preset {
        system.push(preset.system_prompt.trim().to_string());
        if !preset.context.trim().is_empty() {
            system.push(format!("Context:\n{}", preset.context.trim()));
        }
    }
    if let Some(post) = post {
        system.push(format!(
            "Current post \"{}\":\n{}",
            post.display_title(),
            post.content
        ));
    }

    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: system.join("\n\n"),
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: prompt.to_string(),
    });
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{SqlxPostRepository, SqlxPresetRepository};
    use crate::services::preset::PresetService;
    use crate::models::CreatePresetInput;
    use axum::{routing::post, Json, Router};

    async fn setup_service(config: AiConfig) -> (AiService, PresetService) {
        let pool = setup_pool().await;
        let presets = SqlxPresetRepository::boxed(pool.clone());
        let service =
            AiService::new(&config, presets.clone(), SqlxPostRepository::boxed(pool)).unwrap();
        (service, PresetService::new(presets))
    }

    /// Serve a fixed chat response on an ephemeral port
    async fn spawn_endpoint(reply: serde_json::Value) -> String {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<serde_json::Value>| {
                let reply = reply.clone();
                async move {
                    assert_eq!(body["messages"].as_array().map(|m| m.is_empty()), Some(false));
                    Json(reply)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn enabled(base_url: String) -> AiConfig {
        AiConfig {
            enabled: true,
            base_url,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            preset_id: None,
            prompt: prompt.to_string(),
            post_id: None,
        }
    }

    #[test]
    fn test_build_messages() {
        let messages = build_messages(None, None, "Suggest a title");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");

        let now = chrono::Utc::now();
        let preset = KnowledgePreset {
            id: 1,
            name: "Editor".to_string(),
            description: String::new(),
            system_prompt: "Be concise.".to_string(),
            context: "The blog is about Rust.".to_string(),
            model: None,
            temperature: 0.2,
            created_at: now,
            updated_at: now,
        };
        let messages = build_messages(Some(&preset), None, "Suggest a title");
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.starts_with("Be concise."));
        assert!(messages[0].content.contains("The blog is about Rust."));
        assert_eq!(messages[1].content, "Suggest a title");
    }

    #[tokio::test]
    async fn test_disabled() {
        let (service, _) = setup_service(AiConfig::default()).await;
        assert!(!service.is_enabled());
        assert!(matches!(
            service.complete(request("hello")).await,
            Err(AiServiceError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_validation_and_missing_preset() {
        let (service, _) = setup_service(enabled("http://127.0.0.1:9".to_string())).await;
        assert!(matches!(
            service.complete(request("   ")).await,
            Err(AiServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service
                .complete(CompletionRequest {
                    preset_id: Some(42),
                    ..request("hello")
                })
                .await,
            Err(AiServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_completion_with_preset() {
        let base_url = spawn_endpoint(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Ownership, explained" } }]
        }))
        .await;
        let (service, presets) = setup_service(enabled(base_url)).await;
        let preset = presets
            .create(CreatePresetInput {
                name: "Titles".to_string(),
                system_prompt: "Write titles.".to_string(),
                model: Some("local-model".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let completion = service
            .complete(CompletionRequest {
                preset_id: Some(preset.id),
                ..request("A post about borrowing")
            })
            .await
            .unwrap();
        assert_eq!(completion.text, "Ownership, explained");
        assert_eq!(completion.model, "local-model");
    }

    #[tokio::test]
    async fn test_upstream_failures() {
        let base_url = spawn_endpoint(serde_json::json!({ "choices": [] })).await;
        let (service, _) = setup_service(enabled(base_url)).await;
        assert!(matches!(
            service.complete(request("hello")).await,
            Err(AiServiceError::Upstream(_))
        ));

        // Nothing listens on the discard port
        let (service, _) = setup_service(enabled("http://127.0.0.1:9".to_string())).await;
        assert!(matches!(
            service.complete(request("hello")).await,
            Err(AiServiceError::Upstream(_))
        ));
    }
}
