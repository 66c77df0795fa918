//! Knowledge preset model
//!
//! A preset bundles a system prompt with background context ("my writing
//! style", "facts about this blog") for AI-assisted drafting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgePreset {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub context: String,
    /// Overrides the configured default model
    pub model: Option<String>,
    pub temperature: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePresetInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePresetInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
    pub context: Option<String>,
    #[serde(default, deserialize_with = "super::post::double_option")]
    pub model: Option<Option<String>>,
    pub temperature: Option<f64>,
}
