//! Message generation capability.
//!
//! The core treats the language model as an opaque capability: given a
//! [`Prompt`], return text. Two implementations ship with the crate:
//!
//! - [`OpenAiGenerator`]: any OpenAI-compatible chat-completions endpoint
//! - [`ScriptedGenerator`]: deterministic offline text, for dry runs and tests

mod openai;
mod scripted;

pub use openai::{OpenAiConfig, OpenAiGenerator};
pub use scripted::ScriptedGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What a prompt asks the capability to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// One conversational turn for the speaking agent
    Turn,
    /// A JSON agent profile for a topic
    AgentProfile,
}

/// Input to the generation capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// What is being asked for
    pub kind: PromptKind,
    /// System instructions
    pub system: String,
    /// User content
    pub user: String,
    /// Experiment topic
    #[serde(default)]
    pub topic: String,
    /// Speaking agent for [`PromptKind::Turn`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Zero-based turn number for [`PromptKind::Turn`]
    #[serde(default)]
    pub turn: usize,
}

/// Model parameters reported in run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParams {
    /// Model identifier
    pub model: String,
    /// Model version label
    pub version: String,
    /// Human-readable context window
    pub context_window: String,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            version: "Latest".to_string(),
            context_window: "8K tokens".to_string(),
            temperature: 0.7,
        }
    }
}

/// Opaque "generate next message given context" capability.
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    /// Produce one body of text for `prompt`.
    async fn complete(&self, prompt: &Prompt) -> Result<String>;

    /// Parameters of the underlying model.
    fn model_params(&self) -> ModelParams;
}
