//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{MessageGenerator, ModelParams, Prompt};
use crate::error::{LabError, Result};

/// Client configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion budget per call
    pub max_tokens: u32,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 400,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Generator backed by an OpenAI-compatible endpoint.
pub struct OpenAiGenerator {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiGenerator {
    /// Build the HTTP client for `config`.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LabError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl MessageGenerator for OpenAiGenerator {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LabError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LabError::Generation(format!("API error {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LabError::Generation(format!("JSON parse error: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LabError::Generation("empty completion".to_string()));
        }

        tracing::debug!(
            kind = ?prompt.kind,
            chars = content.len(),
            "completion received"
        );
        Ok(content)
    }

    fn model_params(&self) -> ModelParams {
        ModelParams {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            ..ModelParams::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PromptKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prompt() -> Prompt {
        Prompt {
            kind: PromptKind::Turn,
            system: "You are Ada.".into(),
            user: "Topic: Space".into(),
            topic: "Space".into(),
            speaker: Some("Ada".into()),
            turn: 0,
        }
    }

    fn generator(server: &MockServer) -> OpenAiGenerator {
        OpenAiGenerator::new(OpenAiConfig {
            base_url: format!("{}/v1", server.uri()),
            api_key: Some("sk-test".into()),
            ..OpenAiConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Orbits are fun."}}]
            })))
            .mount(&server)
            .await;

        let text = generator(&server).complete(&prompt()).await.unwrap();
        assert_eq!(text, "Orbits are fun.");
    }

    #[tokio::test]
    async fn test_upstream_error_is_generation_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = generator(&server).complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, LabError::Generation(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_generation_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = generator(&server).complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, LabError::Generation(_)));
    }
}
