//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files (`~/.config/agentlab/config.toml` by default)
//! - Environment variables
//! - CLI arguments (for `agentlab serve` / `agentlab run`)
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::archive::{FsStore, MemoryStore, ObjectStore, S3Config, S3Store};
use crate::error::{LabError, Result};
use crate::llm::{MessageGenerator, OpenAiConfig, OpenAiGenerator, ScriptedGenerator};
use crate::playback::Pacing;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub server: HttpConfig,

    /// Session storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Message generation
    #[serde(default)]
    pub llm: LlmConfig,

    /// Run limits
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Playback delays
    #[serde(default)]
    pub playback: Pacing,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("agentlab").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| LabError::Config(format!("Failed to read config file {}: {e}", path.display())))?;

        toml::from_str(&content).map_err(|e| LabError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Server settings
        if let Some(host) = var("AGENTLAB_HOST") {
            config.server.host = host;
        }
        if let Some(port) = var("AGENTLAB_PORT").or_else(|| var("PORT")) {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }

        // Storage settings
        if let Some(backend) = var("AGENTLAB_STORAGE") {
            match backend.to_ascii_lowercase().as_str() {
                "memory" => config.storage.backend = StorageBackend::Memory,
                "fs" | "file" => config.storage.backend = StorageBackend::Fs,
                "s3" | "r2" => config.storage.backend = StorageBackend::S3,
                other => tracing::warn!(value = other, "ignoring unknown AGENTLAB_STORAGE"),
            }
        }
        if let Some(dir) = var("AGENTLAB_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(account) = var("CLOUDFLARE_ACCOUNT_ID") {
            config.storage.s3.account_id = account;
        }
        if let Some(key) = var("CLOUDFLARE_ACCESS_KEY_ID") {
            config.storage.s3.access_key_id = key;
        }
        if let Some(secret) = var("CLOUDFLARE_SECRET_ACCESS_KEY") {
            config.storage.s3.secret_access_key = secret;
        }
        if let Some(bucket) = var("CLOUDFLARE_BUCKET_NAME") {
            config.storage.s3.bucket = bucket;
        }
        if let Some(endpoint) = var("AGENTLAB_S3_ENDPOINT") {
            config.storage.s3.endpoint = Some(endpoint);
        }

        // LLM settings
        if let Some(key) = var("OPENAI_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Some(url) = var("AGENTLAB_LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = var("AGENTLAB_LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(provider) = var("AGENTLAB_LLM_PROVIDER") {
            match provider.to_ascii_lowercase().as_str() {
                "openai" => config.llm.provider = LlmProvider::OpenAi,
                "scripted" => config.llm.provider = LlmProvider::Scripted,
                other => tracing::warn!(value = other, "ignoring unknown AGENTLAB_LLM_PROVIDER"),
            }
        }

        config
    }

    /// Merge with another config (other takes precedence where it differs
    /// from the defaults)
    pub fn merge(self, other: Self) -> Self {
        fn pick<T: PartialEq>(base: T, other: T, default: T) -> T {
            if other != default {
                other
            } else {
                base
            }
        }

        let d = Self::default();
        Self {
            server: HttpConfig {
                host: pick(self.server.host, other.server.host, d.server.host),
                port: pick(self.server.port, other.server.port, d.server.port),
                cors: pick(self.server.cors, other.server.cors, d.server.cors),
                max_body_size: pick(
                    self.server.max_body_size,
                    other.server.max_body_size,
                    d.server.max_body_size,
                ),
                request_logging: pick(
                    self.server.request_logging,
                    other.server.request_logging,
                    d.server.request_logging,
                ),
            },
            storage: StorageConfig {
                backend: pick(self.storage.backend, other.storage.backend, d.storage.backend),
                data_dir: pick(self.storage.data_dir, other.storage.data_dir, d.storage.data_dir),
                page_size: pick(self.storage.page_size, other.storage.page_size, d.storage.page_size),
                s3: S3Settings {
                    account_id: pick(self.storage.s3.account_id, other.storage.s3.account_id, d.storage.s3.account_id),
                    access_key_id: pick(
                        self.storage.s3.access_key_id,
                        other.storage.s3.access_key_id,
                        d.storage.s3.access_key_id,
                    ),
                    secret_access_key: pick(
                        self.storage.s3.secret_access_key,
                        other.storage.s3.secret_access_key,
                        d.storage.s3.secret_access_key,
                    ),
                    bucket: pick(self.storage.s3.bucket, other.storage.s3.bucket, d.storage.s3.bucket),
                    endpoint: pick(self.storage.s3.endpoint, other.storage.s3.endpoint, d.storage.s3.endpoint),
                    region: pick(self.storage.s3.region, other.storage.s3.region, d.storage.s3.region),
                },
            },
            llm: LlmConfig {
                provider: pick(self.llm.provider, other.llm.provider, d.llm.provider),
                base_url: pick(self.llm.base_url, other.llm.base_url, d.llm.base_url),
                api_key: pick(self.llm.api_key, other.llm.api_key, d.llm.api_key),
                model: pick(self.llm.model, other.llm.model, d.llm.model),
                temperature: pick(self.llm.temperature, other.llm.temperature, d.llm.temperature),
                max_tokens: pick(self.llm.max_tokens, other.llm.max_tokens, d.llm.max_tokens),
                timeout_secs: pick(self.llm.timeout_secs, other.llm.timeout_secs, d.llm.timeout_secs),
                seed: pick(self.llm.seed, other.llm.seed, d.llm.seed),
            },
            conversation: ConversationConfig {
                max_messages_per_agent: pick(
                    self.conversation.max_messages_per_agent,
                    other.conversation.max_messages_per_agent,
                    d.conversation.max_messages_per_agent,
                ),
                turn_timeout_secs: pick(
                    self.conversation.turn_timeout_secs,
                    other.conversation.turn_timeout_secs,
                    d.conversation.turn_timeout_secs,
                ),
            },
            playback: pick(self.playback, other.playback, d.playback),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Permissive CORS
    pub cors: bool,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Log every request
    pub request_logging: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            cors: true,
            max_body_size: 2 * 1024 * 1024, // 2 MB
            request_logging: true,
        }
    }
}

impl HttpConfig {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where sessions are stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory; lost on exit
    #[default]
    Memory,
    /// Files under `data_dir`
    Fs,
    /// S3-compatible bucket
    S3,
}

/// S3 / R2 credentials and bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// Cloudflare account id, used to derive the R2 endpoint
    pub account_id: String,

    /// Access key id
    pub access_key_id: String,

    /// Secret access key
    pub secret_access_key: String,

    /// Bucket name
    pub bucket: String,

    /// Explicit endpoint, overriding the R2 one
    pub endpoint: Option<String>,

    /// Signing region
    pub region: String,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket: "chat-sessions".to_string(),
            endpoint: None,
            region: "auto".to_string(),
        }
    }
}

/// Session storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend
    pub backend: StorageBackend,

    /// Root directory for the `fs` backend
    pub data_dir: PathBuf,

    /// Sessions per page
    pub page_size: usize,

    /// Settings for the `s3` backend
    pub s3: S3Settings,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: dirs::data_dir()
                .map(|p| p.join("agentlab").join("sessions"))
                .unwrap_or_else(|| PathBuf::from("data/sessions")),
            page_size: crate::archive::DEFAULT_PAGE_SIZE,
            s3: S3Settings::default(),
        }
    }
}

impl StorageConfig {
    /// Build the configured object store.
    pub fn build_store(&self) -> Result<Arc<dyn ObjectStore>> {
        Ok(match self.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Fs => Arc::new(FsStore::new(&self.data_dir)),
            StorageBackend::S3 => {
                let s3 = &self.s3;
                if s3.access_key_id.is_empty() || s3.secret_access_key.is_empty() {
                    return Err(LabError::Config(
                        "s3 storage needs CLOUDFLARE_ACCESS_KEY_ID and CLOUDFLARE_SECRET_ACCESS_KEY".to_string(),
                    ));
                }
                let mut config = match &s3.endpoint {
                    Some(endpoint) => S3Config {
                        endpoint: endpoint.clone(),
                        ..S3Config::r2("", &s3.bucket, &s3.access_key_id, &s3.secret_access_key)
                    },
                    None if !s3.account_id.is_empty() => {
                        S3Config::r2(&s3.account_id, &s3.bucket, &s3.access_key_id, &s3.secret_access_key)
                    },
                    None => {
                        return Err(LabError::Config(
                            "s3 storage needs CLOUDFLARE_ACCOUNT_ID or AGENTLAB_S3_ENDPOINT".to_string(),
                        ))
                    },
                };
                config.region.clone_from(&s3.region);
                Arc::new(S3Store::new(config)?)
            },
        })
    }
}

/// Generation backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI-compatible HTTP endpoint
    #[default]
    #[serde(alias = "open_ai")]
    OpenAi,
    /// Deterministic offline generator
    Scripted,
}

/// Message generation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend
    pub provider: LlmProvider,

    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// API key
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion budget per call
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Seed for the scripted generator
    pub seed: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let openai = OpenAiConfig::default();
        Self {
            provider: LlmProvider::OpenAi,
            base_url: openai.base_url,
            api_key: None,
            model: openai.model,
            temperature: openai.temperature,
            max_tokens: openai.max_tokens,
            timeout_secs: openai.timeout.as_secs(),
            seed: 0,
        }
    }
}

impl LlmConfig {
    /// Build the configured generator.
    pub fn build_generator(&self) -> Result<Arc<dyn MessageGenerator>> {
        Ok(match self.provider {
            LlmProvider::Scripted => Arc::new(ScriptedGenerator::new(self.seed)),
            LlmProvider::OpenAi => {
                if self.api_key.is_none() {
                    tracing::warn!("no OPENAI_API_KEY set; requests will be sent unauthenticated");
                }
                Arc::new(OpenAiGenerator::new(OpenAiConfig {
                    base_url: self.base_url.clone(),
                    api_key: self.api_key.clone(),
                    model: self.model.clone(),
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                    timeout: Duration::from_secs(self.timeout_secs),
                })?)
            },
        })
    }
}

/// Run limits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Upper bound on messages per agent; unset accepts any positive value
    pub max_messages_per_agent: Option<usize>,

    /// Per-turn generation timeout in seconds
    pub turn_timeout_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.s3.bucket, "chat-sessions");
        assert_eq!(config.storage.page_size, 10);
        assert_eq!(config.playback.message_gap_ms, 800);
    }

    #[test]
    fn test_listen_addr() {
        assert_eq!(HttpConfig::default().listen_addr(), "127.0.0.1:3001");
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [server]
            port = 9090
            host = "0.0.0.0"

            [storage]
            backend = "fs"
            data_dir = "/var/lib/agentlab"

            [llm]
            provider = "scripted"
            seed = 42

            [conversation]
            max_messages_per_agent = 10

            [playback]
            word_ms = 10
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.llm.provider, LlmProvider::Scripted);
        assert_eq!(config.conversation.max_messages_per_agent, Some(10));
        assert_eq!(config.playback.word_ms, 10);
        assert_eq!(config.playback.sentence_end_ms, 150);
        assert!(config.server.cors);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "8088"),
            ("AGENTLAB_STORAGE", "s3"),
            ("CLOUDFLARE_ACCOUNT_ID", "acct"),
            ("CLOUDFLARE_BUCKET_NAME", ""),
            ("AGENTLAB_LLM_PROVIDER", "scripted"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.s3.account_id, "acct");
        assert_eq!(config.storage.s3.bucket, "chat-sessions");
        assert_eq!(config.llm.provider, LlmProvider::Scripted);
    }

    #[test]
    fn test_merge_prefers_non_default() {
        let file = Config {
            server: HttpConfig {
                port: 9000,
                ..HttpConfig::default()
            },
            ..Config::default()
        };
        let env = Config {
            llm: LlmConfig {
                provider: LlmProvider::Scripted,
                ..LlmConfig::default()
            },
            ..Config::default()
        };
        let merged = file.merge(env);
        assert_eq!(merged.server.port, 9000);
        assert_eq!(merged.llm.provider, LlmProvider::Scripted);
    }

    #[test]
    fn test_s3_requires_credentials() {
        let storage = StorageConfig {
            backend: StorageBackend::S3,
            ..StorageConfig::default()
        };
        assert!(matches!(storage.build_store(), Err(LabError::Config(_))));
    }
}
