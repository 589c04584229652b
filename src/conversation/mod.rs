//! Conversation transcripts and the turn scheduler.
//!
//! A run takes a topic, an ordered roster of at least two [`Agent`]s and a
//! per-agent message count, and produces a [`Session`]: the transcript, the
//! run metadata and the analytics report.
//!
//! # Turn order
//!
//! Strict round-robin in roster order. For `n` agents and `m` messages per
//! agent the transcript has exactly `n * m` messages and message `k` is
//! spoken by agent `k % n`. Turns run one at a time because each prompt
//! carries the full prior transcript.

mod metadata;
mod orchestrator;
mod prompt;

pub use metadata::{
    ApiService, ClientInfo, MemorySnapshot, ModelService, PerformanceMetrics,
    PerformanceSnapshot, RequestHeaders, RequestSnapshot, RunMetadata, ServiceSnapshot,
    SystemSnapshot, WebsocketService,
};
pub use orchestrator::{ConversationOrchestrator, RunRequest};
pub use prompt::{strip_agent_prefix, turn_prompt};

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::analytics::AnalyticsReport;

/// One agent's contribution to a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Speaker, by name
    pub agent_name: String,
    /// Cleaned message body
    pub content: String,
    /// Emission time
    pub timestamp: DateTime<Utc>,
    /// Run metadata on the first message of records written before
    /// [`Session::run_metadata`] existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RunMetadata>,
}

impl Message {
    /// New message without legacy metadata.
    pub fn new(agent_name: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            agent_name: agent_name.into(),
            content: content.into(),
            timestamp,
            metadata: None,
        }
    }
}

/// Persisted record of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Archive id, assigned at save time
    #[serde(default)]
    pub id: String,
    /// Conversation topic
    pub topic: String,
    /// Roster snapshot
    pub agents: Vec<Agent>,
    /// Transcript in emission order
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Environment facts captured for the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_metadata: Option<RunMetadata>,
    /// Post-hoc report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsReport>,
}

impl Session {
    /// Run metadata, falling back to the legacy first-message location.
    pub fn metadata(&self) -> Option<&RunMetadata> {
        self.run_metadata
            .as_ref()
            .or_else(|| self.messages.first().and_then(|m| m.metadata.as_ref()))
    }

    /// Number of distinct speakers in the transcript.
    pub fn active_agents(&self) -> usize {
        self.messages
            .iter()
            .map(|m| m.agent_name.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Body of `POST /conversation`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRequest {
    /// Topic
    #[serde(default)]
    pub topic: String,
    /// Messages each agent contributes
    #[serde(default)]
    pub messages_per_agent: usize,
    /// Roster, in speaking order
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Client facts reported by the caller
    #[serde(default)]
    pub system_info: Option<ClientInfo>,
}
