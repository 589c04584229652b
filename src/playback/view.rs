//! Display-only playback state.
//!
//! The view holds local copies of messages. Nothing here writes back to the
//! session or the archive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::engine::{PlaybackEvent, Service};
use crate::conversation::Message;

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational
    Info,
    /// Something is missing or degraded
    Warning,
    /// Something failed
    Error,
    /// A step succeeded
    Success,
}

/// Diagnostic line as produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity
    pub level: LogLevel,
    /// Headline
    pub message: String,
    /// Parenthesized detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// New entry.
    pub fn new(level: LogLevel, message: &str, details: Option<String>) -> Self {
        Self {
            level,
            message: message.to_string(),
            details,
        }
    }
}

/// A log entry stamped with the time it was displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedLog {
    /// The entry
    #[serde(flatten)]
    pub entry: LogEntry,
    /// Display time
    pub timestamp: DateTime<Utc>,
}

/// Connection indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Websocket channel up
    pub websocket: bool,
    /// API channel up
    pub api: bool,
    /// Model service up
    pub model: bool,
}

impl ConnectionStatus {
    /// Every service is up.
    pub fn all(&self) -> bool {
        self.websocket && self.api && self.model
    }
}

/// Everything a terminal needs to draw the current frame.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackView {
    /// Diagnostic lines, oldest first
    pub system_logs: Vec<StampedLog>,
    /// Messages on screen
    pub visible_messages: Vec<Message>,
    /// Connection indicators
    pub connection_status: ConnectionStatus,
    /// A message is being revealed
    pub is_typing: bool,
    /// The caller is still waiting for the server
    pub is_simulating: bool,
    /// Completion report, once received
    pub completed_at: Option<usize>,
}

impl PlaybackView {
    /// Empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one engine event; `now` stamps new log lines.
    pub fn apply(&mut self, event: &PlaybackEvent, now: DateTime<Utc>) {
        match event {
            PlaybackEvent::Log(entry) => self.system_logs.push(StampedLog {
                entry: entry.clone(),
                timestamp: now,
            }),
            PlaybackEvent::ServiceConnected(service) => match service {
                Service::Websocket => self.connection_status.websocket = true,
                Service::Api => self.connection_status.api = true,
                Service::Model => self.connection_status.model = true,
            },
            PlaybackEvent::AllServicesConnected => {
                self.connection_status = ConnectionStatus {
                    websocket: true,
                    api: true,
                    model: true,
                };
            },
            PlaybackEvent::MessageStarted {
                agent_name,
                timestamp,
                ..
            } => {
                self.is_typing = true;
                self.visible_messages
                    .push(Message::new(agent_name.clone(), String::new(), *timestamp));
            },
            PlaybackEvent::Reveal { text, .. } => {
                if let Some(last) = self.visible_messages.last_mut() {
                    last.content.clone_from(text);
                }
            },
            PlaybackEvent::MessageShown { message, .. } => {
                self.visible_messages.push(message.clone());
            },
            PlaybackEvent::MessageCompleted { .. } => self.is_typing = false,
            PlaybackEvent::Completed { index, .. } => {
                self.is_typing = false;
                self.completed_at = Some(*index);
            },
        }
    }

    /// Header badge.
    pub fn status_label(&self) -> &'static str {
        if self.connection_status.all() {
            "SYSTEM READY"
        } else {
            "INITIALIZING"
        }
    }

    /// Status bar activity label.
    pub fn processing_label(&self) -> &'static str {
        if self.is_typing {
            "PROCESSING"
        } else if self.is_simulating {
            "SIMULATING"
        } else {
            "READY"
        }
    }

    /// Distinct speakers among visible messages.
    pub fn active_agents(&self) -> usize {
        let mut names: Vec<&str> = self
            .visible_messages
            .iter()
            .map(|m| m.agent_name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }
}
