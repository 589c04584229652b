//! # Agent Lab - Simulated Multi-Agent Conversations
//!
//! Runs structured conversations between persona-driven agents on a topic,
//! archives the resulting sessions, derives behavioral analytics, and replays
//! transcripts with terminal-style pacing.
//!
//! ## Features
//!
//! - **Round-robin orchestration**: `n` agents, `m` messages each, strictly
//!   sequential turns with the full prior transcript as context
//! - **Pluggable generation**: OpenAI-compatible endpoint or a deterministic
//!   scripted generator for offline runs
//! - **Session archive**: one JSON object per session on memory, filesystem
//!   or S3-compatible storage (Cloudflare R2 by default), paginated newest
//!   first
//! - **Analytics**: experiment metrics and per-agent behavior derived from
//!   the transcript
//! - **Playback**: a pure state machine that emits diagnostic lines and
//!   word-by-word reveals, driven by a tokio timer loop
//!
//! ## Architecture
//!
//! ```text
//!  POST /api/conversation
//!          │
//!          v
//!  ConversationOrchestrator ──> MessageGenerator (turn 0..n*m)
//!          │
//!          ├──> AnalyticsEngine ──> AnalyticsReport
//!          │
//!          v
//!  SessionArchive ──> ObjectStore (memory | fs | s3)
//!          │
//!          v
//!  GET /api/sessions/:id ──> PlaybackEngine (restored) ──> PlaybackView
//! ```
//!
//! ### Playback State Machine
//!
//! ```text
//!     [Idle] ──> [Diagnosing] ──> [Streaming(i)] ──> [Done]
//!                     │                 │
//!                     └──── cancel ─────┴──────────> [Cancelled]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use agentlab::archive::{MemoryStore, SessionArchive};
//! use agentlab::conversation::{ConversationOrchestrator, RunRequest};
//! use agentlab::llm::ScriptedGenerator;
//!
//! let archive = Arc::new(SessionArchive::new(Arc::new(MemoryStore::new())));
//! let orchestrator = ConversationOrchestrator::new(Arc::new(ScriptedGenerator::new(7)), archive);
//!
//! let session = orchestrator
//!     .run(RunRequest::new("Space", agents, 2))
//!     .await?;
//! assert_eq!(session.messages.len(), agents.len() * 2);
//! ```
//!
//! ## Modules
//!
//! - [`agent`]: Agent profiles and the agent factory
//! - [`conversation`]: Sessions, messages, run metadata and the orchestrator
//! - [`analytics`]: Transcript analysis
//! - [`archive`]: Object stores and the session archive
//! - [`playback`]: Paced replay state machine, driver and view
//! - [`llm`]: Message generation capability
//! - [`server`]: HTTP API server (Axum-based)
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod agent;
pub mod analytics;
pub mod archive;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod playback;
pub mod server;

// Re-exports for convenience
pub use agent::{Agent, AgentCreationOptions, AgentFactory};
pub use analytics::{AnalyticsEngine, AnalyticsReport};
pub use archive::{ObjectStore, SessionArchive, SessionPage};
pub use config::Config;
pub use conversation::{ConversationOrchestrator, Message, RunMetadata, RunRequest, Session};
pub use error::{LabError, Result};
pub use llm::{MessageGenerator, OpenAiGenerator, ScriptedGenerator};
pub use playback::{Pacing, PlaybackDriver, PlaybackEngine, PlaybackEvent, PlaybackView};
pub use server::{AppState, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
