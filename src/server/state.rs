//! Server state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::ServerConfig;
use crate::agent::AgentFactory;
use crate::archive::SessionArchive;
use crate::conversation::ConversationOrchestrator;
use crate::llm::MessageGenerator;

/// Application state shared across handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Session archive
    pub archive: Arc<SessionArchive>,
    /// Runs experiments
    pub orchestrator: ConversationOrchestrator,
    /// Builds agents
    pub agents: AgentFactory,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServerConfig,
        generator: Arc<dyn MessageGenerator>,
        archive: Arc<SessionArchive>,
    ) -> Self {
        let mut orchestrator = ConversationOrchestrator::new(Arc::clone(&generator), Arc::clone(&archive));
        if let Some(timeout) = config.turn_timeout {
            orchestrator = orchestrator.with_turn_timeout(timeout);
        }
        if let Some(max) = config.max_messages_per_agent {
            orchestrator = orchestrator.with_max_messages_per_agent(max);
        }

        Self {
            config,
            archive,
            orchestrator,
            agents: AgentFactory::new(generator),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
