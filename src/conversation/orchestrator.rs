//! Sequential round-robin turn scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::metadata::{ClientInfo, RequestSnapshot, RunMetadata};
use super::prompt::{strip_agent_prefix, turn_prompt};
use super::{Message, Session};
use crate::agent::{validate_roster, Agent};
use crate::analytics::AnalyticsEngine;
use crate::archive::SessionArchive;
use crate::error::{LabError, Result};
use crate::llm::{MessageGenerator, Prompt};

/// Input to one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Conversation topic
    pub topic: String,
    /// Roster in speaking order
    pub agents: Vec<Agent>,
    /// Messages each agent contributes
    pub messages_per_agent: usize,
    /// Client facts for the run metadata
    pub client: ClientInfo,
    /// Request facts for the run metadata
    pub request: RequestSnapshot,
}

impl RunRequest {
    /// Run started from this machine.
    pub fn new(topic: impl Into<String>, agents: Vec<Agent>, messages_per_agent: usize) -> Self {
        Self {
            topic: topic.into(),
            agents,
            messages_per_agent,
            client: ClientInfo::local(),
            request: RequestSnapshot::local(),
        }
    }

    /// Replace the client facts.
    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Replace the request facts.
    pub fn with_request(mut self, request: RequestSnapshot) -> Self {
        self.request = request;
        self
    }
}

/// Drives turn-taking, scores the result and hands it to the archive.
pub struct ConversationOrchestrator {
    generator: Arc<dyn MessageGenerator>,
    archive: Arc<SessionArchive>,
    analytics: AnalyticsEngine,
    turn_timeout: Option<Duration>,
    max_messages_per_agent: Option<usize>,
}

impl ConversationOrchestrator {
    /// Orchestrator with no turn timeout and no per-agent cap.
    pub fn new(generator: Arc<dyn MessageGenerator>, archive: Arc<SessionArchive>) -> Self {
        Self {
            generator,
            archive,
            analytics: AnalyticsEngine::new(),
            turn_timeout: None,
            max_messages_per_agent: None,
        }
    }

    /// Fail a turn that takes longer than `timeout`.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    /// Reject runs asking for more than `max` messages per agent.
    pub fn with_max_messages_per_agent(mut self, max: usize) -> Self {
        self.max_messages_per_agent = Some(max);
        self
    }

    /// The archive runs are saved to.
    pub fn archive(&self) -> &Arc<SessionArchive> {
        &self.archive
    }

    fn validate(&self, request: &RunRequest) -> Result<()> {
        if request.topic.trim().is_empty() {
            return Err(LabError::validation("topic must not be empty"));
        }
        if request.messages_per_agent == 0 {
            return Err(LabError::validation("messagesPerAgent must be at least 1"));
        }
        if let Some(max) = self.max_messages_per_agent {
            if request.messages_per_agent > max {
                return Err(LabError::validation(format!(
                    "messagesPerAgent must be at most {max}"
                )));
            }
        }
        validate_roster(&request.agents)
    }

    /// Produce the transcript and analytics without saving.
    ///
    /// Any failed turn fails the whole run.
    pub async fn simulate(&self, request: RunRequest) -> Result<Session> {
        self.validate(&request)?;

        let started = Instant::now();
        let created_at = Utc::now();
        let RunRequest {
            topic,
            agents,
            messages_per_agent,
            client,
            request,
        } = request;

        let mut metadata = {
            let mut rng = rand::thread_rng();
            RunMetadata::capture(client, request, &self.generator.model_params(), &mut rng)
        };
        let initialization_ms = started.elapsed().as_millis() as u64;

        let total = agents.len() * messages_per_agent;
        tracing::info!(
            topic = %topic,
            agents = agents.len(),
            messages_per_agent,
            total,
            "conversation started"
        );

        let mut messages: Vec<Message> = Vec::with_capacity(total);
        for turn in 0..total {
            let speaker = &agents[turn % agents.len()];
            let prompt = turn_prompt(&topic, speaker, &agents, &messages, turn);

            let turn_started = Instant::now();
            let raw = self.generate(&prompt).await.map_err(|e| {
                tracing::warn!(turn, agent = %speaker.name, error = %e, "turn failed");
                match e {
                    LabError::Generation(_) => e,
                    other => LabError::Generation(other.to_string()),
                }
            })?;
            let elapsed = turn_started.elapsed().as_millis() as u64;

            let content = strip_agent_prefix(&raw, &speaker.name);
            if content.is_empty() {
                tracing::warn!(turn, agent = %speaker.name, "empty message after cleaning");
                return Err(LabError::Generation(format!(
                    "empty message for {} at turn {turn}",
                    speaker.name
                )));
            }

            // Emission order defines transcript order; timestamps only need
            // to be non-decreasing.
            let mut timestamp = Utc::now();
            if let Some(last) = messages.last() {
                timestamp = timestamp.max(last.timestamp);
            }

            metadata.record_turn(elapsed);
            tracing::debug!(turn, agent = %speaker.name, chars = content.len(), elapsed_ms = elapsed, "turn generated");
            messages.push(Message::new(speaker.name.clone(), content, timestamp));
        }

        metadata.finish(initialization_ms, started.elapsed().as_millis() as u64);
        let analytics = self.analytics.analyze(&topic, &agents, &messages);

        tracing::info!(
            topic = %topic,
            messages = messages.len(),
            elapsed_ms = metadata.performance.total_processing_time,
            "conversation finished"
        );

        Ok(Session {
            id: String::new(),
            topic,
            agents,
            messages,
            timestamp: created_at,
            run_metadata: Some(metadata),
            analytics: Some(analytics),
        })
    }

    /// Simulate and save. The archive is written once, after every turn
    /// succeeded.
    pub async fn run(&self, request: RunRequest) -> Result<Session> {
        let mut session = self.simulate(request).await?;
        self.archive.save(&mut session).await?;
        Ok(session)
    }

    /// Like [`ConversationOrchestrator::run`], but a retry carrying the same
    /// `key` returns the session saved by the first attempt.
    pub async fn run_idempotent(&self, key: &str, request: RunRequest) -> Result<Session> {
        if let Some(existing) = self.archive.find_by_idempotency_key(key).await? {
            tracing::info!(key, id = %existing.id, "idempotent replay");
            return Ok(existing);
        }

        let session = self.run(request).await?;
        if !self.archive.remember_idempotency_key(key, &session.id).await? {
            tracing::warn!(key, id = %session.id, "idempotency key claimed concurrently");
        }
        Ok(session)
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let call = self.generator.complete(prompt);
        match self.turn_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| LabError::Generation(format!("turn timed out after {limit:?}")))?,
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_agent;
    use crate::archive::MemoryStore;
    use crate::llm::{ModelParams, ScriptedGenerator};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator(generator: Arc<dyn MessageGenerator>) -> ConversationOrchestrator {
        let archive = Arc::new(SessionArchive::new(Arc::new(MemoryStore::new())));
        ConversationOrchestrator::new(generator, archive)
    }

    fn roster(names: &[&str]) -> Vec<Agent> {
        names.iter().map(|n| test_agent(n)).collect()
    }

    /// Fails on the given turn.
    struct FailingGenerator {
        fail_at: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageGenerator for FailingGenerator {
        async fn complete(&self, _prompt: &Prompt) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_at {
                Err(LabError::Network("connection reset".into()))
            } else {
                Ok(format!("message {n}"))
            }
        }

        fn model_params(&self) -> ModelParams {
            ModelParams::default()
        }
    }

    #[tokio::test]
    async fn test_round_robin_shape() {
        let orch = orchestrator(Arc::new(ScriptedGenerator::new(5)));
        let session = orch
            .simulate(RunRequest::new("Space", roster(&["Ada", "Grace", "Linus"]), 2))
            .await
            .unwrap();

        let speakers: Vec<&str> = session.messages.iter().map(|m| m.agent_name.as_str()).collect();
        assert_eq!(speakers, vec!["Ada", "Grace", "Linus", "Ada", "Grace", "Linus"]);
        assert!(session
            .messages
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(session.messages.iter().all(|m| !m.content.starts_with(&format!("{}:", m.agent_name))));
        assert_eq!(
            session.run_metadata.as_ref().unwrap().performance.message_generation_times.len(),
            6
        );
        assert!(session.analytics.is_some());
        assert!(session.id.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let orch = orchestrator(Arc::new(ScriptedGenerator::new(0))).with_max_messages_per_agent(10);
        for request in [
            RunRequest::new("", roster(&["Ada", "Grace"]), 1),
            RunRequest::new("Space", roster(&["Ada"]), 1),
            RunRequest::new("Space", roster(&["Ada", "Grace"]), 0),
            RunRequest::new("Space", roster(&["Ada", "Grace"]), 11),
        ] {
            let err = orch.simulate(request).await.unwrap_err();
            assert!(matches!(err, LabError::Validation(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn test_failed_turn_persists_nothing() {
        let orch = orchestrator(Arc::new(FailingGenerator {
            fail_at: 2,
            calls: AtomicUsize::new(0),
        }));
        let err = orch
            .run(RunRequest::new("Space", roster(&["Ada", "Grace"]), 2))
            .await
            .unwrap_err();
        assert!(matches!(err, LabError::Generation(_)));

        let page = orch.archive().list_page(None).await.unwrap();
        assert!(page.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_run_saves_once() {
        let orch = orchestrator(Arc::new(ScriptedGenerator::new(2)));
        let session = orch
            .run(RunRequest::new("Space", roster(&["Ada", "Grace"]), 1))
            .await
            .unwrap();
        assert!(session.id.starts_with("session_"));

        let stored = orch.archive().get(&session.id).await.unwrap();
        assert_eq!(stored, session);
    }

    #[tokio::test]
    async fn test_idempotent_retry_returns_first_session() {
        let orch = orchestrator(Arc::new(ScriptedGenerator::new(2)));
        let request = RunRequest::new("Space", roster(&["Ada", "Grace"]), 1);

        let first = orch.run_idempotent("retry-1", request.clone()).await.unwrap();
        let second = orch.run_idempotent("retry-1", request).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(orch.archive().list_page(None).await.unwrap().sessions.len(), 1);
    }
}
