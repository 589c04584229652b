//! Diagnostic log scripts shown before the transcript.

use std::time::Duration;

use rand::Rng;

use super::engine::{PlaybackEvent, Service, Step};
use super::pacing::Pacing;
use super::view::{LogEntry, LogLevel};
use crate::conversation::{ClientInfo, RunMetadata};
use crate::llm::ModelParams;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Facts the fresh script reports.
#[derive(Debug, Clone)]
pub struct FreshFacts {
    /// Client environment
    pub client: ClientInfo,
    /// Model parameters
    pub model: ModelParams,
    /// Synthetic websocket connection id
    pub connection_id: String,
    /// Synthetic websocket latency, ms
    pub websocket_latency: u64,
    /// Synthetic API latency, ms
    pub api_latency: u64,
}

impl FreshFacts {
    /// Facts recorded in run metadata.
    pub fn from_metadata(metadata: &RunMetadata) -> Self {
        let model = &metadata.services.model;
        Self {
            client: metadata.system.client.clone(),
            model: ModelParams {
                model: model.model.clone(),
                version: model.version.clone(),
                context_window: model.context_window.clone(),
                temperature: model.temperature,
            },
            connection_id: metadata.services.websocket.connection_id.clone(),
            websocket_latency: metadata.services.websocket.latency,
            api_latency: metadata.services.api.latency,
        }
    }

    /// Synthetic facts drawn from `rng`.
    pub fn synthetic<R: Rng>(client: ClientInfo, model: ModelParams, rng: &mut R) -> Self {
        Self {
            client,
            model,
            connection_id: (0..9)
                .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
                .collect(),
            websocket_latency: rng.gen_range(20..=70),
            api_latency: rng.gen_range(50..=150),
        }
    }
}

/// Collects steps with the delay that follows each.
struct Script<'a> {
    pacing: &'a Pacing,
    steps: Vec<Step>,
}

impl<'a> Script<'a> {
    fn new(pacing: &'a Pacing) -> Self {
        Self {
            pacing,
            steps: Vec::new(),
        }
    }

    fn push(&mut self, event: PlaybackEvent, delay: Duration) {
        self.steps.push(Step { event, delay });
    }

    fn log(&mut self, level: LogLevel, message: &str, details: Option<String>, delay: Duration) {
        self.push(PlaybackEvent::Log(LogEntry::new(level, message, details)), delay);
    }

    fn info(&mut self, message: &str, details: impl Into<String>, delay: Duration) {
        self.log(LogLevel::Info, message, Some(details.into()), delay);
    }

    fn line(&self) -> Duration {
        self.pacing.line()
    }

    fn section(&self) -> Duration {
        self.pacing.section()
    }
}

fn or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "Unknown"
    } else {
        value
    }
}

/// Full environment and connection sequence for a newly created session.
pub fn fresh_script(facts: &FreshFacts, active_agents: usize, pacing: &Pacing) -> Vec<Step> {
    let mut s = Script::new(pacing);
    let zero = Duration::ZERO;
    let client = &facts.client;

    s.info("Initializing System...", "Collecting environment data", s.section());
    s.info("System Platform", or_unknown(&client.platform), s.line());
    s.info(
        "CPU Cores",
        format!(
            "{} logical processors",
            client.cores.map_or_else(|| "Unknown".to_string(), |c| c.to_string())
        ),
        s.line(),
    );
    s.info("Memory", or_unknown(&client.memory), s.line());
    s.info("Network", format!("{} connection", or_unknown(&client.connection)), s.line());
    s.info("Browser", or_unknown(&client.user_agent), s.line());
    s.info("Language", or_unknown(&client.language), s.section());

    s.log(LogLevel::Info, "Establishing WebSocket connection...", None, pacing.connect());
    s.push(PlaybackEvent::ServiceConnected(Service::Websocket), zero);
    s.log(
        LogLevel::Success,
        "WebSocket connection established",
        Some(format!("Connection ID: {}", facts.connection_id)),
        zero,
    );
    s.info("WebSocket Protocol", "wss (Secure WebSocket)", zero);
    s.info("WebSocket Latency", format!("{}ms", facts.websocket_latency), s.section());

    s.log(LogLevel::Info, "Connecting to API endpoint...", None, pacing.connect());
    s.push(PlaybackEvent::ServiceConnected(Service::Api), zero);
    s.log(
        LogLevel::Success,
        "API connection successful",
        Some("Session initialized".to_string()),
        zero,
    );
    s.info("API Protocol", "HTTPS/2.0 (TLS 1.3)", zero);
    s.info("API Latency", format!("{}ms", facts.api_latency), s.section());

    s.log(LogLevel::Info, "Authenticating model service...", None, pacing.connect());
    s.push(PlaybackEvent::ServiceConnected(Service::Model), zero);
    s.log(
        LogLevel::Success,
        "Model service authenticated",
        Some(facts.model.model.clone()),
        zero,
    );
    s.info("Model Version", facts.model.version.clone(), zero);
    s.info("Context Window", facts.model.context_window.clone(), zero);
    s.info("Temperature", facts.model.temperature.to_string(), s.section());

    s.info("Performance Mode", or_unknown(&client.performance_mode), zero);
    s.info("Rendering Engine", or_unknown(&client.rendering_engine), zero);
    s.info("WebGL Status", or_unknown(&client.webgl), s.section());

    s.log(LogLevel::Info, "Initializing conversation environment...", None, s.section());
    s.log(
        LogLevel::Success,
        "System ready",
        Some(format!("Active agents: {active_agents}")),
        zero,
    );
    s.steps
}

/// Compressed replay of stored metadata for a session loaded from the
/// archive, ending with every service connected at once.
pub fn restored_script(
    session_id: &str,
    metadata: Option<&RunMetadata>,
    message_count: usize,
    active_agents: usize,
    pacing: &Pacing,
) -> Vec<Step> {
    let mut s = Script::new(pacing);
    let zero = Duration::ZERO;

    s.info("Initializing System...", "Loading session data", s.section());

    match metadata {
        Some(meta) => {
            let system = &meta.system;
            let services = &meta.services;
            s.info(
                "System Platform",
                format!("{} {}", system.platform, system.release).trim().to_string(),
                s.line(),
            );
            s.info("Architecture", system.arch.clone(), s.line());
            s.info("CPU", format!("{} cores", system.cpus), s.line());
            s.info(
                "Memory",
                format!("{}GB Total", (system.memory.total as f64 / 1_073_741_824.0).round()),
                s.line(),
            );
            s.info("Client Platform", or_unknown(&system.client.platform), s.line());
            s.info("Browser", or_unknown(&system.client.user_agent), s.line());
            s.info("Language", or_unknown(&system.client.language), s.line());
            s.info(
                "WebSocket",
                format!("{} ({}ms)", services.websocket.protocol, services.websocket.latency),
                s.line(),
            );
            s.info(
                "API",
                format!("{} ({}ms)", services.api.protocol, services.api.latency),
                s.line(),
            );
            s.info(
                "Model",
                format!("{} ({})", services.model.model, services.model.version),
                s.line(),
            );
            s.info(
                "Processing Time",
                format!("{}ms total", meta.performance.total_processing_time),
                zero,
            );
            s.info(
                "Average Latency",
                format!("{}ms per message", meta.performance.metrics.average_latency),
                s.section(),
            );
        },
        None => {
            s.log(
                LogLevel::Warning,
                "Session metadata unavailable",
                Some("Diagnostics skipped".to_string()),
                s.section(),
            );
        },
    }

    s.push(PlaybackEvent::AllServicesConnected, zero);
    s.log(
        LogLevel::Success,
        "Session restored",
        Some(format!("ID: {session_id}")),
        zero,
    );
    s.log(
        LogLevel::Success,
        "Messages ready",
        Some(format!("Count: {message_count}")),
        zero,
    );
    s.log(
        LogLevel::Success,
        "System ready",
        Some(format!("Active agents: {active_agents}")),
        zero,
    );
    s.steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn messages(steps: &[Step]) -> Vec<String> {
        steps
            .iter()
            .filter_map(|s| match &s.event {
                PlaybackEvent::Log(entry) => Some(entry.message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fresh_connects_services_in_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let facts = FreshFacts::synthetic(ClientInfo::default(), ModelParams::default(), &mut rng);
        let steps = fresh_script(&facts, 2, &Pacing::default());

        let connected: Vec<Service> = steps
            .iter()
            .filter_map(|s| match s.event {
                PlaybackEvent::ServiceConnected(svc) => Some(svc),
                _ => None,
            })
            .collect();
        assert_eq!(connected, vec![Service::Websocket, Service::Api, Service::Model]);

        let lines = messages(&steps);
        assert_eq!(lines.first().map(String::as_str), Some("Initializing System..."));
        assert_eq!(lines.last().map(String::as_str), Some("System ready"));
        assert!((20..=70).contains(&facts.websocket_latency));
    }

    #[test]
    fn test_restored_ends_with_ready_lines() {
        let steps = restored_script("session_1", None, 4, 2, &Pacing::default());
        let lines = messages(&steps);
        assert_eq!(
            &lines[lines.len() - 3..],
            &["Session restored", "Messages ready", "System ready"]
        );
        assert!(steps
            .iter()
            .any(|s| matches!(s.event, PlaybackEvent::AllServicesConnected)));
    }
}
