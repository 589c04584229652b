//! Run metadata: environment facts captured once per run.
//!
//! Purely observational. Nothing here influences scheduling; the playback
//! engine replays it as a compressed diagnostic log when a session is
//! restored from the archive.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::llm::ModelParams;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Facts about the client that started the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientInfo {
    /// Client OS / platform string
    pub platform: String,
    /// User agent
    pub user_agent: String,
    /// Preferred language
    pub language: String,
    /// Logical processors
    pub cores: Option<u32>,
    /// Memory description, e.g. `4096MB`
    pub memory: String,
    /// Network type, e.g. `4g`
    pub connection: String,
    /// Graphics capability flag
    pub webgl: String,
    /// Rendering engine label
    pub rendering_engine: String,
    /// Performance mode label
    pub performance_mode: String,
}

impl ClientInfo {
    /// Describe the local machine, for runs started from the command line.
    pub fn local() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        Self {
            platform: std::env::consts::OS.to_string(),
            user_agent: format!("agentlab/{}", crate::VERSION),
            language: std::env::var("LANG")
                .ok()
                .and_then(|l| l.split('.').next().map(|s| s.replace('_', "-")))
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| "en-US".to_string()),
            cores: std::thread::available_parallelism()
                .ok()
                .map(|n| n.get() as u32),
            memory: format!("{}MB", sys.total_memory() / 1024 / 1024),
            connection: "Unknown".to_string(),
            webgl: "Disabled".to_string(),
            rendering_engine: "Terminal".to_string(),
            performance_mode: "High Performance".to_string(),
        }
    }
}

/// Host memory in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySnapshot {
    /// Total memory
    pub total: u64,
    /// Free memory
    pub free: u64,
}

/// Server host facts plus the client facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemSnapshot {
    /// OS family
    pub platform: String,
    /// Kernel release
    pub release: String,
    /// CPU architecture
    pub arch: String,
    /// Logical CPU count
    pub cpus: usize,
    /// Memory totals
    pub memory: MemorySnapshot,
    /// Host uptime in seconds
    pub uptime: u64,
    /// Client-side facts
    pub client: ClientInfo,
}

impl SystemSnapshot {
    /// Collect host facts.
    pub fn collect(client: ClientInfo) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        Self {
            platform: std::env::consts::OS.to_string(),
            release: System::kernel_version().unwrap_or_default(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism().map_or(1, |n| n.get()),
            memory: MemorySnapshot {
                total: sys.total_memory(),
                free: sys.available_memory(),
            },
            uptime: System::uptime(),
            client,
        }
    }
}

/// Selected request headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestHeaders {
    /// `accept`
    pub accept: Option<String>,
    /// `accept-language`
    pub language: Option<String>,
    /// `accept-encoding`
    pub encoding: Option<String>,
    /// `connection`
    pub connection: Option<String>,
}

/// Facts about the request that started the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    /// Client address, when known
    #[serde(default)]
    pub ip: Option<String>,
    /// User agent header
    #[serde(default)]
    pub user_agent: Option<String>,
    /// When the request arrived
    pub timestamp: DateTime<Utc>,
    /// Protocol label
    #[serde(default)]
    pub protocol: String,
    /// Whether the transport was encrypted
    #[serde(default)]
    pub secure: bool,
    /// Selected headers
    #[serde(default)]
    pub headers: RequestHeaders,
}

impl RequestSnapshot {
    /// Snapshot for a run started locally, without any HTTP request.
    pub fn local() -> Self {
        Self {
            ip: None,
            user_agent: Some(format!("agentlab/{}", crate::VERSION)),
            timestamp: Utc::now(),
            protocol: "cli".to_string(),
            secure: false,
            headers: RequestHeaders::default(),
        }
    }
}

/// Simulated websocket channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebsocketService {
    /// Protocol label
    pub protocol: String,
    /// Synthetic latency in ms
    pub latency: u64,
    /// Synthetic connection id
    pub connection_id: String,
    /// Status label
    pub status: String,
}

/// Simulated API channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiService {
    /// Protocol label
    pub protocol: String,
    /// TLS version label
    pub tls: String,
    /// Synthetic latency in ms
    pub latency: u64,
    /// Status label
    pub status: String,
}

/// Model service facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelService {
    /// Model identifier
    pub model: String,
    /// Version label
    pub version: String,
    /// Context window label
    pub context_window: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Status label
    pub status: String,
}

/// The three simulated services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSnapshot {
    /// Websocket channel
    pub websocket: WebsocketService,
    /// API channel
    pub api: ApiService,
    /// Model service
    #[serde(alias = "openai")]
    pub model: ModelService,
}

/// Derived performance figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceMetrics {
    /// Time between capture and the first turn, ms
    pub initialization_time: u64,
    /// Time spent generating messages, ms
    pub message_processing_time: u64,
    /// Mean time per turn, ms
    pub average_latency: u64,
}

/// Timing of the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceSnapshot {
    /// Capture time, unix ms
    pub start_time: i64,
    /// Per-turn generation times, ms
    pub message_generation_times: Vec<u64>,
    /// Wall time of the whole run, ms
    pub total_processing_time: u64,
    /// Derived figures
    pub metrics: PerformanceMetrics,
}

/// Snapshot of environment and service facts for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Host and client facts
    pub system: SystemSnapshot,
    /// Request facts
    pub request: RequestSnapshot,
    /// Simulated services
    pub services: ServiceSnapshot,
    /// Timing
    #[serde(default)]
    pub performance: PerformanceSnapshot,
}

impl RunMetadata {
    /// Capture metadata at the start of a run.
    pub fn capture<R: Rng>(
        client: ClientInfo,
        request: RequestSnapshot,
        model: &ModelParams,
        rng: &mut R,
    ) -> Self {
        Self::with_system(SystemSnapshot::collect(client), request, model, rng)
    }

    /// Same as [`RunMetadata::capture`] with an explicit host snapshot.
    pub fn with_system<R: Rng>(
        system: SystemSnapshot,
        request: RequestSnapshot,
        model: &ModelParams,
        rng: &mut R,
    ) -> Self {
        let connection_id: String = (0..9)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();

        Self {
            system,
            request,
            services: ServiceSnapshot {
                websocket: WebsocketService {
                    protocol: "wss".to_string(),
                    latency: rng.gen_range(20..=70),
                    connection_id,
                    status: "connected".to_string(),
                },
                api: ApiService {
                    protocol: "HTTPS/2.0".to_string(),
                    tls: "1.3".to_string(),
                    latency: rng.gen_range(50..=150),
                    status: "ready".to_string(),
                },
                model: ModelService {
                    model: model.model.clone(),
                    version: model.version.clone(),
                    context_window: model.context_window.clone(),
                    temperature: model.temperature,
                    status: "authenticated".to_string(),
                },
            },
            performance: PerformanceSnapshot {
                start_time: Utc::now().timestamp_millis(),
                ..PerformanceSnapshot::default()
            },
        }
    }

    /// Record the generation time of one turn.
    pub fn record_turn(&mut self, millis: u64) {
        self.performance.message_generation_times.push(millis);
    }

    /// Close out timing once every turn has been generated.
    pub fn finish(&mut self, initialization_ms: u64, total_ms: u64) {
        let turns = self.performance.message_generation_times.len() as u64;
        let generation: u64 = self.performance.message_generation_times.iter().sum();

        self.performance.total_processing_time = total_ms;
        self.performance.metrics = PerformanceMetrics {
            initialization_time: initialization_ms,
            message_processing_time: generation,
            average_latency: if turns == 0 { 0 } else { total_ms / turns },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn metadata(seed: u64) -> RunMetadata {
        let mut rng = StdRng::seed_from_u64(seed);
        RunMetadata::with_system(
            SystemSnapshot::default(),
            RequestSnapshot::local(),
            &ModelParams::default(),
            &mut rng,
        )
    }

    #[test]
    fn test_synthetic_latencies_in_range() {
        for seed in 0..32 {
            let meta = metadata(seed);
            assert!((20..=70).contains(&meta.services.websocket.latency));
            assert!((50..=150).contains(&meta.services.api.latency));
            assert_eq!(meta.services.websocket.connection_id.len(), 9);
        }
    }

    #[test]
    fn test_finish_computes_average() {
        let mut meta = metadata(1);
        meta.record_turn(100);
        meta.record_turn(300);
        meta.finish(5, 420);
        assert_eq!(meta.performance.total_processing_time, 420);
        assert_eq!(meta.performance.metrics.message_processing_time, 400);
        assert_eq!(meta.performance.metrics.average_latency, 210);
        assert_eq!(meta.performance.metrics.initialization_time, 5);
    }

    #[test]
    fn test_legacy_openai_key_is_read() {
        let json = serde_json::json!({
            "websocket": {"protocol": "wss", "latency": 30, "connectionId": "abc", "status": "connected"},
            "api": {"protocol": "HTTPS/2.0", "tls": "1.3", "latency": 80, "status": "ready"},
            "openai": {"model": "gpt-4", "version": "Latest", "contextWindow": "8K tokens",
                       "temperature": 0.7, "status": "authenticated"}
        });
        let services: ServiceSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(services.model.model, "gpt-4");
        assert_eq!(services.model.context_window, "8K tokens");
    }
}
