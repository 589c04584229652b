//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::config::Config;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub addr: SocketAddr,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Enable request logging
    pub logging: bool,
    /// CORS enabled
    pub cors_enabled: bool,
    /// Upper bound on `messagesPerAgent`
    pub max_messages_per_agent: Option<usize>,
    /// Per-turn generation timeout
    pub turn_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3001),
            max_body_size: 2 * 1024 * 1024, // 2MB
            logging: true,
            cors_enabled: true,
            max_messages_per_agent: None,
            turn_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Derive from the `[server]` and `[conversation]` sections.
    ///
    /// An unparseable host falls back to localhost.
    pub fn from_config(config: &Config) -> Self {
        let ip = config.server.host.parse().unwrap_or_else(|_| {
            tracing::warn!(host = %config.server.host, "invalid host, binding to localhost");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });

        let mut server = Self::default()
            .with_addr(SocketAddr::new(ip, config.server.port))
            .with_max_body_size(config.server.max_body_size);
        if !config.server.cors {
            server = server.without_cors();
        }
        if !config.server.request_logging {
            server = server.without_logging();
        }
        server.max_messages_per_agent = config.conversation.max_messages_per_agent;
        server.turn_timeout = config.conversation.turn_timeout_secs.map(Duration::from_secs);
        server
    }

    /// Create with custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Bind to all interfaces
    pub fn bind_all(mut self) -> Self {
        self.addr.set_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        self
    }

    /// Set address directly
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Set max body size
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Cap `messagesPerAgent`
    pub fn with_max_messages_per_agent(mut self, max: usize) -> Self {
        self.max_messages_per_agent = Some(max);
        self
    }

    /// Set per-turn generation timeout
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    /// Disable logging
    pub fn without_logging(mut self) -> Self {
        self.logging = false;
        self
    }

    /// Disable CORS
    pub fn without_cors(mut self) -> Self {
        self.cors_enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ServerConfig::default().with_port(8080).bind_all().without_cors();
        assert_eq!(config.addr.to_string(), "0.0.0.0:8080");
        assert!(!config.cors_enabled);
        assert!(config.logging);
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.server.host = "not-an-ip".to_string();
        config.server.port = 4000;
        config.conversation.turn_timeout_secs = Some(30);

        let server = ServerConfig::from_config(&config);
        assert_eq!(server.addr.to_string(), "127.0.0.1:4000");
        assert_eq!(server.turn_timeout, Some(Duration::from_secs(30)));
        assert_eq!(server.max_messages_per_agent, None);
    }
}
