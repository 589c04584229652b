//! Agent Lab HTTP server.
//!
//! Provides the JSON API used by the web front end:
//! - Session archive browsing (paginated)
//! - Agent creation (user-authored and random)
//! - Running a conversation and fetching its analysis
//!
//! # Example
//!
//! ```rust,ignore
//! use agentlab::server::{serve, AppState, ServerConfig};
//!
//! let config = ServerConfig::default().with_port(8080);
//! let state = Arc::new(AppState::new(config, generator, archive));
//! serve(state, std::future::pending()).await?;
//! ```

mod config;
mod handlers;
mod state;

use std::future::Future;
use std::sync::Arc;

pub use config::ServerConfig;
pub use handlers::{create_router, health_check, request_snapshot, IDEMPOTENCY_KEY};
pub use state::AppState;

use crate::error::{LabError, Result};

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn serve<F>(state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LabError::Server(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(%addr, backend = state.archive.backend(), "listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| LabError::Server(e.to_string()))
}
