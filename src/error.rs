//! Agent Lab error types.
//!
//! # Error Classification
//!
//! Every failure the core can produce falls into one of these kinds:
//!
//! - **Validation**: the caller asked for something the domain forbids
//!   (empty topic, fewer than two agents, zero messages per agent).
//! - **Generation**: the message/profile capability failed or returned
//!   something unusable. Fatal to the whole run.
//! - **NotFound**: an unknown session id. This is an expected outcome, not an
//!   internal failure, and maps to HTTP 404.
//! - **Storage**: transport, auth or serialization trouble talking to the
//!   object store.
//! - **MalformedRecord**: a stored object exists but does not parse as a
//!   session.
//!
//! Only a short human-readable message ever crosses the HTTP boundary; the
//! `Display` text of these variants is logged server-side.

use thiserror::Error;

/// Agent Lab errors.
#[derive(Error, Debug)]
pub enum LabError {
    /// Request rejected before any work was done.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The generation capability errored, timed out or returned garbage.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// No record stored under the requested id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object store unavailable or rejected the request.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored payload could not be decoded.
    #[error("Malformed record {key}: {reason}")]
    MalformedRecord {
        /// Object key of the offending record.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Server-side error (bind, serve).
    #[error("Server error: {0}")]
    Server(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LabError {
    /// True for the expected "unknown id" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LabError::NotFound(_))
    }

    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        LabError::Validation(msg.into())
    }
}

/// Result type alias for Agent Lab operations
pub type Result<T> = std::result::Result<T, LabError>;

impl From<reqwest::Error> for LabError {
    fn from(err: reqwest::Error) -> Self {
        LabError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for LabError {
    fn from(err: toml::de::Error) -> Self {
        LabError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinct() {
        assert!(LabError::NotFound("session_1".into()).is_not_found());
        assert!(!LabError::Storage("timeout".into()).is_not_found());
        assert!(!LabError::MalformedRecord {
            key: "session_1.json".into(),
            reason: "EOF".into()
        }
        .is_not_found());
    }

    #[test]
    fn test_display_carries_detail() {
        let err = LabError::MalformedRecord {
            key: "session_7.json".into(),
            reason: "expected value at line 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed record session_7.json: expected value at line 1"
        );
    }
}
