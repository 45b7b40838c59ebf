//! Top-level error type.

use flowhs_types::FlowId;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the daemon and its boundary.
#[derive(Debug, Error)]
pub enum FlowHsError {
    /// Malformed or unknown inbound message.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Another operation on the same flow is still running.
    #[error("Flow {0} has an operation in progress")]
    FlowInProgress(FlowId),

    /// The daemon no longer accepts requests.
    #[error("Daemon is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, FlowHsError>;
