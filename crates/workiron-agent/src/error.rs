//! Error types for the agent crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while editing agent configuration.
#[derive(Error, Debug, PartialEq)]
pub enum AgentError {
    /// Field name is not an agent attribute.
    #[error("unknown agent field: {0}")]
    UnknownField(String),

    /// Value could not be parsed for the field.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue {
        /// Field being updated.
        field: String,
        /// Raw value supplied.
        value: String,
    },
}

/// Result type for agent configuration operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised by the completion protocol.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    /// Request never reached the provider or the connection broke.
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status.
    #[error("provider error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the provider.
        message: String,
    },

    /// The conversation thread no longer exists on the provider side.
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// Provider reported the run as failed.
    #[error("run {run_id} failed: {reason}")]
    RunFailed {
        /// Run that failed.
        run_id: String,
        /// Failure reason reported by the provider.
        reason: String,
    },

    /// Run did not reach a terminal status within the poll budget.
    #[error("run {run_id} still pending after {attempts} polls")]
    Timeout {
        /// Run being polled.
        run_id: String,
        /// Number of status polls made.
        attempts: u32,
    },

    /// Run completed but the thread holds no text reply.
    #[error("run completed without a text response")]
    EmptyResponse,

    /// Provider response body could not be decoded.
    #[error("failed to parse provider response: {0}")]
    Parse(String),

    /// Client is missing required configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CompletionError {
    /// Coarse classification used in pipeline results.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RunFailed { .. } => FailureKind::RunFailed,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::EmptyResponse => FailureKind::EmptyResponse,
            Self::Transport(_)
            | Self::Api { .. }
            | Self::ThreadNotFound(_)
            | Self::Parse(_)
            | Self::Configuration(_) => FailureKind::Transport,
        }
    }
}

/// Kind of per-agent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Provider unreachable or returned an unusable answer.
    Transport,
    /// Provider reported the run as failed.
    RunFailed,
    /// Poll budget exhausted.
    Timeout,
    /// Run completed with no text.
    EmptyResponse,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::RunFailed => write!(f, "run_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::EmptyResponse => write!(f, "empty_response"),
        }
    }
}
