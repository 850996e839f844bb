//! Error types for the orchestrator.

use thiserror::Error;

/// Orchestrator-specific errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A pipeline run is already in flight on this session.
    #[error("A pipeline run is already in progress")]
    Busy,

    /// Query was empty after trimming.
    #[error("Query is empty")]
    EmptyQuery,

    /// Preference name is not recognised.
    #[error("Unknown preference: {0}")]
    UnknownPreference(String),

    /// Agent configuration error.
    #[error("Agent error: {0}")]
    Agent(#[from] workiron_agent::AgentError),

    /// Persistence error.
    #[error("Persistence error: {0}")]
    Persistence(#[from] workiron_persistence::PersistenceError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
