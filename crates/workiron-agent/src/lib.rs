//! Agents and the completion provider for the WorkIron pipeline.
//!
//! # Overview
//!
//! - **Agents**: [`Agent`] records, the typed [`AgentField`] update and the
//!   ordered [`AgentRegistry`]
//! - **Provider boundary**: the job-based [`CompletionClient`] trait and its
//!   HTTP implementation [`AssistantsClient`]
//! - **Protocol**: [`CompletionProtocol`] drives create-worker, run, poll,
//!   fetch and cleanup under a bounded [`PollPolicy`]
//! - **Routing**: [`ComplexityClassifier`] decides whether a query needs the
//!   whole chain
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use workiron_agent::{AssistantsClient, CompletionProtocol, PollPolicy, WorkerSpec};
//!
//! let settings = workiron_core::Settings::from_env()?;
//! let client = Arc::new(AssistantsClient::from_settings(&settings)?);
//! let protocol = CompletionProtocol::new(client.clone(), PollPolicy::from_settings(&settings));
//!
//! let thread = client.create_thread().await?;
//! let reply = protocol.complete(&thread, &WorkerSpec::for_agent(&agent)).await?;
//! ```

pub mod agent;
pub mod classifier;
pub mod client;
pub mod completion;
pub mod error;
pub mod protocol;
pub mod registry;

pub use agent::{
    clamp_max_tokens, clamp_temperature, new_agent_id, Agent, AgentConfig, AgentField,
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, MAX_TEMPERATURE, MAX_TOKENS_LIMIT,
};
pub use classifier::{
    classify_locally, has_technical_term, Classification, ClassifierOverrides, Complexity,
    ComplexityClassifier, VerdictSource,
};
pub use client::AssistantsClient;
pub use completion::{
    CompletionClient, CompletionResult, MessageRole, RunId, RunStatus, ThreadId, WorkerId,
    WorkerSpec,
};
pub use error::{AgentError, CompletionError, FailureKind, Result};
pub use protocol::{CompletionProtocol, PollPolicy};
pub use registry::AgentRegistry;
