//! Multi-agent pipeline orchestration for WorkIron.
//!
//! This crate provides the [`Session`] that UI layers (CLI, REPL) talk to.
//! A session owns the agent registry, the preferences and the provider-side
//! conversation thread, and runs queries through the agent chain.
//!
//! # Overview
//!
//! A run goes through routing, sequential execution and aggregation:
//! - **Routing**: unconfigured agents are dropped; the chain shrinks to the
//!   first agent when `use_all_agents` is off or the complexity classifier
//!   calls the query simple
//! - **Execution**: each agent sees the query plus a digest of the earlier
//!   agents' replies; a failing agent is recorded and skipped
//! - **Visibility**: only the first and last results are emitted unless
//!   `show_all_responses` is on; hidden work is announced by a placeholder
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use workiron_orchestrator::{EventSink, Session, SessionConfig};
//! use workiron_persistence::FileStore;
//!
//! # async fn example(client: Arc<dyn workiron_agent::CompletionClient>) -> workiron_orchestrator::Result<()> {
//! let store = Arc::new(FileStore::new(workiron_core::store_dir()));
//! let session = Session::open(client, store, SessionConfig::default());
//!
//! let report = session.run_pipeline("Summarize X", &EventSink::discard()).await?;
//! for entry in &report.entries {
//!     println!("{}: {:?}", entry.role, entry.content());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod executor;
mod preferences;
mod session;
mod thread;

#[cfg(test)]
mod testing;

pub use error::{OrchestratorError, Result};
pub use executor::{
    chain_context, AgentOutcome, AgentOutput, EventSink, PipelineEvent, PipelineExecutor,
    PipelinePlan, PipelineReport, CONTEXT_HEADER, SYSTEM_AGENT_ID,
};
pub use preferences::{
    PreferenceFlag, Preferences, CLASSIFIER_OVERRIDES_KEY, COMPLEXITY_ROUTING_KEY,
    SHOW_ALL_RESPONSES_KEY, USE_ALL_AGENTS_KEY,
};
pub use session::{Session, SessionConfig, AGENTS_KEY, SESSION_KEYS};
pub use thread::ConversationThread;

// Re-export commonly used types from workiron-agent
pub use workiron_agent::{
    Agent, AgentConfig, AgentField, Classification, ClassifierOverrides, Complexity, FailureKind,
};
