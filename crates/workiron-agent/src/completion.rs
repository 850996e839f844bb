//! Completion provider boundary.
//!
//! The provider is job-based: messages accumulate on a thread, a transient
//! worker is created for one agent, and a run binds the worker to the thread.
//! Completion is observed by polling the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::CompletionError;

/// Result type for provider calls.
pub type CompletionResult<T> = std::result::Result<T, CompletionError>;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a provider-issued id.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the raw id.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Provider-side conversation thread handle.
    ThreadId
);
opaque_id!(
    /// Provider-side transient worker (assistant) handle.
    WorkerId
);
opaque_id!(
    /// Provider-side run handle.
    RunId
);

/// Author of a thread message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// End user (or the pipeline acting for them).
    User,
    /// Model output.
    Assistant,
}

impl MessageRole {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Observed state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Queued or in progress.
    Pending,
    /// Finished; the reply is the newest thread message.
    Completed,
    /// Terminal failure reported by the provider.
    Failed(Option<String>),
}

/// Definition of a transient worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerSpec {
    /// Display name.
    pub name: String,
    /// System instructions.
    pub instructions: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Response token budget applied to the run.
    pub max_tokens: Option<u32>,
}

impl WorkerSpec {
    /// Worker persona for a pipeline agent.
    pub fn for_agent(agent: &Agent) -> Self {
        Self {
            name: agent.label().to_string(),
            instructions: format!("You are {}. {}", agent.role.trim(), agent.instructions.trim()),
            model: agent.model.clone(),
            temperature: agent.temperature,
            max_tokens: Some(agent.max_tokens),
        }
    }
}

/// Job-based completion provider.
///
/// Every call may fail with a transport error; the pipeline treats that as
/// the failure of the agent being executed.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Creates a new conversation thread.
    async fn create_thread(&self) -> CompletionResult<ThreadId>;

    /// Appends a message to a thread.
    async fn post_message(
        &self,
        thread: &ThreadId,
        role: MessageRole,
        content: &str,
    ) -> CompletionResult<()>;

    /// Creates a transient worker.
    async fn create_worker(&self, spec: &WorkerSpec) -> CompletionResult<WorkerId>;

    /// Starts a run of `worker` against `thread`.
    async fn create_run(
        &self,
        thread: &ThreadId,
        worker: &WorkerId,
        max_tokens: Option<u32>,
    ) -> CompletionResult<RunId>;

    /// Fetches the current status of a run.
    async fn run_status(&self, thread: &ThreadId, run: &RunId) -> CompletionResult<RunStatus>;

    /// Text of the newest message on the thread, if it has any text content.
    async fn latest_message(&self, thread: &ThreadId) -> CompletionResult<Option<String>>;

    /// Deletes a worker.
    async fn delete_worker(&self, worker: &WorkerId) -> CompletionResult<()>;

    /// Deletes a thread and its messages.
    async fn delete_thread(&self, thread: &ThreadId) -> CompletionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;

    #[test]
    fn test_ids_display_and_serialize() {
        let id = ThreadId::new("thread_abc");
        assert_eq!(id.to_string(), "thread_abc");
        assert_eq!(id.as_str(), "thread_abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"thread_abc\"");
    }

    #[test]
    fn test_worker_spec_for_agent() {
        let agent = AgentConfig::new("Reviewer", " Review drafts ")
            .with_temperature(0.2)
            .with_max_tokens(300)
            .into_agent("a".into(), 0, "gpt-4o-mini");

        let spec = WorkerSpec::for_agent(&agent);
        assert_eq!(spec.name, "Reviewer");
        assert_eq!(spec.instructions, "You are Reviewer. Review drafts");
        assert_eq!(spec.model, "gpt-4o-mini");
        assert_eq!(spec.temperature, 0.2);
        assert_eq!(spec.max_tokens, Some(300));
    }

    #[test]
    fn test_message_role() {
        assert_eq!(MessageRole::User.as_str(), "user");
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
