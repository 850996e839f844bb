//! The session's provider-side conversation thread.

use tracing::{debug, info};

use workiron_agent::{CompletionClient, CompletionResult, ThreadId};

/// Lazily created conversation thread, reused across pipeline runs.
#[derive(Debug, Default)]
pub struct ConversationThread {
    id: Option<ThreadId>,
}

impl ConversationThread {
    /// Creates a handle with no provider thread yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current thread, if one has been created.
    pub fn id(&self) -> Option<&ThreadId> {
        self.id.as_ref()
    }

    /// Returns the current thread, creating one if needed.
    pub async fn ensure(&mut self, client: &dyn CompletionClient) -> CompletionResult<ThreadId> {
        if let Some(id) = &self.id {
            return Ok(id.clone());
        }
        let id = client.create_thread().await?;
        info!(thread_id = %id, "created conversation thread");
        self.id = Some(id.clone());
        Ok(id)
    }

    /// Forgets the current thread so the next [`ensure`](Self::ensure) creates a new one.
    pub fn invalidate(&mut self) -> Option<ThreadId> {
        let previous = self.id.take();
        if let Some(id) = &previous {
            debug!(thread_id = %id, "dropped conversation thread");
        }
        previous
    }
}
