//! Scripted completion provider shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use workiron_agent::{
    Agent, AgentConfig, CompletionClient, CompletionError, CompletionProtocol, CompletionResult,
    MessageRole, PollPolicy, RunId, RunStatus, ThreadId, WorkerId, WorkerSpec,
};

/// Provider answering each worker (by name) from a script.
///
/// Workers without a script answer `"<name> reply"`. The context posted
/// immediately before each run is recorded against the worker's name.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<CompletionResult<String>>>>,
    workers: Mutex<HashMap<String, String>>,
    runs: Mutex<HashMap<String, CompletionResult<String>>>,
    last_post: Mutex<HashMap<String, String>>,
    latest: Mutex<HashMap<String, String>>,
    contexts: Mutex<Vec<(String, String)>>,
    counter: AtomicUsize,
    threads_created: AtomicUsize,
    fail_thread_creation: AtomicBool,
    lose_thread_once: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn script(&self, worker: &str, reply: CompletionResult<String>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(worker.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn fail_thread_creation(&self) {
        self.fail_thread_creation.store(true, Ordering::SeqCst);
    }

    pub(crate) fn lose_thread_once(&self) {
        self.lose_thread_once.store(true, Ordering::SeqCst);
    }

    /// Makes every run wait until the returned handle is notified.
    pub(crate) fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub(crate) fn threads_created(&self) -> usize {
        self.threads_created.load(Ordering::SeqCst)
    }

    /// `(worker name, posted context)` per run, in execution order.
    pub(crate) fn contexts(&self) -> Vec<(String, String)> {
        self.contexts.lock().unwrap().clone()
    }

    pub(crate) fn context_for(&self, worker: &str) -> Option<String> {
        self.contexts()
            .into_iter()
            .find(|(name, _)| name == worker)
            .map(|(_, context)| context)
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.contexts().into_iter().map(|(name, _)| name).collect()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl CompletionClient for ScriptedProvider {
    async fn create_thread(&self) -> CompletionResult<ThreadId> {
        if self.fail_thread_creation.load(Ordering::SeqCst) {
            return Err(CompletionError::Transport("provider unreachable".into()));
        }
        self.threads_created.fetch_add(1, Ordering::SeqCst);
        Ok(ThreadId::new(self.next_id("thread")))
    }

    async fn post_message(
        &self,
        thread: &ThreadId,
        _role: MessageRole,
        content: &str,
    ) -> CompletionResult<()> {
        if self.lose_thread_once.swap(false, Ordering::SeqCst) {
            return Err(CompletionError::ThreadNotFound(thread.to_string()));
        }
        self.last_post
            .lock()
            .unwrap()
            .insert(thread.to_string(), content.to_string());
        Ok(())
    }

    async fn create_worker(&self, spec: &WorkerSpec) -> CompletionResult<WorkerId> {
        let id = self.next_id("asst");
        self.workers
            .lock()
            .unwrap()
            .insert(id.clone(), spec.name.clone());
        Ok(WorkerId::new(id))
    }

    async fn create_run(
        &self,
        thread: &ThreadId,
        worker: &WorkerId,
        _max_tokens: Option<u32>,
    ) -> CompletionResult<RunId> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let name = self
            .workers
            .lock()
            .unwrap()
            .get(worker.as_str())
            .cloned()
            .unwrap_or_default();
        let context = self
            .last_post
            .lock()
            .unwrap()
            .get(thread.as_str())
            .cloned()
            .unwrap_or_default();
        self.contexts.lock().unwrap().push((name.clone(), context));

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(VecDeque::pop_front);
        let outcome = scripted.unwrap_or_else(|| Ok(format!("{name} reply")));

        if let Err(CompletionError::Transport(message)) = &outcome {
            return Err(CompletionError::Transport(message.clone()));
        }

        let run = self.next_id("run");
        self.runs.lock().unwrap().insert(run.clone(), outcome);
        Ok(RunId::new(run))
    }

    async fn run_status(&self, thread: &ThreadId, run: &RunId) -> CompletionResult<RunStatus> {
        let outcome = self
            .runs
            .lock()
            .unwrap()
            .get(run.as_str())
            .cloned()
            .unwrap_or(Ok(String::new()));

        match outcome {
            Ok(text) => {
                self.latest
                    .lock()
                    .unwrap()
                    .insert(thread.to_string(), text);
                Ok(RunStatus::Completed)
            }
            Err(CompletionError::RunFailed { reason, .. }) => Ok(RunStatus::Failed(Some(reason))),
            Err(CompletionError::Timeout { .. }) => Ok(RunStatus::Pending),
            Err(other) => Err(other),
        }
    }

    async fn latest_message(&self, thread: &ThreadId) -> CompletionResult<Option<String>> {
        Ok(self.latest.lock().unwrap().get(thread.as_str()).cloned())
    }

    async fn delete_worker(&self, worker: &WorkerId) -> CompletionResult<()> {
        self.workers.lock().unwrap().remove(worker.as_str());
        Ok(())
    }

    async fn delete_thread(&self, thread: &ThreadId) -> CompletionResult<()> {
        self.latest.lock().unwrap().remove(thread.as_str());
        Ok(())
    }
}

pub(crate) fn fast_policy() -> PollPolicy {
    PollPolicy::default()
        .with_interval(Duration::from_millis(1))
        .with_max_attempts(3)
}

pub(crate) fn protocol(provider: &Arc<ScriptedProvider>) -> CompletionProtocol {
    CompletionProtocol::new(provider.clone(), fast_policy())
}

pub(crate) fn run_failed(reason: &str) -> CompletionResult<String> {
    Err(CompletionError::RunFailed {
        run_id: "run".into(),
        reason: reason.into(),
    })
}

/// Agent with `role` as both label and role.
pub(crate) fn agent(role: &str, order: i64) -> Agent {
    AgentConfig::new(role, format!("{role} instructions")).into_agent(
        format!("id-{}", role.to_lowercase()),
        order,
        "gpt-4o-mini",
    )
}
