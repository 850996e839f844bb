//! Submit/poll/fetch driver for the job-based completion provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use workiron_core::Settings;

use crate::completion::{CompletionClient, RunId, RunStatus, ThreadId, WorkerId, WorkerSpec};
use crate::error::CompletionError;

/// Bounds on run status polling.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay between status polls.
    pub interval: Duration,
    /// Maximum number of status polls.
    pub max_attempts: u32,
    /// Optional wall-clock limit measured from the first poll.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 120,
            deadline: None,
        }
    }
}

impl PollPolicy {
    /// Policy from shared settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.poll_interval,
            max_attempts: settings.poll_max_attempts.max(1),
            deadline: None,
        }
    }

    /// Set the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the maximum number of polls.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set a wall-clock deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Drives one unit of work through the provider.
///
/// `complete` creates a worker, starts a run on the thread, polls it until it
/// is terminal, reads the reply and deletes the worker on every path.
#[derive(Clone)]
pub struct CompletionProtocol {
    client: Arc<dyn CompletionClient>,
    policy: PollPolicy,
}

impl CompletionProtocol {
    /// Creates a protocol driver.
    pub fn new(client: Arc<dyn CompletionClient>, policy: PollPolicy) -> Self {
        Self { client, policy }
    }

    /// The underlying provider client.
    pub fn client(&self) -> &Arc<dyn CompletionClient> {
        &self.client
    }

    /// The polling bounds.
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Runs `worker` against `thread` and returns the reply text.
    pub async fn complete(
        &self,
        thread: &ThreadId,
        worker: &WorkerSpec,
    ) -> Result<String, CompletionError> {
        let worker_id = self.client.create_worker(worker).await?;
        debug!(worker_id = %worker_id, name = %worker.name, "created worker");

        let result = self.run_with_worker(thread, &worker_id, worker.max_tokens).await;

        match self.client.delete_worker(&worker_id).await {
            Ok(()) => trace!(worker_id = %worker_id, "deleted worker"),
            Err(e) => warn!(worker_id = %worker_id, error = %e, "failed to delete worker"),
        }

        result
    }

    async fn run_with_worker(
        &self,
        thread: &ThreadId,
        worker_id: &WorkerId,
        max_tokens: Option<u32>,
    ) -> Result<String, CompletionError> {
        let run_id = self.client.create_run(thread, worker_id, max_tokens).await?;
        debug!(thread_id = %thread, run_id = %run_id, "run started");

        self.wait_for_run(thread, &run_id).await?;

        match self.client.latest_message(thread).await? {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(CompletionError::EmptyResponse),
        }
    }

    async fn wait_for_run(&self, thread: &ThreadId, run_id: &RunId) -> Result<(), CompletionError> {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.client.run_status(thread, run_id).await? {
                RunStatus::Completed => {
                    debug!(run_id = %run_id, attempt, "run completed");
                    return Ok(());
                }
                RunStatus::Failed(reason) => {
                    return Err(CompletionError::RunFailed {
                        run_id: run_id.to_string(),
                        reason: reason.unwrap_or_else(|| "unknown".to_string()),
                    });
                }
                RunStatus::Pending => trace!(run_id = %run_id, attempt, "run pending"),
            }

            if let Some(deadline) = self.policy.deadline {
                if started.elapsed() >= deadline {
                    return Err(CompletionError::Timeout {
                        run_id: run_id.to_string(),
                        attempts: attempt,
                    });
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        Err(CompletionError::Timeout {
            run_id: run_id.to_string(),
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionResult, MessageRole};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider whose run statuses are scripted.
    struct ScriptedClient {
        statuses: Mutex<VecDeque<CompletionResult<RunStatus>>>,
        reply: Option<String>,
        fail_create_run: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(statuses: Vec<CompletionResult<RunStatus>>, reply: Option<&str>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                reply: reply.map(str::to_string),
                fail_create_run: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn polls(&self) -> usize {
            self.calls().iter().filter(|c| *c == "run_status").count()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn create_thread(&self) -> CompletionResult<ThreadId> {
            self.record("create_thread");
            Ok(ThreadId::new("thread_1"))
        }

        async fn post_message(
            &self,
            _thread: &ThreadId,
            _role: MessageRole,
            _content: &str,
        ) -> CompletionResult<()> {
            self.record("post_message");
            Ok(())
        }

        async fn create_worker(&self, _spec: &WorkerSpec) -> CompletionResult<WorkerId> {
            self.record("create_worker");
            Ok(WorkerId::new("asst_1"))
        }

        async fn create_run(
            &self,
            _thread: &ThreadId,
            _worker: &WorkerId,
            _max_tokens: Option<u32>,
        ) -> CompletionResult<RunId> {
            self.record("create_run");
            if self.fail_create_run {
                return Err(CompletionError::Transport("connection reset".into()));
            }
            Ok(RunId::new("run_1"))
        }

        async fn run_status(&self, _thread: &ThreadId, _run: &RunId) -> CompletionResult<RunStatus> {
            self.record("run_status");
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(RunStatus::Pending))
        }

        async fn latest_message(&self, _thread: &ThreadId) -> CompletionResult<Option<String>> {
            self.record("latest_message");
            Ok(self.reply.clone())
        }

        async fn delete_worker(&self, _worker: &WorkerId) -> CompletionResult<()> {
            self.record("delete_worker");
            Ok(())
        }

        async fn delete_thread(&self, _thread: &ThreadId) -> CompletionResult<()> {
            self.record("delete_thread");
            Ok(())
        }
    }

    fn spec() -> WorkerSpec {
        WorkerSpec {
            name: "Drafter".into(),
            instructions: "You are Drafter. Draft answers".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: Some(100),
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy::default()
            .with_interval(Duration::from_millis(1))
            .with_max_attempts(5)
    }

    fn protocol(client: &Arc<ScriptedClient>, policy: PollPolicy) -> CompletionProtocol {
        CompletionProtocol::new(client.clone(), policy)
    }

    #[tokio::test]
    async fn test_complete_after_pending_polls() {
        let client = Arc::new(ScriptedClient::new(
            vec![
                Ok(RunStatus::Pending),
                Ok(RunStatus::Pending),
                Ok(RunStatus::Completed),
            ],
            Some("Draft text"),
        ));

        let text = protocol(&client, fast_policy())
            .complete(&ThreadId::new("thread_1"), &spec())
            .await
            .unwrap();

        assert_eq!(text, "Draft text");
        assert_eq!(client.polls(), 3);
        assert_eq!(client.calls().last().unwrap(), "delete_worker");
    }

    #[tokio::test]
    async fn test_failed_run_is_distinct_and_cleans_up() {
        let client = Arc::new(ScriptedClient::new(
            vec![Ok(RunStatus::Failed(Some("rate_limit_exceeded".into())))],
            None,
        ));

        let err = protocol(&client, fast_policy())
            .complete(&ThreadId::new("thread_1"), &spec())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CompletionError::RunFailed {
                run_id: "run_1".into(),
                reason: "rate_limit_exceeded".into(),
            }
        );
        assert!(client.calls().contains(&"delete_worker".to_string()));
        assert!(!client.calls().contains(&"latest_message".to_string()));
    }

    #[tokio::test]
    async fn test_poll_budget_exhaustion_times_out() {
        let client = Arc::new(ScriptedClient::new(vec![], Some("never read")));

        let err = protocol(&client, fast_policy().with_max_attempts(3))
            .complete(&ThreadId::new("thread_1"), &spec())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CompletionError::Timeout {
                run_id: "run_1".into(),
                attempts: 3,
            }
        );
        assert_eq!(client.polls(), 3);
        assert_eq!(client.calls().last().unwrap(), "delete_worker");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_times_out_before_attempts() {
        let client = Arc::new(ScriptedClient::new(vec![], None));
        let policy = PollPolicy::default()
            .with_interval(Duration::from_secs(1))
            .with_max_attempts(1_000)
            .with_deadline(Duration::from_secs(3));

        let err = protocol(&client, policy)
            .complete(&ThreadId::new("thread_1"), &spec())
            .await
            .unwrap_err();

        match err {
            CompletionError::Timeout { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_still_deletes_worker() {
        let mut client = ScriptedClient::new(vec![], None);
        client.fail_create_run = true;
        let client = Arc::new(client);

        let err = protocol(&client, fast_policy())
            .complete(&ThreadId::new("thread_1"), &spec())
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::Transport(_)));
        assert_eq!(
            client.calls(),
            vec!["create_worker", "create_run", "delete_worker"]
        );
    }

    #[tokio::test]
    async fn test_blank_reply_is_empty_response() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(RunStatus::Completed)], Some("  ")));

        let err = protocol(&client, fast_policy())
            .complete(&ThreadId::new("thread_1"), &spec())
            .await
            .unwrap_err();

        assert_eq!(err, CompletionError::EmptyResponse);
    }

    #[test]
    fn test_policy_from_settings() {
        let settings = Settings::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_poll_max_attempts(7);
        let policy = PollPolicy::from_settings(&settings);

        assert_eq!(policy.interval, Duration::from_millis(20));
        assert_eq!(policy.max_attempts, 7);
        assert!(policy.deadline.is_none());
    }
}
