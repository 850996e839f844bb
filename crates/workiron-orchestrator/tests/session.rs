//! End-to-end session tests against an in-process provider and a file store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use workiron_agent::{
    AgentConfig, AgentField, CompletionClient, CompletionError, CompletionResult, MessageRole,
    PollPolicy, RunId, RunStatus, ThreadId, WorkerId, WorkerSpec,
};
use workiron_orchestrator::{
    AgentOutcome, EventSink, OrchestratorError, PipelineEvent, Session, SessionConfig, AGENTS_KEY,
};
use workiron_persistence::{FileStore, KeyValueStore};

/// Echoing provider: each worker replies "<name> says: <first line of its context>".
#[derive(Default)]
struct EchoProvider {
    ids: AtomicUsize,
    posts: Mutex<HashMap<String, String>>,
    workers: Mutex<HashMap<String, String>>,
    runs: Mutex<HashMap<String, (String, String)>>,
    submitted: Mutex<Vec<(String, String)>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl EchoProvider {
    fn next(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.ids.fetch_add(1, Ordering::SeqCst))
    }

    fn submitted(&self) -> Vec<(String, String)> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for EchoProvider {
    async fn create_thread(&self) -> CompletionResult<ThreadId> {
        Ok(ThreadId::new(self.next("thread")))
    }

    async fn post_message(
        &self,
        thread: &ThreadId,
        role: MessageRole,
        content: &str,
    ) -> CompletionResult<()> {
        assert_eq!(role, MessageRole::User);
        self.posts
            .lock()
            .unwrap()
            .insert(thread.to_string(), content.to_string());
        Ok(())
    }

    async fn create_worker(&self, spec: &WorkerSpec) -> CompletionResult<WorkerId> {
        let id = self.next("asst");
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
            .ok_or_else(|| CompletionError::Api {
                status: 404,
                message: "no such assistant".into(),
            })?;
        let context = self
            .posts
            .lock()
            .unwrap()
            .get(thread.as_str())
            .cloned()
            .unwrap_or_default();
        self.submitted
            .lock()
            .unwrap()
            .push((name.clone(), context.clone()));

        let first_line = context.lines().next().unwrap_or_default().to_string();
        let run = self.next("run");
        self.runs
            .lock()
            .unwrap()
            .insert(run.clone(), (thread.to_string(), format!("{name} says: {first_line}")));
        Ok(RunId::new(run))
    }

    async fn run_status(&self, _thread: &ThreadId, _run: &RunId) -> CompletionResult<RunStatus> {
        Ok(RunStatus::Completed)
    }

    async fn latest_message(&self, thread: &ThreadId) -> CompletionResult<Option<String>> {
        let runs = self.runs.lock().unwrap();
        let reply = runs
            .iter()
            .filter(|(_, (t, _))| t == thread.as_str())
            .max_by_key(|(id, _)| {
                id.trim_start_matches("run-")
                    .parse::<usize>()
                    .unwrap_or_default()
            })
            .map(|(_, (_, reply))| reply.clone());
        Ok(reply)
    }

    async fn delete_worker(&self, worker: &WorkerId) -> CompletionResult<()> {
        self.workers.lock().unwrap().remove(worker.as_str());
        Ok(())
    }

    async fn delete_thread(&self, thread: &ThreadId) -> CompletionResult<()> {
        self.posts.lock().unwrap().remove(thread.as_str());
        Ok(())
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        poll: PollPolicy::default().with_interval(Duration::from_millis(1)),
        ..SessionConfig::default()
    }
}

fn open(provider: &Arc<EchoProvider>, dir: &std::path::Path) -> Session {
    Session::open(provider.clone(), Arc::new(FileStore::new(dir)), config())
}

#[tokio::test]
async fn drafter_and_reviewer_chain() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(EchoProvider::default());
    let session = open(&provider, dir.path());

    let drafter = session
        .add_agent(AgentConfig::new("Drafter", "Draft answers"))
        .unwrap();
    let reviewer = session
        .add_agent(AgentConfig::new("Reviewer", "Review drafts"))
        .unwrap();
    session.set_show_all_responses(true).unwrap();

    let report = session
        .run_pipeline("Summarize X", &EventSink::discard())
        .await
        .unwrap();

    let ids: Vec<&str> = report.entries.iter().map(|e| e.agent_id.as_str()).collect();
    assert_eq!(ids, vec![drafter.id.as_str(), reviewer.id.as_str()]);

    let submitted = provider.submitted();
    assert_eq!(submitted[0], ("Drafter".to_string(), "Summarize X".to_string()));
    assert!(submitted[1]
        .1
        .contains("Drafter: Drafter says: Summarize X"));
    assert!(report.final_entry().unwrap().elapsed.is_some());
}

#[tokio::test]
async fn three_agents_emit_first_and_last_with_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(EchoProvider::default());
    let session = open(&provider, dir.path());

    let last = session.add_agent(AgentConfig::new("Editor", "Polish")).unwrap();
    let first = session.add_agent(AgentConfig::new("Drafter", "Draft")).unwrap();
    let middle = session.add_agent(AgentConfig::new("Critic", "Critique")).unwrap();
    session.update_agent(&last.id, AgentField::Order(2)).unwrap();
    session.update_agent(&first.id, AgentField::Order(0)).unwrap();
    session.update_agent(&middle.id, AgentField::Order(1)).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = session
        .run_pipeline("Plan a trip", &EventSink::new(tx))
        .await
        .unwrap();

    let roles: Vec<&str> = report.entries.iter().map(|e| e.role.as_str()).collect();
    assert_eq!(roles, vec!["Drafter", "Editor"]);
    let editor_context = &provider.submitted()[2].1;
    assert!(editor_context.contains("Critic: Critic says: Plan a trip"));

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[1], PipelineEvent::Thinking { .. }));
    assert!(matches!(
        &events[2],
        PipelineEvent::Output { replaces_placeholder: true, output } if output.agent_id == last.id
    ));
}

#[tokio::test]
async fn concurrent_run_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(EchoProvider::default());
    let gate = Arc::new(Notify::new());
    *provider.gate.lock().unwrap() = Some(gate.clone());

    let session = Arc::new(open(&provider, dir.path()));
    session.add_agent(AgentConfig::new("Solo", "Answer")).unwrap();

    let running = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .run_pipeline("long question", &EventSink::discard())
                .await
        })
    };
    while !session.is_busy() {
        tokio::task::yield_now().await;
    }

    let err = session
        .run_pipeline("second question", &EventSink::discard())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Busy));
    assert!(matches!(
        session.clear_all_conversation_state().await,
        Err(OrchestratorError::Busy)
    ));

    gate.notify_one();
    let report = running.await.unwrap().unwrap();
    assert!(matches!(report.entries[0].outcome, AgentOutcome::Completed { .. }));
    assert!(!session.is_busy());
}

#[tokio::test]
async fn corrupted_agent_file_is_recovered_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(EchoProvider::default());

    {
        let session = open(&provider, dir.path());
        session.add_agent(AgentConfig::new("Drafter", "Draft")).unwrap();
        session.add_agent(AgentConfig::new("Reviewer", "Review")).unwrap();
    }
    // A clean open mirrors the collection into the backup slot.
    let before = open(&provider, dir.path()).list_agents();

    std::fs::write(dir.path().join(AGENTS_KEY), "{\"agents\": [trunc").unwrap();
    let session = open(&provider, dir.path());

    assert_eq!(session.list_agents(), before);
    let healed = FileStore::new(dir.path()).get(AGENTS_KEY).unwrap().unwrap();
    assert!(healed.starts_with('['));

    let report = session
        .run_pipeline("Summarize X", &EventSink::discard())
        .await
        .unwrap();
    assert_eq!(report.responses.len(), 2);
}

#[tokio::test]
async fn agents_stored_without_ids_keep_their_ids_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(EchoProvider::default());
    std::fs::write(
        dir.path().join(AGENTS_KEY),
        r#"[{"role":"Drafter","instructions":"Draft"}]"#,
    )
    .unwrap();

    let first = open(&provider, dir.path()).list_agents();
    let second = open(&provider, dir.path());
    assert_eq!(second.list_agents(), first);

    let updated = second
        .update_agent(&first[0].id, AgentField::Role("Writer".into()))
        .unwrap();
    assert_eq!(updated.map(|a| a.role), Some("Writer".to_string()));
}

#[tokio::test]
async fn legacy_settings_document_is_rewritten_as_agent_array() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(EchoProvider::default());
    std::fs::write(
        dir.path().join(AGENTS_KEY),
        r#"{"agents":[{"role":"Assistant","instructions":"Help","order":0}]}"#,
    )
    .unwrap();

    let id = open(&provider, dir.path()).list_agents()[0].id.clone();

    let stored = FileStore::new(dir.path()).get(AGENTS_KEY).unwrap().unwrap();
    assert!(stored.starts_with('['));
    assert!(stored.contains(&id));
    assert!(open(&provider, dir.path()).remove_agent(&id).unwrap());
}
