//! Sequential execution of the agent chain.
//!
//! Agents run strictly one after another on the session's conversation
//! thread. Every agent after the first receives the query followed by a
//! digest of the earlier agents' successful replies:
//!
//! ```text
//! <query>
//!
//! Previous agents' responses:
//! Drafter: <draft>
//! Critic: <critique>
//! ```
//!
//! A failing agent is recorded and skipped in later digests; only a failure to
//! obtain the conversation thread aborts the run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use workiron_agent::{
    Agent, Classification, Complexity, CompletionError, CompletionProtocol, FailureKind,
    MessageRole, WorkerSpec,
};

use crate::preferences::Preferences;
use crate::thread::ConversationThread;

/// Separator between the query and the digest of earlier replies.
pub const CONTEXT_HEADER: &str = "\n\nPrevious agents' responses:\n";

/// Id and role carried by the synthetic processing-error entry.
pub const SYSTEM_AGENT_ID: &str = "system";

/// What happened to one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentOutcome {
    /// The agent replied.
    Completed { content: String },
    /// The agent failed; the run went on without it.
    Failed { kind: FailureKind, message: String },
    /// The run itself broke down and was aborted.
    ProcessingError { message: String },
}

/// One entry of the result stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutput {
    pub agent_id: String,
    pub role: String,
    /// Display label.
    pub name: String,
    pub outcome: AgentOutcome,
    /// Run start to last agent completion; set on the final entry only.
    pub elapsed: Option<Duration>,
}

impl AgentOutput {
    fn from_result(agent: &Agent, result: Result<String, CompletionError>) -> Self {
        let outcome = match result {
            Ok(content) => AgentOutcome::Completed { content },
            Err(e) => AgentOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        };
        Self {
            agent_id: agent.id.clone(),
            role: agent.role.clone(),
            name: agent.label().to_string(),
            outcome,
            elapsed: None,
        }
    }

    fn processing_error(error: &CompletionError, elapsed: Duration) -> Self {
        Self {
            agent_id: SYSTEM_AGENT_ID.to_string(),
            role: "System".to_string(),
            name: "System".to_string(),
            outcome: AgentOutcome::ProcessingError {
                message: format!("processing error: {error}"),
            },
            elapsed: Some(elapsed),
        }
    }

    /// Reply text, if the agent completed.
    pub fn content(&self) -> Option<&str> {
        match &self.outcome {
            AgentOutcome::Completed { content } => Some(content),
            _ => None,
        }
    }

    /// Returns `true` if the agent completed.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AgentOutcome::Completed { .. })
    }
}

/// Progress notifications sent while a run is executing.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Intermediate agents are working and their output is hidden.
    Thinking { agent_id: String, role: String },
    /// A visible result. `replaces_placeholder` is set when it takes the
    /// place of an earlier [`PipelineEvent::Thinking`].
    Output {
        output: AgentOutput,
        replaces_placeholder: bool,
    },
}

/// Optional receiver of [`PipelineEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    /// Sink forwarding to `sender`.
    pub fn new(sender: UnboundedSender<PipelineEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sink that drops every event.
    pub fn discard() -> Self {
        Self::default()
    }

    fn send(&self, event: PipelineEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                trace!("event receiver dropped");
            }
        }
    }
}

impl From<UnboundedSender<PipelineEvent>> for EventSink {
    fn from(sender: UnboundedSender<PipelineEvent>) -> Self {
        Self::new(sender)
    }
}

/// The agents a run will execute and how their results surface.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePlan {
    /// Configured agents in execution order.
    pub agents: Vec<Agent>,
    /// Emit every result instead of only the first and last.
    pub show_all_responses: bool,
    /// Classifier verdict, when routing was consulted.
    pub classification: Option<Classification>,
}

impl PipelinePlan {
    /// Selects the agents to run.
    ///
    /// Unconfigured agents are dropped first, so "first" and "last" always
    /// refer to agents that actually run. The chain shrinks to its first agent
    /// when `use_all_agents` is off, or when routing is on and the query was
    /// classified simple.
    pub fn route(
        mut agents: Vec<Agent>,
        preferences: &Preferences,
        classification: Option<Classification>,
    ) -> Self {
        agents.sort_by_key(|a| a.order);
        let mut agents: Vec<Agent> = agents
            .into_iter()
            .filter(|agent| {
                let configured = agent.is_configured();
                if !configured {
                    debug!(agent_id = %agent.id, "skipping unconfigured agent");
                }
                configured
            })
            .collect();

        let simple = preferences.complexity_routing
            && classification.is_some_and(|c| c.complexity == Complexity::Simple);
        if !preferences.use_all_agents || simple {
            agents.truncate(1);
        }

        Self {
            agents,
            show_all_responses: preferences.show_all_responses,
            classification,
        }
    }

    /// Whether the result at `index` is emitted.
    pub fn is_visible(&self, index: usize) -> bool {
        self.show_all_responses || index == 0 || index + 1 == self.agents.len()
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub classification: Option<Classification>,
    /// Ids of the agents selected to run, in order.
    pub agents: Vec<String>,
    /// Every executed agent, visible or not.
    pub responses: Vec<AgentOutput>,
    /// The emitted stream with the placeholder resolved.
    pub entries: Vec<AgentOutput>,
    pub elapsed: Duration,
    /// A processing error stopped the run early.
    pub aborted: bool,
}

impl PipelineReport {
    fn new(query: &str, plan: &PipelinePlan) -> Self {
        Self {
            query: query.to_string(),
            started_at: Utc::now(),
            classification: plan.classification,
            agents: plan.agents.iter().map(|a| a.id.clone()).collect(),
            responses: Vec::new(),
            entries: Vec::new(),
            elapsed: Duration::ZERO,
            aborted: false,
        }
    }

    fn emit(&mut self, output: AgentOutput, replaces_placeholder: bool, events: &EventSink) {
        self.entries.push(output.clone());
        events.send(PipelineEvent::Output {
            output,
            replaces_placeholder,
        });
    }

    /// The final emitted entry.
    pub fn final_entry(&self) -> Option<&AgentOutput> {
        self.entries.last()
    }
}

/// Builds the input for the next agent from the query and earlier replies.
pub fn chain_context(query: &str, prior: &[(String, String)]) -> String {
    if prior.is_empty() {
        return query.to_string();
    }
    let digest: Vec<String> = prior
        .iter()
        .map(|(role, content)| format!("{role}: {content}"))
        .collect();
    format!("{query}{CONTEXT_HEADER}{}", digest.join("\n"))
}

enum StepError {
    /// The agent failed; the run continues.
    Agent(CompletionError),
    /// The conversation thread could not be obtained; the run stops.
    Fatal(CompletionError),
}

/// Runs a [`PipelinePlan`] against the provider.
#[derive(Clone)]
pub struct PipelineExecutor {
    protocol: CompletionProtocol,
}

impl PipelineExecutor {
    pub fn new(protocol: CompletionProtocol) -> Self {
        Self { protocol }
    }

    /// Executes `plan` for `query`, streaming visible results to `events`.
    pub async fn execute(
        &self,
        query: &str,
        plan: &PipelinePlan,
        thread: &mut ConversationThread,
        events: &EventSink,
    ) -> PipelineReport {
        let clock = Instant::now();
        let mut report = PipelineReport::new(query, plan);
        let total = plan.agents.len();
        let mut digest: Vec<(String, String)> = Vec::new();
        let mut placeholder = false;

        info!(agents = total, "starting pipeline");

        for (index, agent) in plan.agents.iter().enumerate() {
            let visible = plan.is_visible(index);
            if !visible && !placeholder {
                events.send(PipelineEvent::Thinking {
                    agent_id: agent.id.clone(),
                    role: agent.role.clone(),
                });
                placeholder = true;
            }

            debug!(agent_id = %agent.id, role = %agent.role, index, visible, "running agent");
            let context = chain_context(query, &digest);

            let result = match self.run_agent(agent, &context, thread).await {
                Ok(content) => Ok(content),
                Err(StepError::Agent(e)) => {
                    warn!(agent_id = %agent.id, kind = %e.kind(), error = %e, "agent failed");
                    Err(e)
                }
                Err(StepError::Fatal(e)) => {
                    error!(agent_id = %agent.id, error = %e, "pipeline aborted");
                    let output = AgentOutput::processing_error(&e, clock.elapsed());
                    report.emit(output, placeholder, events);
                    report.aborted = true;
                    break;
                }
            };

            let is_last = index + 1 == total;
            let mut output = AgentOutput::from_result(agent, result);
            if is_last {
                output.elapsed = Some(clock.elapsed());
            }
            if let Some(content) = output.content() {
                digest.push((agent.role.clone(), content.to_string()));
            }

            report.responses.push(output.clone());
            if visible {
                report.emit(output, placeholder && is_last, events);
            }
        }

        report.elapsed = clock.elapsed();
        info!(
            executed = report.responses.len(),
            emitted = report.entries.len(),
            aborted = report.aborted,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline finished"
        );
        report
    }

    async fn run_agent(
        &self,
        agent: &Agent,
        context: &str,
        thread: &mut ConversationThread,
    ) -> Result<String, StepError> {
        let client = self.protocol.client().as_ref();
        let thread_id = thread.ensure(client).await.map_err(StepError::Fatal)?;

        let thread_id = match client.post_message(&thread_id, MessageRole::User, context).await {
            Ok(()) => thread_id,
            Err(CompletionError::ThreadNotFound(stale)) => {
                warn!(thread_id = %stale, "conversation thread is gone, recreating");
                thread.invalidate();
                let fresh = thread.ensure(client).await.map_err(StepError::Fatal)?;
                client
                    .post_message(&fresh, MessageRole::User, context)
                    .await
                    .map_err(StepError::Agent)?;
                fresh
            }
            Err(e) => return Err(StepError::Agent(e)),
        };

        let result = self
            .protocol
            .complete(&thread_id, &WorkerSpec::for_agent(agent))
            .await;
        if let Err(CompletionError::ThreadNotFound(_)) = &result {
            thread.invalidate();
        }
        result.map_err(StepError::Agent)
    }
}
