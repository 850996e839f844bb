//! The caller-facing session: agents, preferences and pipeline runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use workiron_agent::{
    Agent, AgentConfig, AgentField, AgentRegistry, ClassifierOverrides, CompletionClient,
    CompletionProtocol, ComplexityClassifier, PollPolicy, ThreadId,
};
use workiron_core::Settings;
use workiron_persistence::{KeyValueStore, LoadSource, SessionStateStore};

use crate::error::{OrchestratorError, Result};
use crate::executor::{EventSink, PipelineExecutor, PipelinePlan, PipelineReport};
use crate::preferences::{
    PreferenceFlag, Preferences, CLASSIFIER_OVERRIDES_KEY, COMPLEXITY_ROUTING_KEY,
    SHOW_ALL_RESPONSES_KEY, USE_ALL_AGENTS_KEY,
};
use crate::thread::ConversationThread;

/// Key of the stored agent collection.
pub const AGENTS_KEY: &str = "workflowAgents";

/// Every key a session writes.
pub const SESSION_KEYS: [&str; 5] = [
    AGENTS_KEY,
    SHOW_ALL_RESPONSES_KEY,
    USE_ALL_AGENTS_KEY,
    COMPLEXITY_ROUTING_KEY,
    CLASSIFIER_OVERRIDES_KEY,
];

/// Session construction options.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Model given to agents created without one.
    pub default_model: String,
    /// Model used by the complexity classifier.
    pub classifier_model: String,
    /// Run polling bounds.
    pub poll: PollPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_model: workiron_core::DEFAULT_MODEL.to_string(),
            classifier_model: workiron_core::DEFAULT_MODEL.to_string(),
            poll: PollPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default_model: settings.model.clone(),
            classifier_model: settings.model.clone(),
            poll: PollPolicy::from_settings(settings),
        }
    }
}

/// Clears the busy flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A single user's workspace.
///
/// Owns the agent registry, the preferences and the conversation thread.
/// Configuration changes are written through immediately; a pipeline run
/// reads both at start, so edits made mid-run apply to the next run.
pub struct Session {
    state: SessionStateStore,
    client: Arc<dyn CompletionClient>,
    registry: RwLock<AgentRegistry>,
    preferences: RwLock<Preferences>,
    executor: PipelineExecutor,
    classifier: ComplexityClassifier,
    thread: Mutex<ConversationThread>,
    busy: AtomicBool,
}

impl Session {
    /// Opens a session over `store`, loading agents and preferences.
    ///
    /// A corrupt agent collection is recovered from its backup slot; if
    /// neither slot is readable the session starts with no agents.
    pub fn open(
        client: Arc<dyn CompletionClient>,
        store: Arc<dyn KeyValueStore>,
        config: SessionConfig,
    ) -> Self {
        let state = SessionStateStore::new(store);
        let registry = load_registry(&state, &config.default_model);
        let preferences = Preferences::load(&state);
        let protocol = CompletionProtocol::new(client.clone(), config.poll);

        info!(
            agents = registry.len(),
            show_all_responses = preferences.show_all_responses,
            use_all_agents = preferences.use_all_agents,
            complexity_routing = preferences.complexity_routing,
            "session opened"
        );

        Self {
            state,
            client,
            registry: RwLock::new(registry),
            preferences: RwLock::new(preferences),
            executor: PipelineExecutor::new(protocol.clone()),
            classifier: ComplexityClassifier::new(protocol, config.classifier_model),
            thread: Mutex::new(ConversationThread::new()),
            busy: AtomicBool::new(false),
        }
    }

    fn registry(&self) -> RwLockReadGuard<'_, AgentRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, AgentRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_agents(&self, registry: &AgentRegistry) -> Result<()> {
        let agents: Vec<&Agent> = registry.iter().collect();
        self.state.save(AGENTS_KEY, &agents)?;
        Ok(())
    }

    // ---- Agents ----

    /// Agents in pipeline order.
    pub fn list_agents(&self) -> Vec<Agent> {
        self.registry().list()
    }

    pub fn get_agent(&self, id: &str) -> Option<Agent> {
        self.registry().get(id).cloned()
    }

    /// Appends a new agent and persists the collection.
    pub fn add_agent(&self, config: AgentConfig) -> Result<Agent> {
        let mut registry = self.registry_mut();
        let agent = registry.add(config);
        self.persist_agents(&registry)?;
        Ok(agent)
    }

    /// Updates one field. `Ok(None)` if the id is unknown.
    pub fn update_agent(&self, id: &str, field: AgentField) -> Result<Option<Agent>> {
        let mut registry = self.registry_mut();
        let Some(agent) = registry.update(id, field) else {
            debug!(agent_id = %id, "update ignored, unknown agent");
            return Ok(None);
        };
        self.persist_agents(&registry)?;
        Ok(Some(agent))
    }

    /// Removes an agent. `Ok(false)` if the id is unknown.
    pub fn remove_agent(&self, id: &str) -> Result<bool> {
        let mut registry = self.registry_mut();
        if !registry.remove(id) {
            return Ok(false);
        }
        self.persist_agents(&registry)?;
        Ok(true)
    }

    /// Copies an agent to the end of the pipeline. `Ok(None)` if the id is unknown.
    pub fn duplicate_agent(&self, id: &str) -> Result<Option<Agent>> {
        let mut registry = self.registry_mut();
        let Some(copy) = registry.duplicate(id) else {
            return Ok(None);
        };
        self.persist_agents(&registry)?;
        Ok(Some(copy))
    }

    // ---- Preferences ----

    pub fn preferences(&self) -> Preferences {
        self.preferences
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces and persists all preferences.
    pub fn set_preferences(&self, preferences: Preferences) -> Result<Preferences> {
        let mut current = self.preferences.write().unwrap_or_else(PoisonError::into_inner);
        preferences.save(&self.state)?;
        *current = preferences;
        Ok(current.clone())
    }

    /// Sets and persists one flag.
    pub fn set_preference(&self, flag: PreferenceFlag, value: bool) -> Result<Preferences> {
        let mut current = self.preferences.write().unwrap_or_else(PoisonError::into_inner);
        self.state.save_flag(flag.key(), value)?;
        current.set(flag, value);
        debug!(preference = %flag, value, "preference updated");
        Ok(current.clone())
    }

    pub fn set_show_all_responses(&self, value: bool) -> Result<Preferences> {
        self.set_preference(PreferenceFlag::ShowAllResponses, value)
    }

    pub fn set_use_all_agents(&self, value: bool) -> Result<Preferences> {
        self.set_preference(PreferenceFlag::UseAllAgents, value)
    }

    pub fn set_complexity_routing(&self, value: bool) -> Result<Preferences> {
        self.set_preference(PreferenceFlag::ComplexityRouting, value)
    }

    pub fn set_classifier_overrides(&self, overrides: ClassifierOverrides) -> Result<Preferences> {
        let mut current = self.preferences.write().unwrap_or_else(PoisonError::into_inner);
        self.state.save(CLASSIFIER_OVERRIDES_KEY, &overrides)?;
        current.classifier_overrides = overrides;
        Ok(current.clone())
    }

    // ---- Pipeline ----

    /// Returns `true` while a run is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Runs `query` through the configured agents.
    ///
    /// Fails only with [`OrchestratorError::Busy`] when another run is in
    /// flight, or [`OrchestratorError::EmptyQuery`]. Agent and provider
    /// failures are reported inside the [`PipelineReport`].
    pub async fn run_pipeline(&self, query: &str, events: &EventSink) -> Result<PipelineReport> {
        let _guard = RunGuard::acquire(&self.busy).ok_or(OrchestratorError::Busy)?;

        let query = query.trim();
        if query.is_empty() {
            return Err(OrchestratorError::EmptyQuery);
        }

        let agents = self.list_agents();
        let preferences = self.preferences();

        let configured = agents.iter().filter(|a| a.is_configured()).count();
        let classification =
            if preferences.complexity_routing && preferences.use_all_agents && configured > 1 {
                let verdict = self
                    .classifier
                    .classify(query, &preferences.classifier_overrides)
                    .await;
                info!(complexity = ?verdict.complexity, source = ?verdict.source, "query classified");
                Some(verdict)
            } else {
                None
            };

        let plan = PipelinePlan::route(agents, &preferences, classification);
        if plan.agents.is_empty() {
            warn!("no configured agents, nothing to run");
        }

        let mut thread = self.thread.lock().await;
        Ok(self.executor.execute(query, &plan, &mut thread, events).await)
    }

    /// Current conversation thread, if one exists.
    pub async fn thread_id(&self) -> Option<ThreadId> {
        self.thread.lock().await.id().cloned()
    }

    /// Forgets the conversation thread so the next run starts fresh.
    ///
    /// Agents and preferences are kept.
    pub async fn clear_all_conversation_state(&self) -> Result<()> {
        if self.is_busy() {
            return Err(OrchestratorError::Busy);
        }
        let mut thread = self.thread.lock().await;
        if let Some(previous) = thread.invalidate() {
            info!(thread_id = %previous, "conversation cleared");
        }
        Ok(())
    }

    /// Deletes every stored key and resets agents and preferences to defaults.
    pub fn reset_stored_state(&self) -> Result<()> {
        let mut registry = self.registry_mut();
        let mut preferences = self.preferences.write().unwrap_or_else(PoisonError::into_inner);
        self.state.clear(&SESSION_KEYS)?;
        let default_model = registry.default_model().to_string();
        *registry = AgentRegistry::new(default_model);
        *preferences = Preferences::default();
        info!("session state reset");
        Ok(())
    }

    /// The provider client this session talks to.
    pub fn client(&self) -> &Arc<dyn CompletionClient> {
        &self.client
    }
}

fn load_registry(state: &SessionStateStore, default_model: &str) -> AgentRegistry {
    match state.load_with_backup(AGENTS_KEY, |raw| AgentRegistry::deserialize(raw, default_model)) {
        Some(recovered) => {
            if recovered.source == LoadSource::Backup {
                warn!(agents = recovered.value.len(), "agent collection restored from backup");
            }
            let mut registry = recovered.value;
            if registry.is_stale() {
                // Ids assigned while loading must survive the next open.
                let agents: Vec<&Agent> = registry.iter().collect();
                match state.save(AGENTS_KEY, &agents) {
                    Ok(()) => {
                        info!(agents = agents.len(), "normalised stored agent collection");
                        registry.mark_saved();
                    }
                    Err(e) => warn!(error = %e, "failed to rewrite stored agents"),
                }
            }
            registry
        }
        None => {
            debug!("no stored agents");
            AgentRegistry::new(default_model)
        }
    }
}
