//! Agent registry: the ordered collection of configured agents.

use serde::de::Error as _;
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::{new_agent_id, Agent, AgentConfig, AgentField};

/// Collection of agents keyed by id, kept in insertion order.
///
/// Pipeline order comes from [`AgentRegistry::list`], which sorts by
/// `order` and falls back to insertion order on ties.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
    default_model: String,
    stale: bool,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(workiron_core::DEFAULT_MODEL)
    }
}

impl AgentRegistry {
    /// Creates an empty registry whose new agents default to `default_model`.
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            agents: Vec::new(),
            default_model: default_model.into(),
            stale: false,
        }
    }

    /// Creates a registry holding `agents` as-is.
    pub fn from_agents(agents: Vec<Agent>, default_model: impl Into<String>) -> Self {
        Self {
            agents,
            default_model: default_model.into(),
            stale: false,
        }
    }

    /// `true` when [`AgentRegistry::deserialize`] assigned ids or rewrote the
    /// stored layout, so the stored text no longer matches this collection.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Clears the stale marker once the collection has been written back.
    pub fn mark_saved(&mut self) {
        self.stale = false;
    }

    /// Model assigned to agents created without one.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Adds an agent at the end of the pipeline and returns it.
    pub fn add(&mut self, config: AgentConfig) -> Agent {
        let order = self.agents.len() as i64;
        let agent = config.into_agent(new_agent_id(), order, &self.default_model);
        debug!(agent_id = %agent.id, order, "added agent");
        self.agents.push(agent.clone());
        agent
    }

    /// Replaces one field on agent `id`. Returns the updated agent, or `None`
    /// if the id is unknown.
    pub fn update(&mut self, id: &str, field: AgentField) -> Option<Agent> {
        let agent = self.agents.iter_mut().find(|a| a.id == id)?;
        debug!(agent_id = %id, field = field.name(), "updating agent");
        agent.apply(field);
        Some(agent.clone())
    }

    /// Removes agent `id`. Returns `false` if the id is unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.agents.len();
        self.agents.retain(|a| a.id != id);
        let removed = self.agents.len() != before;
        if removed {
            debug!(agent_id = %id, "removed agent");
        }
        removed
    }

    /// Clones agent `id` under a fresh id, placed at the end of the pipeline.
    pub fn duplicate(&mut self, id: &str) -> Option<Agent> {
        let source = self.get(id)?;
        let copy = Agent {
            id: new_agent_id(),
            order: self.agents.len() as i64,
            ..source.clone()
        };
        debug!(source_id = %id, agent_id = %copy.id, "duplicated agent");
        self.agents.push(copy.clone());
        Some(copy)
    }

    /// Looks up an agent by id.
    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Agents in pipeline order: ascending `order`, ties by insertion.
    pub fn list(&self) -> Vec<Agent> {
        let mut agents = self.agents.clone();
        agents.sort_by_key(|a| a.order);
        agents
    }

    /// Agents in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Returns `true` if no agents are registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Serializes the collection as a JSON array in insertion order.
    pub fn serialize(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.agents)
    }

    /// Parses a stored collection.
    ///
    /// Accepts a JSON array of agents or a settings document of the form
    /// `{"agents": [...]}`. Individual records are tolerant (see
    /// [`Agent::from_stored`]); entries that are not objects are dropped.
    /// Anything else is an error so callers can fall back to a backup.
    pub fn deserialize(raw: &str, default_model: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let from_document = value.is_object();
        let entries = match value {
            Value::Array(entries) => entries,
            Value::Object(mut doc) => match doc.remove("agents") {
                Some(Value::Array(entries)) => entries,
                _ => return Err(serde_json::Error::custom("expected an agents array")),
            },
            _ => return Err(serde_json::Error::custom("expected an agents array")),
        };

        let total = entries.len();
        let agents: Vec<Agent> = entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| Agent::from_stored(entry, position, default_model))
            .collect();

        if agents.len() != total {
            warn!(
                dropped = total - agents.len(),
                "skipped stored agent entries that are not objects"
            );
        }

        let missing_ids = entries.iter().filter(|e| !has_stored_id(e)).count();
        let mut registry = Self::from_agents(agents, default_model);
        registry.stale = from_document || missing_ids > 0;
        if registry.stale {
            debug!(missing_ids, from_document, "stored agents need rewriting");
        }
        Ok(registry)
    }
}

/// Whether `entry` carries an id that survives a reload unchanged.
fn has_stored_id(entry: &Value) -> bool {
    match entry.get("id") {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(_)) => true,
        _ => !entry.is_object(),
    }
}
