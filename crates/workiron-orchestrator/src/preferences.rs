//! Session preferences and their storage keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use workiron_agent::ClassifierOverrides;
use workiron_persistence::SessionStateStore;

use crate::error::OrchestratorError;

/// Key of the `show_all_responses` flag.
pub const SHOW_ALL_RESPONSES_KEY: &str = "showAllResponses";
/// Key of the `use_all_agents` flag.
pub const USE_ALL_AGENTS_KEY: &str = "useAllAgents";
/// Key of the `complexity_routing` flag.
pub const COMPLEXITY_ROUTING_KEY: &str = "complexityRouting";
/// Key of the classifier override document.
pub const CLASSIFIER_OVERRIDES_KEY: &str = "classifierOverrides";

/// Pipeline behaviour switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Emit every agent's result instead of only the first and last.
    pub show_all_responses: bool,
    /// Run the whole chain instead of only the first agent.
    pub use_all_agents: bool,
    /// Ask the complexity classifier before running the chain.
    pub complexity_routing: bool,
    /// Patterns forcing a classifier verdict.
    pub classifier_overrides: ClassifierOverrides,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            show_all_responses: false,
            use_all_agents: true,
            complexity_routing: false,
            classifier_overrides: ClassifierOverrides::default(),
        }
    }
}

impl Preferences {
    /// Reads preferences, falling back to defaults for anything missing or unreadable.
    pub fn load(state: &SessionStateStore) -> Self {
        let defaults = Self::default();
        let classifier_overrides = match state.load(CLASSIFIER_OVERRIDES_KEY) {
            Ok(Some(overrides)) => overrides,
            Ok(None) => defaults.classifier_overrides,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable classifier overrides");
                ClassifierOverrides::default()
            }
        };

        Self {
            show_all_responses: state.load_flag(SHOW_ALL_RESPONSES_KEY, defaults.show_all_responses),
            use_all_agents: state.load_flag(USE_ALL_AGENTS_KEY, defaults.use_all_agents),
            complexity_routing: state.load_flag(COMPLEXITY_ROUTING_KEY, defaults.complexity_routing),
            classifier_overrides,
        }
    }

    /// Writes every preference.
    pub fn save(&self, state: &SessionStateStore) -> workiron_persistence::Result<()> {
        for flag in PreferenceFlag::ALL {
            state.save_flag(flag.key(), self.get(flag))?;
        }
        state.save(CLASSIFIER_OVERRIDES_KEY, &self.classifier_overrides)
    }

    /// Reads one flag.
    pub fn get(&self, flag: PreferenceFlag) -> bool {
        match flag {
            PreferenceFlag::ShowAllResponses => self.show_all_responses,
            PreferenceFlag::UseAllAgents => self.use_all_agents,
            PreferenceFlag::ComplexityRouting => self.complexity_routing,
        }
    }

    /// Sets one flag.
    pub fn set(&mut self, flag: PreferenceFlag, value: bool) {
        match flag {
            PreferenceFlag::ShowAllResponses => self.show_all_responses = value,
            PreferenceFlag::UseAllAgents => self.use_all_agents = value,
            PreferenceFlag::ComplexityRouting => self.complexity_routing = value,
        }
    }
}

/// Boolean preference addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceFlag {
    ShowAllResponses,
    UseAllAgents,
    ComplexityRouting,
}

impl PreferenceFlag {
    /// All flags, in display order.
    pub const ALL: [PreferenceFlag; 3] = [
        PreferenceFlag::ShowAllResponses,
        PreferenceFlag::UseAllAgents,
        PreferenceFlag::ComplexityRouting,
    ];

    /// Storage key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ShowAllResponses => SHOW_ALL_RESPONSES_KEY,
            Self::UseAllAgents => USE_ALL_AGENTS_KEY,
            Self::ComplexityRouting => COMPLEXITY_ROUTING_KEY,
        }
    }
}

impl fmt::Display for PreferenceFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShowAllResponses => write!(f, "show-all-responses"),
            Self::UseAllAgents => write!(f, "use-all-agents"),
            Self::ComplexityRouting => write!(f, "complexity-routing"),
        }
    }
}

impl FromStr for PreferenceFlag {
    type Err = OrchestratorError;

    /// Accepts kebab, snake or camel case: `show-all-responses`,
    /// `show_all_responses`, `showAllResponses`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "showallresponses" | "showall" => Ok(Self::ShowAllResponses),
            "useallagents" | "useall" => Ok(Self::UseAllAgents),
            "complexityrouting" | "routing" => Ok(Self::ComplexityRouting),
            _ => Err(OrchestratorError::UnknownPreference(s.to_string())),
        }
    }
}
