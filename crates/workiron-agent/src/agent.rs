//! Agent persona configuration.
//!
//! An [`Agent`] is one step of the pipeline: a role, its instructions and the
//! sampling parameters used when its worker is created on the provider.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default response token budget.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Upper bound for the response token budget.
pub const MAX_TOKENS_LIMIT: u32 = 4000;

/// Upper bound for the sampling temperature.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Generates a fresh opaque agent id.
pub fn new_agent_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Clamps a temperature into `[0, 2]`, replacing non-finite values with the default.
pub fn clamp_temperature(temperature: f32) -> f32 {
    if temperature.is_finite() {
        temperature.clamp(0.0, MAX_TEMPERATURE)
    } else {
        DEFAULT_TEMPERATURE
    }
}

/// Clamps a token budget into `[1, 4000]`.
pub fn clamp_max_tokens(max_tokens: u32) -> u32 {
    max_tokens.clamp(1, MAX_TOKENS_LIMIT)
}

/// A configured agent persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Opaque unique identifier.
    pub id: String,

    /// Display name (may be empty).
    pub name: String,

    /// Role label, e.g. "Reviewer".
    pub role: String,

    /// System-prompt text.
    pub instructions: String,

    /// Provider model identifier.
    pub model: String,

    /// Sampling temperature in `[0, 2]`.
    pub temperature: f32,

    /// Response token budget in `[1, 4000]`.
    pub max_tokens: u32,

    /// Pipeline position; ties are broken by insertion order.
    pub order: i64,
}

impl Agent {
    /// Returns `true` when both role and instructions are filled in.
    ///
    /// Unconfigured agents are skipped by the pipeline.
    pub fn is_configured(&self) -> bool {
        !self.role.trim().is_empty() && !self.instructions.trim().is_empty()
    }

    /// Label used in logs and result headers.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.role
        } else {
            &self.name
        }
    }

    /// Applies a single-field update, clamping numeric fields into range.
    pub fn apply(&mut self, field: AgentField) {
        match field {
            AgentField::Name(v) => self.name = v,
            AgentField::Role(v) => self.role = v,
            AgentField::Instructions(v) => self.instructions = v,
            AgentField::Model(v) => self.model = v,
            AgentField::Temperature(v) => self.temperature = clamp_temperature(v),
            AgentField::MaxTokens(v) => self.max_tokens = clamp_max_tokens(v),
            AgentField::Order(v) => self.order = v,
        }
    }

    /// Builds an agent from a loosely-typed stored record.
    ///
    /// Missing or mistyped fields fall back to the same defaults as a fresh
    /// agent: a new id, `position` as order, empty text fields. Returns `None`
    /// if `value` is not a JSON object.
    pub fn from_stored(value: &Value, position: usize, default_model: &str) -> Option<Self> {
        let record = value.as_object()?;
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| record.get(*k).and_then(Value::as_str))
                .map(str::to_string)
        };
        let number = |keys: &[&str]| keys.iter().find_map(|k| record.get(*k).and_then(Value::as_f64));

        let id = match record.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => new_agent_id(),
        };

        Some(Self {
            id,
            name: text(&["name"]).unwrap_or_default(),
            role: text(&["role"]).unwrap_or_default(),
            instructions: text(&["instructions", "systemPrompt"]).unwrap_or_default(),
            model: text(&["model"])
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| default_model.to_string()),
            temperature: number(&["temperature"])
                .map(|t| clamp_temperature(t as f32))
                .unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: number(&["maxTokens", "max_tokens"])
                .filter(|n| n.is_finite())
                .map(|n| clamp_max_tokens(n.max(0.0).min(u32::MAX as f64) as u32))
                .unwrap_or(DEFAULT_MAX_TOKENS),
            order: number(&["order"])
                .filter(|n| n.is_finite())
                .map(|n| n as i64)
                .unwrap_or(position as i64),
        })
    }
}

/// Configuration for a new agent. Unset fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Display name.
    pub name: Option<String>,
    /// Role label.
    pub role: Option<String>,
    /// System-prompt text.
    #[serde(alias = "systemPrompt")]
    pub instructions: Option<String>,
    /// Provider model identifier.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Response token budget.
    pub max_tokens: Option<u32>,
}

impl AgentConfig {
    /// Creates a config with a role and instructions.
    pub fn new(role: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            instructions: Some(instructions.into()),
            ..Default::default()
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Materializes the config into an agent.
    pub fn into_agent(self, id: String, order: i64, default_model: &str) -> Agent {
        Agent {
            id,
            name: self.name.unwrap_or_default(),
            role: self.role.unwrap_or_default(),
            instructions: self.instructions.unwrap_or_default(),
            model: self
                .model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| default_model.to_string()),
            temperature: self
                .temperature
                .map(clamp_temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self
                .max_tokens
                .map(clamp_max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            order,
        }
    }
}

/// A single-field agent update.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentField {
    /// Display name.
    Name(String),
    /// Role label.
    Role(String),
    /// System-prompt text.
    Instructions(String),
    /// Provider model.
    Model(String),
    /// Sampling temperature.
    Temperature(f32),
    /// Token budget.
    MaxTokens(u32),
    /// Pipeline position.
    Order(i64),
}

impl AgentField {
    /// Parses a field name and textual value, e.g. `("temperature", "0.2")`.
    ///
    /// Accepts camelCase, snake_case and kebab-case spellings.
    pub fn parse(field: &str, value: &str) -> Result<Self> {
        let invalid = || AgentError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        };
        let normalized: String = field
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "name" => Ok(Self::Name(value.to_string())),
            "role" => Ok(Self::Role(value.to_string())),
            "instructions" | "systemprompt" | "prompt" => Ok(Self::Instructions(value.to_string())),
            "model" => Ok(Self::Model(value.to_string())),
            "temperature" | "temp" => {
                let t: f32 = value.trim().parse().map_err(|_| invalid())?;
                if t.is_finite() {
                    Ok(Self::Temperature(t))
                } else {
                    Err(invalid())
                }
            }
            "maxtokens" => value
                .trim()
                .parse()
                .map(Self::MaxTokens)
                .map_err(|_| invalid()),
            "order" => value.trim().parse().map(Self::Order).map_err(|_| invalid()),
            _ => Err(AgentError::UnknownField(field.to_string())),
        }
    }

    /// Canonical field name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Role(_) => "role",
            Self::Instructions(_) => "instructions",
            Self::Model(_) => "model",
            Self::Temperature(_) => "temperature",
            Self::MaxTokens(_) => "maxTokens",
            Self::Order(_) => "order",
        }
    }
}
