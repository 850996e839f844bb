//! Runtime settings resolved from the environment.

use std::time::Duration;

use thiserror::Error;

/// Environment variable for the provider API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable for the provider base URL.
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Environment variable for the default agent model.
pub const MODEL_ENV: &str = "WORKIRON_MODEL";

/// Environment variable for the run poll interval in milliseconds.
pub const POLL_INTERVAL_ENV: &str = "WORKIRON_POLL_INTERVAL_MS";

/// Environment variable for the maximum number of run status polls.
pub const POLL_MAX_ATTEMPTS_ENV: &str = "WORKIRON_POLL_MAX_ATTEMPTS";

/// Default provider endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for newly created agents and the classifier.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 120;

/// Errors raised while reading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value found.
        value: String,
    },
}

/// Settings shared by every WorkIron interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Provider API key, if configured.
    pub api_key: Option<String>,
    /// Provider base URL (no trailing slash).
    pub base_url: String,
    /// Model used by the classifier and as the default for new agents.
    pub model: String,
    /// Delay between run status polls.
    pub poll_interval: Duration,
    /// Maximum number of run status polls before giving up.
    pub poll_max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

impl Settings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        settings.api_key = non_empty(API_KEY_ENV);
        if let Some(url) = non_empty(BASE_URL_ENV) {
            settings.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty(MODEL_ENV) {
            settings.model = model;
        }
        if let Some(raw) = non_empty(POLL_INTERVAL_ENV) {
            let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: POLL_INTERVAL_ENV,
                value: raw.clone(),
            })?;
            settings.poll_interval = Duration::from_millis(millis);
        }
        if let Some(raw) = non_empty(POLL_MAX_ATTEMPTS_ENV) {
            settings.poll_max_attempts = raw
                .trim()
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: POLL_MAX_ATTEMPTS_ENV,
                    value: raw.clone(),
                })?;
        }

        Ok(settings)
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the maximum number of polls.
    pub fn with_poll_max_attempts(mut self, attempts: u32) -> Self {
        self.poll_max_attempts = attempts.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.poll_max_attempts, 120);
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_reads_all_variables() {
        let settings = Settings::from_lookup(lookup(&[
            (API_KEY_ENV, "sk-test"),
            (BASE_URL_ENV, "http://localhost:8080/v1/"),
            (MODEL_ENV, "gpt-4o"),
            (POLL_INTERVAL_ENV, "250"),
            (POLL_MAX_ATTEMPTS_ENV, "10"),
        ]))
        .unwrap();

        assert_eq!(settings.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.base_url, "http://localhost:8080/v1");
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.poll_max_attempts, 10);
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let settings = Settings::from_lookup(lookup(&[(API_KEY_ENV, "  ")])).unwrap();
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let err = Settings::from_lookup(lookup(&[(POLL_INTERVAL_ENV, "soon")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for WORKIRON_POLL_INTERVAL_MS: \"soon\""
        );

        let err = Settings::from_lookup(lookup(&[(POLL_MAX_ATTEMPTS_ENV, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name, .. } if name == POLL_MAX_ATTEMPTS_ENV));
    }

    #[test]
    fn test_builders() {
        let settings = Settings::default()
            .with_api_key("key")
            .with_model("m")
            .with_poll_interval(Duration::from_millis(5))
            .with_poll_max_attempts(0);

        assert_eq!(settings.api_key.as_deref(), Some("key"));
        assert_eq!(settings.model, "m");
        assert_eq!(settings.poll_interval, Duration::from_millis(5));
        assert_eq!(settings.poll_max_attempts, 1);
    }
}
