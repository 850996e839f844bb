//! Complexity routing: decide whether a query needs the whole agent chain.
//!
//! Cheap local heuristics settle the common cases; only ambiguous queries go
//! to the remote classifier. The order is fixed and the first match wins:
//!
//! 1. User override patterns (`force_simple`, then `force_complex`)
//! 2. Forced simple: introductions, three words or fewer, bare greetings
//! 3. Forced complex: a whole-word technical term
//! 4. Remote verdict `{"isComplex": bool}`
//! 5. Remote unavailable or unparsable: technical-term presence alone

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::completion::{MessageRole, ThreadId, WorkerSpec};
use crate::error::CompletionError;
use crate::protocol::CompletionProtocol;

/// Technical vocabulary forcing a complex verdict.
pub const TECHNICAL_TERMS: &[&str] = &[
    "code",
    "program",
    "function",
    "error",
    "debug",
    "database",
    "api",
    "server",
    "implement",
    "algorithm",
    "optimize",
    "architecture",
    "security",
    "performance",
    "integration",
];

/// Whole-query greetings and closings forcing a simple verdict.
const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "hiya",
    "yo",
    "good morning",
    "good afternoon",
    "good evening",
    "thanks",
    "thank you",
    "thx",
    "ty",
    "bye",
    "goodbye",
    "good bye",
    "see you",
    "cheers",
    "ok",
    "okay",
];

const INTRODUCTION_PATTERN: &str = r"(?i)\b(?:my name is|call me|i am called|i'm called)\b";

const CLASSIFIER_INSTRUCTIONS: &str = "You classify user queries for a multi-agent assistant. \
A query is complex when answering it well benefits from several expert passes (drafting, \
reviewing, refining); it is simple when one direct answer suffices. \
Respond with exactly one JSON object and nothing else: {\"isComplex\": true} or {\"isComplex\": false}.";

const CLASSIFIER_WORKER_NAME: &str = "complexity-classifier";

fn technical_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"(?i)\b(?:{})\b", TECHNICAL_TERMS.join("|"));
        Regex::new(&pattern).expect("technical term pattern is valid")
    })
}

fn introduction_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(INTRODUCTION_PATTERN).expect("introduction pattern is valid"))
}

/// Routing verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Primary agent only.
    Simple,
    /// Full agent chain.
    Complex,
}

impl Complexity {
    fn from_flag(is_complex: bool) -> Self {
        if is_complex {
            Self::Complex
        } else {
            Self::Simple
        }
    }
}

/// Which rule produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// A user override pattern.
    Override,
    /// A built-in local heuristic.
    Heuristic,
    /// The remote classifier.
    Remote,
    /// Technical-term fallback after a remote failure.
    Fallback,
}

/// Classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// The verdict.
    pub complexity: Complexity,
    /// Rule that produced it.
    pub source: VerdictSource,
}

impl Classification {
    fn new(complexity: Complexity, source: VerdictSource) -> Self {
        Self { complexity, source }
    }

    /// Returns `true` for a simple verdict.
    pub fn is_simple(&self) -> bool {
        self.complexity == Complexity::Simple
    }
}

/// User-supplied patterns that force a verdict.
///
/// Patterns are case-insensitive regular expressions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierOverrides {
    /// Patterns forcing a simple verdict.
    pub force_simple: Vec<String>,
    /// Patterns forcing a complex verdict.
    pub force_complex: Vec<String>,
}

impl ClassifierOverrides {
    /// Returns `true` if no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.force_simple.is_empty() && self.force_complex.is_empty()
    }

    fn matches(patterns: &[String], query: &str) -> bool {
        patterns.iter().any(|pattern| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => re.is_match(query),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "ignoring invalid classifier override");
                    false
                }
            }
        })
    }
}

/// Returns `true` if `query` contains a whole-word technical term.
pub fn has_technical_term(query: &str) -> bool {
    technical_regex().is_match(query)
}

fn is_greeting(query: &str) -> bool {
    let normalized = query
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase();
    GREETINGS.contains(&normalized.as_str())
}

/// Applies overrides and the local heuristics. `None` means undecided.
pub fn classify_locally(query: &str, overrides: &ClassifierOverrides) -> Option<Classification> {
    if ClassifierOverrides::matches(&overrides.force_simple, query) {
        return Some(Classification::new(Complexity::Simple, VerdictSource::Override));
    }
    if ClassifierOverrides::matches(&overrides.force_complex, query) {
        return Some(Classification::new(Complexity::Complex, VerdictSource::Override));
    }

    if introduction_regex().is_match(query)
        || query.split_whitespace().count() <= 3
        || is_greeting(query)
    {
        return Some(Classification::new(Complexity::Simple, VerdictSource::Heuristic));
    }

    if has_technical_term(query) {
        return Some(Classification::new(Complexity::Complex, VerdictSource::Heuristic));
    }

    None
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoteVerdict {
    #[serde(rename = "isComplex")]
    is_complex: bool,
}

/// Parses the strict `{"isComplex": bool}` reply, tolerating a code fence.
pub fn parse_remote_verdict(reply: &str) -> Option<bool> {
    let mut body = reply.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = rest.strip_suffix("```")?.trim();
    }
    serde_json::from_str::<RemoteVerdict>(body)
        .ok()
        .map(|v| v.is_complex)
}

/// Classifies queries, consulting the remote classifier when heuristics are undecided.
#[derive(Clone)]
pub struct ComplexityClassifier {
    protocol: CompletionProtocol,
    model: String,
}

impl ComplexityClassifier {
    /// Creates a classifier running remote checks on `model`.
    pub fn new(protocol: CompletionProtocol, model: impl Into<String>) -> Self {
        Self {
            protocol,
            model: model.into(),
        }
    }

    /// Classifies `query`. Never fails: remote problems fall back to the
    /// technical-term heuristic.
    pub async fn classify(&self, query: &str, overrides: &ClassifierOverrides) -> Classification {
        if let Some(verdict) = classify_locally(query, overrides) {
            debug!(?verdict, "classified locally");
            return verdict;
        }

        match self.classify_remotely(query).await {
            Ok(is_complex) => {
                let verdict =
                    Classification::new(Complexity::from_flag(is_complex), VerdictSource::Remote);
                debug!(?verdict, "classified remotely");
                verdict
            }
            Err(e) => {
                warn!(error = %e, "remote classification failed, using technical-term fallback");
                Classification::new(
                    Complexity::from_flag(has_technical_term(query)),
                    VerdictSource::Fallback,
                )
            }
        }
    }

    /// Asks the provider on a dedicated thread with a fresh worker, so
    /// classification never lands in the session conversation. The thread is
    /// deleted afterwards whatever the outcome.
    async fn classify_remotely(&self, query: &str) -> Result<bool, CompletionError> {
        let client = self.protocol.client();
        let thread = client.create_thread().await?;
        let verdict = self.ask(&thread, query).await;

        if let Err(e) = client.delete_thread(&thread).await {
            warn!(thread_id = %thread, error = %e, "failed to delete classifier thread");
        }
        verdict
    }

    async fn ask(&self, thread: &ThreadId, query: &str) -> Result<bool, CompletionError> {
        self.protocol
            .client()
            .post_message(thread, MessageRole::User, query)
            .await?;

        let worker = WorkerSpec {
            name: CLASSIFIER_WORKER_NAME.to_string(),
            instructions: CLASSIFIER_INSTRUCTIONS.to_string(),
            model: self.model.clone(),
            temperature: 0.0,
            max_tokens: Some(20),
        };
        let reply = self.protocol.complete(thread, &worker).await?;

        parse_remote_verdict(&reply)
            .ok_or_else(|| CompletionError::Parse(format!("unexpected classifier reply: {reply:?}")))
    }
}
