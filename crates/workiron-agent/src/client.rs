//! HTTP client for the OpenAI Assistants (v2) job API.
//!
//! Maps the [`CompletionClient`] boundary onto:
//! - `POST /threads`, `POST /threads/{id}/messages`, `GET /threads/{id}/messages`
//! - `POST /assistants`, `DELETE /assistants/{id}`
//! - `POST /threads/{id}/runs`, `GET /threads/{id}/runs/{run_id}`

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use workiron_core::Settings;

use crate::completion::{
    CompletionClient, CompletionResult, MessageRole, RunId, RunStatus, ThreadId, WorkerId,
    WorkerSpec,
};
use crate::error::CompletionError;

/// Beta header required by the Assistants API.
const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Assistants API client.
#[derive(Clone)]
pub struct AssistantsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AssistantsClient {
    /// Create a new client for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a client from shared settings.
    ///
    /// Fails if no API key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, CompletionError> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            CompletionError::Configuration(format!(
                "missing {} environment variable",
                workiron_core::settings::API_KEY_ENV
            ))
        })?;
        Ok(Self::new(api_key, settings.base_url.clone()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends a request and decodes the JSON body.
    ///
    /// A 404 on a thread-scoped request is reported as
    /// [`CompletionError::ThreadNotFound`].
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        thread: Option<&ThreadId>,
    ) -> CompletionResult<T> {
        let response = request
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND {
                if let Some(thread) = thread {
                    return Err(CompletionError::ThreadNotFound(thread.to_string()));
                }
            }
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| CompletionError::Parse(e.to_string()))
    }
}

#[async_trait]
impl CompletionClient for AssistantsClient {
    async fn create_thread(&self) -> CompletionResult<ThreadId> {
        let request = self.client.post(self.url("threads")).json(&serde_json::json!({}));
        let thread: ObjectRef = self.send(request, None).await?;
        debug!(thread_id = %thread.id, "created thread");
        Ok(ThreadId::new(thread.id))
    }

    async fn post_message(
        &self,
        thread: &ThreadId,
        role: MessageRole,
        content: &str,
    ) -> CompletionResult<()> {
        let body = CreateMessageRequest {
            role: role.as_str(),
            content,
        };
        let request = self
            .client
            .post(self.url(&format!("threads/{}/messages", thread)))
            .json(&body);
        let message: ObjectRef = self.send(request, Some(thread)).await?;
        trace!(thread_id = %thread, message_id = %message.id, "posted message");
        Ok(())
    }

    async fn create_worker(&self, spec: &WorkerSpec) -> CompletionResult<WorkerId> {
        let body = CreateAssistantRequest {
            model: &spec.model,
            name: &spec.name,
            instructions: &spec.instructions,
            temperature: spec.temperature,
        };
        let request = self.client.post(self.url("assistants")).json(&body);
        let assistant: ObjectRef = self.send(request, None).await?;
        Ok(WorkerId::new(assistant.id))
    }

    async fn create_run(
        &self,
        thread: &ThreadId,
        worker: &WorkerId,
        max_tokens: Option<u32>,
    ) -> CompletionResult<RunId> {
        let body = CreateRunRequest {
            assistant_id: worker.as_str(),
            max_completion_tokens: max_tokens,
        };
        let request = self
            .client
            .post(self.url(&format!("threads/{}/runs", thread)))
            .json(&body);
        let run: RunObject = self.send(request, Some(thread)).await?;
        Ok(RunId::new(run.id))
    }

    async fn run_status(&self, thread: &ThreadId, run: &RunId) -> CompletionResult<RunStatus> {
        let request = self
            .client
            .get(self.url(&format!("threads/{}/runs/{}", thread, run)));
        let run: RunObject = self.send(request, Some(thread)).await?;
        Ok(run.status())
    }

    async fn latest_message(&self, thread: &ThreadId) -> CompletionResult<Option<String>> {
        let request = self
            .client
            .get(self.url(&format!("threads/{}/messages", thread)))
            .query(&[("order", "desc"), ("limit", "1")]);
        let list: MessageList = self.send(request, Some(thread)).await?;
        Ok(list.latest_text())
    }

    async fn delete_worker(&self, worker: &WorkerId) -> CompletionResult<()> {
        let request = self
            .client
            .delete(self.url(&format!("assistants/{}", worker)));
        let _: serde_json::Value = self.send(request, None).await?;
        Ok(())
    }

    async fn delete_thread(&self, thread: &ThreadId) -> CompletionResult<()> {
        let request = self.client.delete(self.url(&format!("threads/{}", thread)));
        let _: serde_json::Value = self.send(request, Some(thread)).await?;
        debug!(thread_id = %thread, "deleted thread");
        Ok(())
    }
}

/// Extracts `error.message` from a provider error body, or returns the body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Any API object where only the id matters.
#[derive(Debug, Deserialize)]
struct ObjectRef {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateAssistantRequest<'a> {
    model: &'a str,
    name: &'a str,
    instructions: &'a str,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

/// Run object as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct RunObject {
    /// Run id.
    pub id: String,
    /// Raw status string.
    pub status: String,
    /// Error details for failed runs.
    #[serde(default)]
    pub last_error: Option<RunError>,
    /// Details for incomplete runs.
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
}

/// Error attached to a failed run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunError {
    /// Error code, e.g. `server_error`.
    pub code: Option<String>,
    /// Human-readable message.
    pub message: Option<String>,
}

/// Reason attached to an incomplete run.
#[derive(Debug, Clone, Deserialize)]
pub struct IncompleteDetails {
    /// Reason, e.g. `max_completion_tokens`.
    pub reason: Option<String>,
}

impl RunObject {
    /// Maps the raw status onto the provider-neutral [`RunStatus`].
    pub fn status(&self) -> RunStatus {
        match self.status.as_str() {
            "completed" => RunStatus::Completed,
            "queued" | "in_progress" | "cancelling" => RunStatus::Pending,
            "failed" => RunStatus::Failed(self.last_error.as_ref().and_then(|e| {
                e.message.clone().or_else(|| e.code.clone())
            })),
            "incomplete" => RunStatus::Failed(Some(
                self.incomplete_details
                    .as_ref()
                    .and_then(|d| d.reason.clone())
                    .map_or_else(|| "incomplete".to_string(), |r| format!("incomplete: {}", r)),
            )),
            other @ ("cancelled" | "expired" | "requires_action") => {
                RunStatus::Failed(Some(other.to_string()))
            }
            other => {
                debug!(status = other, "unrecognized run status, treating as pending");
                RunStatus::Pending
            }
        }
    }
}

/// Message list page.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageList {
    /// Messages, newest first when requested with `order=desc`.
    pub data: Vec<ThreadMessage>,
}

impl MessageList {
    /// First text part of the newest message.
    pub fn latest_text(&self) -> Option<String> {
        self.data.first()?.content.iter().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.value.clone()),
            ContentPart::Other => None,
        })
    }
}

/// A thread message.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    /// Message id.
    pub id: String,
    /// Author role.
    pub role: String,
    /// Content parts.
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

/// One content part of a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content.
    Text {
        /// Text payload.
        text: TextContent,
    },
    /// Images, files and anything else the pipeline ignores.
    #[serde(other)]
    Other,
}

/// Text payload of a content part.
#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    /// The text.
    pub value: String,
}
