//! The relay: validate a turn, run it against the backend once, and map the
//! outcome onto the HTTP contract.

use crate::models::{ChatRequest, ChatResponse, DirectResponse, GenerationSettings};
use crate::services::backends::{BackendError, BackendReply, FinishReason, GenerativeBackend};
use crate::services::metrics::{record_backend_call, record_tokens};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use validator::Validate;

pub const INVALID_REQUEST_BODY: &str = "Invalid request body";
pub const USER_INPUT_REQUIRED: &str = "User input is required";
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";
const GENERATION_FAILED: &str = "Error generating content";

const CHAT_ROUTE: &str = "chat";
const DIRECT_ROUTE: &str = "generate_content";

#[derive(Debug, Error)]
pub enum RelayError {
    /// Rejected before any backend call was made.
    #[error("Validation error: {0}")]
    Validation(&'static str),

    #[error("Upstream error: {0}")]
    Upstream(#[from] BackendError),

    /// Backend refused the call; its own error payload is passed to the caller.
    #[error("Upstream reported error: {0}")]
    UpstreamReported(serde_json::Value),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            RelayError::Validation(message) => (StatusCode::BAD_REQUEST, json!(message)),
            RelayError::Upstream(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!(INTERNAL_SERVER_ERROR),
            ),
            RelayError::UpstreamReported(error) => (StatusCode::INTERNAL_SERVER_ERROR, error),
        };

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Stateless bridge between HTTP callers and a generative backend.
///
/// Cloning is cheap; all clones share the same backend client.
#[derive(Clone)]
pub struct RelayService {
    backend: Arc<dyn GenerativeBackend>,
    chat_settings: Arc<GenerationSettings>,
    direct_settings: Arc<GenerationSettings>,
    timeout: Duration,
}

impl RelayService {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        chat_settings: GenerationSettings,
        direct_settings: GenerationSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            chat_settings: Arc::new(chat_settings),
            direct_settings: Arc::new(direct_settings),
            timeout,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Relay one chat turn and return the generated text verbatim.
    pub async fn handle_chat(&self, request: ChatRequest) -> Result<ChatResponse, RelayError> {
        let user_input = validated_input(&request, INVALID_REQUEST_BODY)?;
        tracing::info!(input_len = user_input.len(), "incoming chat request");

        let reply = self
            .call_backend(CHAT_ROUTE, user_input, &self.chat_settings)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, backend = self.backend.name(), "Error in chat endpoint");
                RelayError::Upstream(e)
            })?;

        let text = extract_text(reply).map_err(|e| {
            tracing::error!(error = %e, backend = self.backend.name(), "Unusable chat reply");
            RelayError::Upstream(e)
        })?;

        Ok(ChatResponse { response: text })
    }

    /// Relay one turn and hand back the backend's raw response body.
    pub async fn generate_content_direct(
        &self,
        request: ChatRequest,
    ) -> Result<DirectResponse, RelayError> {
        let user_input = validated_input(&request, USER_INPUT_REQUIRED)?;
        tracing::info!(input_len = user_input.len(), "incoming generate-content request");

        match self
            .call_backend(DIRECT_ROUTE, user_input, &self.direct_settings)
            .await
        {
            Ok(reply) => Ok(DirectResponse {
                response: reply.raw,
            }),
            Err(BackendError::Rejected { status, body }) => {
                tracing::error!(status, body = %body, "Backend rejected generate-content request");
                let error = body
                    .get("error")
                    .cloned()
                    .unwrap_or_else(|| json!(GENERATION_FAILED));
                Err(RelayError::UpstreamReported(error))
            }
            Err(e) => {
                tracing::error!(error = %e, backend = self.backend.name(), "Error in /generate-content");
                Err(RelayError::Upstream(e))
            }
        }
    }

    /// Exactly one attempt, bounded by the configured timeout.
    async fn call_backend(
        &self,
        route: &'static str,
        prompt: &str,
        settings: &GenerationSettings,
    ) -> Result<BackendReply, BackendError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.backend.generate(prompt, settings))
            .await
            .unwrap_or_else(|_| Err(BackendError::Timeout(self.timeout)));

        let outcome = match &result {
            Ok(_) => "success",
            Err(BackendError::Timeout(_)) => "timeout",
            Err(BackendError::Rejected { .. }) => "rejected",
            Err(_) => "error",
        };
        record_backend_call(route, outcome, started.elapsed());
        if let Ok(reply) = &result {
            tracing::debug!(
                input_tokens = reply.input_tokens,
                output_tokens = reply.output_tokens,
                "Backend call completed"
            );
            record_tokens(route, self.backend.name(), reply.input_tokens, reply.output_tokens);
        }

        result
    }
}

fn validated_input<'a>(
    request: &'a ChatRequest,
    message: &'static str,
) -> Result<&'a str, RelayError> {
    request
        .validate()
        .map_err(|_| RelayError::Validation(message))?;
    request
        .user_input
        .as_deref()
        .ok_or(RelayError::Validation(message))
}

fn extract_text(reply: BackendReply) -> Result<String, BackendError> {
    if let Some(reason) = reply.shape_error {
        return Err(BackendError::Malformed(reason));
    }
    if let Some(reason) = reply.block_reason {
        return Err(BackendError::Blocked(format!("prompt blocked: {}", reason)));
    }
    match reply.finish_reason {
        FinishReason::Safety => {
            return Err(BackendError::Blocked("candidate blocked".to_string()));
        }
        FinishReason::Recitation => {
            return Err(BackendError::Blocked("candidate stopped for recitation".to_string()));
        }
        _ => {}
    }

    reply
        .text
        .ok_or_else(|| BackendError::Malformed("reply contained no text".to_string()))
}
