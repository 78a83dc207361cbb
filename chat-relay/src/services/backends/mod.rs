//! Generative backend abstraction and its transport strategies.
//!
//! Every strategy answers the same single-turn contract, so the relay can be
//! pointed at the live Gemini API or at a local mock purely through config.

pub mod gemini;
pub mod mock;

use crate::models::GenerationSettings;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for backend calls.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The backend answered with a non-success status.
    #[error("Backend rejected request with status {status}: {body}")]
    Rejected {
        status: u16,
        body: serde_json::Value,
    },

    #[error("Malformed backend response: {0}")]
    Malformed(String),

    #[error("Response blocked by safety filter: {0}")]
    Blocked(String),
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    Safety,
    /// Stopped because the candidate reproduced source material.
    Recitation,
    Other,
}

impl FinishReason {
    pub fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            None | Some("STOP") => FinishReason::Complete,
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => {
                FinishReason::Safety
            }
            Some("RECITATION") => FinishReason::Recitation,
            Some(_) => FinishReason::Other,
        }
    }
}

/// Successful backend answer.
#[derive(Debug, Clone)]
pub struct BackendReply {
    /// Concatenated text parts of the first candidate.
    pub text: Option<String>,

    pub finish_reason: FinishReason,

    /// Set when the prompt itself was refused before any candidate was produced.
    pub block_reason: Option<String>,

    /// Set when the body was valid JSON but not a recognisable generation result.
    pub shape_error: Option<String>,

    pub input_tokens: i32,

    pub output_tokens: i32,

    /// Response body exactly as the backend sent it.
    pub raw: serde_json::Value,
}

impl BackendReply {
    /// A 2xx body that could not be read as a generation result.
    pub fn unparsed(raw: serde_json::Value, reason: impl Into<String>) -> Self {
        Self {
            text: None,
            finish_reason: FinishReason::Other,
            block_reason: None,
            shape_error: Some(reason.into()),
            input_tokens: 0,
            output_tokens: 0,
            raw,
        }
    }
}

/// A single history-free generation turn.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Submit `prompt` as the only message of a fresh conversation.
    async fn generate(
        &self,
        prompt: &str,
        settings: &GenerationSettings,
    ) -> Result<BackendReply, BackendError>;

    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;
}

/// Transport strategy selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gemini,
    Mock,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Gemini => f.write_str("gemini"),
            BackendKind::Mock => f.write_str("mock"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(BackendKind::Gemini),
            "mock" => Ok(BackendKind::Mock),
            other => Err(format!(
                "unknown backend '{}', expected 'gemini' or 'mock'",
                other
            )),
        }
    }
}
