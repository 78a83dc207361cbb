//! Mock backend for local development without an API key.

use super::{BackendError, BackendReply, FinishReason, GenerativeBackend};
use crate::models::GenerationSettings;
use async_trait::async_trait;
use serde_json::json;

/// Echoes the prompt back in a Gemini-shaped body.
pub struct MockBackend;

#[async_trait]
impl GenerativeBackend for MockBackend {
    async fn generate(
        &self,
        prompt: &str,
        settings: &GenerationSettings,
    ) -> Result<BackendReply, BackendError> {
        let text = format!("Mock response for: {}", prompt);
        let input_tokens = (prompt.len() / 4) as i32;
        let output_tokens = ((text.len() / 4) as i32).min(settings.parameters.max_output_tokens);

        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": input_tokens,
                "candidatesTokenCount": output_tokens,
                "totalTokenCount": input_tokens + output_tokens
            }
        });

        Ok(BackendReply {
            text: Some(text),
            finish_reason: FinishReason::Complete,
            block_reason: None,
            shape_error: None,
            input_tokens,
            output_tokens,
            raw,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
