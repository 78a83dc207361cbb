//! Gemini backend.
//!
//! Calls `models/{model}:generateContent` over REST with an empty history, so
//! every call is an independent turn.

use super::{BackendError, BackendReply, FinishReason, GenerativeBackend};
use crate::models::{GenerationSettings, SafetySetting};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Public Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini backend configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

pub struct GeminiBackend {
    config: GeminiConfig,
    client: Client,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { config, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn build_request(prompt: &str, settings: &GenerationSettings) -> GenerateContentRequest {
        let params = &settings.parameters;
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
                max_output_tokens: params.max_output_tokens,
            },
            safety_settings: settings.safety_settings.clone(),
        }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(
        &self,
        prompt: &str,
        settings: &GenerationSettings,
    ) -> Result<BackendReply, BackendError> {
        let request = Self::build_request(prompt, settings);

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            safety_settings = settings.safety_settings.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url("generateContent"))
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(self.config.timeout)
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !status.is_success() {
            let body = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| BackendError::Malformed(format!("response is not JSON: {}", e)))?;
        match serde_json::from_value::<GenerateContentResponse>(raw.clone()) {
            Ok(parsed) => Ok(parsed.into_reply(raw)),
            Err(e) => {
                tracing::warn!(error = %e, "Gemini response has an unexpected shape");
                Ok(BackendReply::unparsed(raw, format!("unexpected response shape: {}", e)))
            }
        }
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

impl GenerateContentResponse {
    fn into_reply(self, raw: serde_json::Value) -> BackendReply {
        let first = self.candidates.first();

        let text = first.and_then(|c| {
            let text: String = c
                .content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect();
            (!text.is_empty()).then_some(text)
        });

        let finish_reason = first
            .map(|c| FinishReason::from_wire(c.finish_reason.as_deref()))
            .unwrap_or(FinishReason::Other);

        let usage = self.usage_metadata.unwrap_or_default();

        BackendReply {
            text,
            finish_reason,
            block_reason: self.prompt_feedback.and_then(|f| f.block_reason),
            shape_error: None,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerationParameters, HarmBlockThreshold, HarmCategory};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

    fn backend_for(server: &MockServer) -> GeminiBackend {
        GeminiBackend::new(GeminiConfig {
            api_key: Secret::new("test-key".to_string()),
            model: "gemini-1.5-flash".to_string(),
            base_url: format!("{}/v1beta", server.uri()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn chat_settings() -> GenerationSettings {
        GenerationSettings::new(
            GenerationParameters::CHAT,
            vec![SafetySetting {
                category: HarmCategory::HarmCategoryHarassment,
                threshold: HarmBlockThreshold::BlockMediumAndAbove,
            }],
        )
    }

    fn reply_body(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 4, "totalTokenCount": 7}
        })
    }

    #[test]
    fn test_request_uses_documented_schema() {
        let request = GeminiBackend::build_request("hello", &chat_settings());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["contents"].as_array().unwrap().len(), 1);
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(json["safetySettings"][0]["category"], "HARM_CATEGORY_HARASSMENT");
        assert_eq!(
            json["safetySettings"][0]["threshold"],
            "BLOCK_MEDIUM_AND_ABOVE"
        );
        assert!(json.get("prompt").is_none());
    }

    #[test]
    fn test_request_omits_empty_safety_settings() {
        let settings = GenerationSettings::new(GenerationParameters::DIRECT, vec![]);
        let json = serde_json::to_value(GeminiBackend::build_request("hi", &settings)).unwrap();
        assert!(json.get("safetySettings").is_none());
        assert_eq!(json["generationConfig"]["topK"], 1);
    }

    #[test]
    fn test_text_parts_are_concatenated() {
        let raw = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hi "}, {"text": "there!"}]},
                "finishReason": "STOP"
            }]
        });
        let parsed: GenerateContentResponse = serde_json::from_value(raw.clone()).unwrap();
        let reply = parsed.into_reply(raw);
        assert_eq!(reply.text.as_deref(), Some("Hi there!"));
        assert_eq!(reply.finish_reason, FinishReason::Complete);
    }

    #[test]
    fn test_prompt_block_has_no_text() {
        let raw = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let parsed: GenerateContentResponse = serde_json::from_value(raw.clone()).unwrap();
        let reply = parsed.into_reply(raw);
        assert!(reply.text.is_none());
        assert_eq!(reply.block_reason.as_deref(), Some("SAFETY"));
    }

    #[tokio::test]
    async fn test_generate_returns_text_and_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(header(API_KEY_HEADER, "test-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("Hi there!")))
            .expect(1)
            .mount(&server)
            .await;

        let reply = backend_for(&server)
            .generate("hello", &chat_settings())
            .await
            .unwrap();

        assert_eq!(reply.text.as_deref(), Some("Hi there!"));
        assert_eq!(reply.input_tokens, 3);
        assert_eq!(reply.output_tokens, 4);
        assert_eq!(reply.raw, reply_body("Hi there!"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected_with_body() {
        let server = MockServer::start().await;
        let error_body = json!({
            "error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}
        });
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(error_body.clone()))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .generate("hello", &chat_settings())
            .await
            .unwrap_err();

        match err {
            BackendError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, error_body);
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body_is_wrapped_as_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .generate("hello", &chat_settings())
            .await
            .unwrap_err();

        match err {
            BackendError::Rejected { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, json!("upstream unavailable"));
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .generate("hello", &chat_settings())
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unexpected_json_shape_keeps_raw_body() {
        let server = MockServer::start().await;
        let odd_body = json!({"candidates": "not-a-list", "note": "new field"});
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(odd_body.clone()))
            .mount(&server)
            .await;

        let reply = backend_for(&server)
            .generate("hello", &chat_settings())
            .await
            .unwrap();

        assert_eq!(reply.raw, odd_body);
        assert!(reply.text.is_none());
        assert!(reply.shape_error.is_some());
    }

    #[tokio::test]
    async fn test_recitation_finish_reason_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "copied text"}]},
                    "finishReason": "RECITATION"
                }]
            })))
            .mount(&server)
            .await;

        let reply = backend_for(&server)
            .generate("hello", &chat_settings())
            .await
            .unwrap();

        assert_eq!(reply.finish_reason, FinishReason::Recitation);
        assert_eq!(reply.text.as_deref(), Some("copied text"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let backend = GeminiBackend::new(GeminiConfig {
            api_key: Secret::new("test-key".to_string()),
            model: "gemini-1.5-flash".to_string(),
            // Port 9 (discard) on loopback is closed in test environments.
            base_url: "http://127.0.0.1:9/v1beta".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = backend.generate("hello", &chat_settings()).await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::Network(_) | BackendError::Timeout(_)
        ));
    }

    #[test]
    fn test_debug_output_hides_api_key() {
        let config = GeminiConfig {
            api_key: Secret::new("super-secret".to_string()),
            model: "gemini-1.5-flash".to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
