//! Shared helpers for chat-relay integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chat_relay::config::RelayConfig;
use chat_relay::models::GenerationSettings;
use chat_relay::services::backends::{
    BackendError, BackendReply, FinishReason, GenerativeBackend,
};
use chat_relay::startup::{build_router, AppState};
use serde_json::{json, Value};
use service_core::config as core_config;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// What the stub backend does on each call.
#[derive(Clone)]
pub enum StubBehavior {
    Reply(&'static str),
    Reject { status: u16, body: Value },
    Fail(&'static str),
    Slow(Duration, &'static str),
    /// Never answers; records when the pending call is dropped.
    Hang,
}

pub struct StubBackend {
    behavior: StubBehavior,
    calls: AtomicUsize,
    prompts: std::sync::Mutex<Vec<String>>,
    cancelled: AtomicBool,
}

struct SetOnDrop<'a>(&'a AtomicBool);

impl Drop for SetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl StubBackend {
    pub fn new(behavior: StubBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            prompts: std::sync::Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub fn gemini_body(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

fn text_reply(text: &str) -> BackendReply {
    BackendReply {
        text: Some(text.to_string()),
        finish_reason: FinishReason::Complete,
        block_reason: None,
        shape_error: None,
        input_tokens: 1,
        output_tokens: 1,
        raw: gemini_body(text),
    }
}

#[async_trait]
impl GenerativeBackend for StubBackend {
    async fn generate(
        &self,
        prompt: &str,
        _settings: &GenerationSettings,
    ) -> Result<BackendReply, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        match &self.behavior {
            StubBehavior::Reply(text) => Ok(text_reply(text)),
            StubBehavior::Reject { status, body } => Err(BackendError::Rejected {
                status: *status,
                body: body.clone(),
            }),
            StubBehavior::Fail(detail) => Err(BackendError::Network(detail.to_string())),
            StubBehavior::Slow(delay, text) => {
                tokio::time::sleep(*delay).await;
                Ok(text_reply(text))
            }
            StubBehavior::Hang => {
                let _guard = SetOnDrop(&self.cancelled);
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Relay configuration for tests: mock transport, random port, bundled assets.
pub fn test_config() -> RelayConfig {
    let vars: HashMap<&str, String> = HashMap::from([
        ("RELAY_BACKEND", "mock".to_string()),
        (
            "RELAY_STATIC_DIR",
            concat!(env!("CARGO_MANIFEST_DIR"), "/static").to_string(),
        ),
    ]);

    RelayConfig::from_lookup(
        core_config::Config {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        |key| vars.get(key).cloned(),
    )
    .expect("test configuration is valid")
}

pub fn router_with(backend: Arc<StubBackend>, config: RelayConfig) -> Router {
    build_router(AppState::new(config, backend))
}

pub fn router(backend: Arc<StubBackend>) -> Router {
    router_with(backend, test_config())
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Send one request and return status plus parsed JSON body.
pub async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
