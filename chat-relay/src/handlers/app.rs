use crate::startup::AppState;
use askama::Template;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub title: &'static str,
}

pub async fn index() -> impl IntoResponse {
    IndexTemplate {
        title: "Chat Assistant",
    }
}

/// Liveness probe. Does not call the backend.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "chat-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.relay.backend_name(),
    }))
}
