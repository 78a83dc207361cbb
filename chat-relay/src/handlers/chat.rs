use crate::models::{ChatRequest, ChatResponse, DirectResponse};
use crate::services::relay::{INVALID_REQUEST_BODY, USER_INPUT_REQUIRED};
use crate::services::RelayError;
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

/// `POST /chat`
#[tracing::instrument(skip_all)]
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, RelayError> {
    let Json(request) = payload.map_err(|e| {
        tracing::warn!(error = %e, "Rejected /chat body");
        RelayError::Validation(INVALID_REQUEST_BODY)
    })?;

    state.relay.handle_chat(request).await.map(Json)
}

/// `POST /generate-content`
#[tracing::instrument(skip_all)]
pub async fn generate_content(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<DirectResponse>, RelayError> {
    let Json(request) = payload.map_err(|e| {
        tracing::warn!(error = %e, "Rejected /generate-content body");
        RelayError::Validation(USER_INPUT_REQUIRED)
    })?;

    state.relay.generate_content_direct(request).await.map(Json)
}
