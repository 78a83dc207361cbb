//! Application startup and lifecycle management.

use crate::config::RelayConfig;
use crate::handlers::{
    app::{health_check, index},
    chat::{chat, generate_content},
    metrics::metrics,
};
use crate::services::backends::gemini::{GeminiBackend, GeminiConfig};
use crate::services::backends::mock::MockBackend;
use crate::services::backends::{BackendKind, GenerativeBackend};
use crate::services::RelayService;
use axum::{
    error_handling::HandleErrorLayer,
    middleware::from_fn,
    routing::{get, post},
    BoxError, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub relay: RelayService,
}

impl AppState {
    pub fn new(config: RelayConfig, backend: Arc<dyn GenerativeBackend>) -> Self {
        let relay = RelayService::new(
            backend,
            config.generation.chat.clone(),
            config.generation.direct.clone(),
            config.limits.backend_timeout,
        );

        Self {
            config: Arc::new(config),
            relay,
        }
    }
}

/// Construct the transport strategy named in the configuration.
pub fn build_backend(config: &RelayConfig) -> Result<Arc<dyn GenerativeBackend>, AppError> {
    match config.backend.kind {
        BackendKind::Gemini => {
            let backend = GeminiBackend::new(GeminiConfig {
                api_key: config.backend.api_key.clone(),
                model: config.backend.model_name.clone(),
                base_url: config.backend.base_url.clone(),
                timeout: config.limits.backend_timeout,
            })
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("HTTP client: {}", e)))?;
            Ok(Arc::new(backend))
        }
        BackendKind::Mock => Ok(Arc::new(MockBackend)),
    }
}

/// Turn a shed or failed request from the limit stack into a response.
async fn handle_overload(err: BoxError) -> AppError {
    if err.is::<tower::load_shed::error::Overloaded>() {
        tracing::warn!("Relay at capacity, shedding request");
        AppError::ServiceUnavailable
    } else {
        AppError::InternalError(anyhow::anyhow!("unhandled middleware error: {}", err))
    }
}

pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.assets.static_dir.clone();
    let max_in_flight = state.config.limits.max_concurrent_requests;

    // One permit pool shared by both relay routes.
    let relay_routes = Router::new()
        .route("/chat", post(chat))
        .route("/generate-content", post(generate_content))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_overload))
                .load_shed()
                .layer(GlobalConcurrencyLimitLayer::new(max_in_flight)),
        );

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route_service("/loader.gif", ServeFile::new(static_dir.join("loader.gif")))
        .nest_service("/static", ServeDir::new(static_dir))
        .merge(relay_routes)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the backend named in `config`.
    pub async fn build(config: RelayConfig) -> Result<Self, AppError> {
        let backend = build_backend(&config)?;
        Self::build_with_backend(config, backend).await
    }

    /// Build the application around an already constructed backend.
    pub async fn build_with_backend(
        config: RelayConfig,
        backend: Arc<dyn GenerativeBackend>,
    ) -> Result<Self, AppError> {
        tracing::info!(
            backend = backend.name(),
            model = %config.backend.model_name,
            timeout_secs = config.limits.backend_timeout.as_secs(),
            max_concurrent_requests = config.limits.max_concurrent_requests,
            "Initialized generative backend"
        );

        // Port 0 = random port for testing
        let address = config.common.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Chat relay listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state: AppState::new(config, backend),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT/SIGTERM, then drain in-flight requests.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
