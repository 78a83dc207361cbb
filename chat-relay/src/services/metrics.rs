use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;
use std::time::Duration;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Call once from `main`.
pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("metrics recorder: {}", e)))?;

    METRICS_HANDLE.set(handle).map_err(|_| {
        AppError::InternalError(anyhow::anyhow!("metrics recorder already initialized"))
    })
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record the outcome and latency of one backend call.
pub fn record_backend_call(route: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!("relay_backend_calls_total", "route" => route, "outcome" => outcome).increment(1);
    histogram!("relay_backend_call_duration_seconds", "route" => route)
        .record(elapsed.as_secs_f64());
}

/// Record token usage reported by the backend for one successful call.
pub fn record_tokens(
    route: &'static str,
    backend: &'static str,
    input_tokens: i32,
    output_tokens: i32,
) {
    for (direction, tokens) in [("input", input_tokens), ("output", output_tokens)] {
        counter!(
            "relay_backend_tokens_total",
            "route" => route,
            "backend" => backend,
            "direction" => direction
        )
        .increment(tokens.max(0) as u64);
    }
}
