use chat_relay::config::RelayConfig;
use chat_relay::services::metrics::init_metrics;
use chat_relay::startup::Application;
use dotenvy::dotenv;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let otlp_endpoint = std::env::var("OTLP_ENDPOINT").ok();
    init_tracing("chat-relay", "info", otlp_endpoint.as_deref());

    init_metrics()?;

    let config = RelayConfig::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    let app = Application::build(config).await?;
    app.run_until_stopped().await?;

    tracing::info!("Chat relay stopped");
    Ok(())
}
