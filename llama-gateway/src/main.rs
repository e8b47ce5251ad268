use dotenvy::dotenv;
use llama_gateway::config::GatewayConfig;
use llama_gateway::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let otlp_endpoint = std::env::var("OTLP_ENDPOINT").ok();
    init_tracing("llama-gateway", "info", otlp_endpoint.as_deref());

    let config = GatewayConfig::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        anyhow::anyhow!("{}", e)
    })?;

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to start llama-gateway: {}", e);
        anyhow::anyhow!("{}", e)
    })?;

    tracing::info!("Server is ready. Press Ctrl+C to stop.");
    app.run_until_stopped().await?;

    Ok(())
}
