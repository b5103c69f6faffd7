use research_assistant::{api::start_server, config::AppConfig, context::OrchestratorContext};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    info!("🚀 Research Assistant - API Server");
    info!("📍 Port: {}", config.port);

    let context = Arc::new(OrchestratorContext::from_config(&config)?);

    info!("✅ Orchestrator context initialized");
    info!("📡 Starting API server...");

    start_server(context, config.port).await?;

    Ok(())
}
