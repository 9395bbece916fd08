//! wandr-backend - HTTP Server Entry Point

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wandr_backend::{api, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wandr_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: environment={}, model={}, store={}",
        config.environment.as_str(),
        config.llm.model,
        config.tasks.store_type.as_str()
    );
    if !config.llm.has_credential() {
        warn!("GEMINI_API_KEY is not set; text commands will be rejected");
    }

    info!("Starting server on {}:{}", config.host, config.port);
    api::serve(config).await?;

    Ok(())
}
