use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use content_catalog_service::{AppConfig, ContentEngine, HttpServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the process environment still applies.
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "content_catalog_service={level},content_catalog={level},tower_http={level}",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} v{}", config.app_name, env!("CARGO_PKG_VERSION"));

    info!("Configuration loaded:");
    info!("  Environment: {}", config.app_env);
    info!("  HTTP address: {}", config.listen_addr());
    info!(
        "  Database URL: {}",
        config
            .redacted_database_url()
            .unwrap_or_else(|| "<in-memory>".to_string())
    );
    info!("  Storage backend: {:?}", config.storage_kind);

    let engine = Arc::new(
        ContentEngine::new(&config)
            .await
            .context("Failed to initialize content engine")?,
    );
    info!("Content engine initialized successfully");

    let server = HttpServer::new(engine, &config);
    server
        .start(config.listen_addr())
        .await
        .context("HTTP server error")?;

    info!("{} shutdown complete", config.app_name);
    Ok(())
}
