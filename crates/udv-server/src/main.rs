//! UDV query translation server
//!
//! Accepts JSON DSL queries over HTTP, validates them against the schema
//! registry and returns parameterized PostgreSQL.

use anyhow::Context;
use tracing::info;
use udv_registry::Registry;

mod api;
mod config;
mod error;
mod logging;
mod metrics;
mod query;
mod state;

use config::Config;
use metrics::Metrics;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_file = std::env::var("UDV_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&config_file)
        .with_context(|| format!("failed to load server config from {config_file}"))?;

    config.apply_logging_env();
    logging::init().context("failed to initialize logging")?;

    let models_path = config.schema.models_path.clone();
    let registry = Registry::load(&models_path)
        .with_context(|| format!("failed to load models from {models_path}"))?;
    info!(models = registry.len(), path = %models_path, "schema registry loaded");

    let metrics = Metrics::new().context("failed to register metrics")?;
    let app = api::router(AppState::new(registry, metrics, models_path));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting UDV server on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("UDV server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
