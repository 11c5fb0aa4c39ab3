// calc-api-rs/src/main.rs
// Calculation API - HTTP entry point
// Port 3000 unless CALC_API_SERVICE_PORT / CALC_API_SERVICE_ADDR say otherwise
//
// Startup order:
// - Install the tracing subscriber
// - Load configuration (.env + environment)
// - Open the request log store (fatal if unreachable)
// - Start the request log writer
// - Serve until Ctrl-C, then drain the log queue and close the store

use std::sync::Arc;

use anyhow::Context;
use calc_api::{
    request_log::RequestLogger,
    store::{open_store, StoreConfig},
    CalcApi, DEFAULT_PORT, SERVICE_NAME,
};
use config_rs::ServiceConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Installed first so config-rs `log` records are forwarded too.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let service_config = ServiceConfig::new(SERVICE_NAME);

    let store_config = StoreConfig::from_service_config(&service_config)?;
    let store = open_store(&store_config)
        .await
        .context("Failed to open request log store")?;

    let (logger, writer) = RequestLogger::spawn(store.clone(), store_config.queue_capacity);
    let app = Arc::new(CalcApi::new(logger, store)).create_router();

    let addr = service_config.get_bind_address(DEFAULT_PORT);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Calculation API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The router (and every logger clone it held) is gone once serve returns.
    writer.shutdown().await;
    tracing::info!("Calculation API stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
