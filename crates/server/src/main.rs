//! tile-proxy server entry point.
//!
//! Loads configuration, prepares the work directory and serves the caching
//! proxy over HTTP until interrupted.
//! Logs go to stderr as JSON; `RUST_LOG` overrides the default `info` level.

use std::sync::Arc;

use anyhow::{Context, Result};
use tileproxy_core::AppConfig;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod headers;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("failed to create work directory {}", config.work_dir.display()))?;

    let state = Arc::new(handler::ProxyState::new(&config)?);
    let app = handler::router(state);

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        work_dir = %config.work_dir.display(),
        max_age_secs = config.max_age().as_secs(),
        min_size = config.min_size,
        "tile-proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
