//! Llama App Server - Main entry point
//!
//! Loads the four-line backend config, validates it, and serves the
//! reference [`AssistantHandler`] until Ctrl-C.

use anyhow::{Context, Result};
use llama_app_server::{
    core::{init_logging, BackendConfig, ServerSettings},
    AssistantHandler, RequestDispatcher,
};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_CONFIG_PATH: &str = "config.txt";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    init_logging();

    let config_path = config_path();
    tracing::info!("Loading configuration from {}", config_path.display());

    let config = BackendConfig::from_file(&config_path)
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
    config
        .validate()
        .with_context(|| format!("Configuration check failed for {}", config_path.display()))?;

    for line in config.to_string().lines() {
        tracing::info!("{}", line);
    }

    let settings = ServerSettings::from_env();
    let dispatcher = Arc::new(RequestDispatcher::with_settings(
        config,
        settings,
        AssistantHandler::new(),
    )?);

    let backend = dispatcher.backend();
    if backend.is_alive().await {
        tracing::info!("llama-server is reachable at {}", backend.server_url());
    } else {
        tracing::warn!(
            "llama-server is not responding at {}; requests will fail until it is up",
            backend.server_url()
        );
    }

    let signal_target = dispatcher.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
            signal_target.stop();
        }
    });

    dispatcher.start().await?;
    Ok(())
}

/// First CLI argument, then `APP_CONFIG`, then `config.txt`.
fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("APP_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
