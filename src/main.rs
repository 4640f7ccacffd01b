//! letllm gateway - Main entry point
//!
//! This binary loads the configuration, builds the provider registry and
//! serves the HTTP API until Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use letllm_rust::{
    build_router,
    core::{init_metrics, init_tracing, AppConfig},
    providers::create_http_client,
    AppState, ProviderRegistry,
};
use std::net::SocketAddr;
use std::sync::Arc;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(threads) = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
    {
        builder.worker_threads(threads);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_tracing();
    init_metrics();

    let config_path = config_path();
    let config = if std::path::Path::new(&config_path).exists() {
        tracing::info!("Loading configuration from {}", config_path);
        AppConfig::load(&config_path)?
    } else {
        tracing::warn!("Config file {} not found, using defaults and environment", config_path);
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        config
    };

    let http_client = create_http_client(&config)?;
    let registry = Arc::new(ProviderRegistry::from_config(&config, http_client));
    registry.log_providers();

    let state = Arc::new(AppState::from_config(&config, registry.clone()));
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.server.host, config.server.port))?;
    tracing::info!("Starting gateway on {}", addr);
    tracing::info!("OpenAI API: /v1/chat/completions, /v1/models, /v1/providers");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped, closing providers");
    if let Err(e) = registry.close_all().await {
        tracing::error!(error = %e, "Provider shutdown reported an error");
    }

    Ok(())
}

/// First CLI argument, then `CONFIG_PATH`, then `config.yaml`.
fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CONFIG_PATH").ok())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
