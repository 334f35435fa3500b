//! warden-manager: the worker manager daemon.
//!
//! Builds the stack in dependency order (config, catalog, supervisor,
//! monitor, HTTP) and tears it down in reverse on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use warden_core::{AppConfig, ModelCatalog};
use warden_manager::{Supervisor, SupervisorPolicy, api, monitor};

const DEFAULT_MANAGER_PORT: u16 = 8100;

#[derive(Debug, Parser)]
#[command(name = "warden-manager", about = "Memory-aware model worker manager")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen port; overrides MANAGER_PORT.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let catalog = ModelCatalog::from_config(&config);
    let policy = SupervisorPolicy::from_config(&config.workers).with_env_overrides();
    let supervisor = Arc::new(
        Supervisor::new(catalog, policy, config.memory.clone(), &config.workers)
            .context("initializing supervisor")?,
    );

    let shutdown = CancellationToken::new();
    let monitor_handle = monitor::start(supervisor.clone(), shutdown.clone());

    let port = args
        .port
        .or_else(|| std::env::var("MANAGER_PORT").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(DEFAULT_MANAGER_PORT);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding manager port {port}"))?;
    info!(port, models = supervisor.catalog().len(), "worker manager listening");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    axum::serve(listener, api::router(supervisor.clone()))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .context("manager HTTP server")?;

    // Reverse order: monitor first so no sweep races the teardown.
    let _ = monitor_handle.await;
    supervisor.stop_all().await;
    info!("worker manager exited");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("installing SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
