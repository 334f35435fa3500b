//! warden-gateway: the public HTTP façade.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use warden_core::{AppConfig, ModelCatalog};
use warden_gateway::{Dispatcher, ManagerClient, api};

#[derive(Debug, Parser)]
#[command(name = "warden-gateway", about = "OpenAI-style gateway for managed model workers")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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
    let manager = ManagerClient::from_env();
    let worker_host =
        std::env::var("WORKER_HOST").unwrap_or_else(|_| "host.docker.internal".to_string());
    let dispatcher = Arc::new(Dispatcher::new(catalog, manager, worker_host));

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding gateway address {addr}"))?;
    info!(%addr, models = config.models.len(), "gateway listening");

    axum::serve(listener, api::router(dispatcher))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("gateway HTTP server")?;

    info!("gateway exited");
    Ok(())
}
