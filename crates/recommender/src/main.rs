//! Resource recommender daemon
//!
//! Periodically reconciles the applications and timeframes in the store,
//! queries their peak usage from Prometheus and writes per-container limit
//! recommendations back to the store.

use anyhow::{Context, Result};
use clap::Parser;
use recommender_lib::{
    health::HealthRegistry, ClusterStateFeeder, FileStore, PrometheusProvider, Recommender,
    StructuredLogger,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const RECOMMENDER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "recommender", version, about = "Container resource recommender")]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "RECOMMENDER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let config = config::RecommenderConfig::load(cli.config.as_deref())?;
    info!(
        store_path = %config.store_path.display(),
        prometheus = %config.prometheus.address,
        "Recommender configured"
    );

    let health_registry = HealthRegistry::new().with_cycle_interval(config.interval());
    health_registry.register_all().await;

    let logger = StructuredLogger::new("recommender");
    logger.log_startup(RECOMMENDER_VERSION, config.interval_secs, &config.history);

    let store = Arc::new(FileStore::new(&config.store_path));
    let provider = Arc::new(
        PrometheusProvider::new(config.prometheus.clone())
            .context("failed to create Prometheus provider")?,
    );
    let feeder = ClusterStateFeeder::new(store, provider, config.feeder_config()?);
    let recommender =
        Recommender::new(feeder, health_registry.clone()).with_logger(logger.clone());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let app_state = Arc::new(api::AppState::new(health_registry));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));
    let loop_handle = tokio::spawn(recommender.run(config.interval(), shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Recommendation loop panicked");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server panicked"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
