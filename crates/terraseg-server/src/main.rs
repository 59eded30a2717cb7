//! TerraSeg Server
//!
//! HTTP API in front of a pretrained satellite-image segmentation model.
//! The model and its run parameters are fetched from the registry once at
//! startup; requests tile, predict, stitch, and cache through shared
//! read-only state.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

use terraseg_model::RegistryConfig;
use terraseg_server::{create_router, AppState, Cli, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    info!("starting TerraSeg server");

    // Load configuration
    let config = ServerConfig::load(&cli.config, &cli)?;
    info!("configuration loaded successfully");
    info!("storage root: {}", config.storage_root);
    info!("model: {} version {}", cli.model_name, cli.model_version);
    info!("registry: {}", cli.tracking_uri);

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    let registry = RegistryConfig {
        tracking_uri: cli.tracking_uri.clone(),
        model_name: cli.model_name.clone(),
        model_version: cli.model_version.clone(),
    };

    // Initialize application state (fetch model and build the pipeline)
    info!("initializing application state...");
    let state = AppState::new(config, registry, metrics_handle).await?;
    info!("application state initialized successfully");

    // Build and run the server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", cli.listen, cli.port).parse()?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("server listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("terraseg=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("terraseg=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "terraseg_requests_total",
        "Total number of requests processed by endpoint"
    );
    metrics::describe_counter!(
        "terraseg_cache_hits_total",
        "Predictions served from the label cache"
    );
    metrics::describe_counter!(
        "terraseg_cache_misses_total",
        "Predictions computed by the pipeline"
    );
    metrics::describe_histogram!(
        "terraseg_prediction_latency_ms",
        metrics::Unit::Milliseconds,
        "Full-image prediction latency in milliseconds"
    );
    metrics::describe_counter!("terraseg_errors_total", "Total number of failed requests");

    info!("metrics exporter initialized");
    Ok(handle)
}
