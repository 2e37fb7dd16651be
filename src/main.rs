//! Timeline API - presence timeline service
//!
//! Records camera enter/exit events and serves each tracked subject's
//! compiled timeline over HTTP.
//!
//! Module structure:
//! - `domain/` - Core types (Event, Session, TimelineEntry)
//! - `io/` - External interfaces (HTTP API, MQTT ingestion, Journal)
//! - `services/` - Business logic (EventStore, compiler, TimelineService)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use std::sync::Arc;
use timeline_api::infra::{Config, Metrics};
use timeline_api::io::{start_api_server, start_mqtt_ingest, ApiState};
use timeline_api::services::{EventStore, TimelineService};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Timeline API - camera presence timelines per tracking id
#[derive(Parser, Debug)]
#[command(name = "timeline-api", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-request visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("timeline-api starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        listen = %config.listen_addr(),
        journal_file = ?config.journal_file(),
        cache_enabled = %config.cache_enabled(),
        mqtt_enabled = %config.mqtt_enabled(),
        empty_timeline_not_found = %config.empty_timeline_not_found(),
        "config_loaded"
    );

    let store = match config.journal_file() {
        Some(path) => EventStore::open(path, config.journal_fsync())?,
        None => EventStore::new(),
    };

    let metrics = Arc::new(Metrics::new());
    let mut service = TimelineService::new(Arc::new(store), metrics.clone());
    if config.cache_enabled() {
        service = service.with_cache(config.cache_max_entries());
    }
    let service = Arc::new(service);

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start MQTT ingestion (optional)
    if config.mqtt_enabled() {
        let mqtt_config = config.clone();
        let mqtt_service = service.clone();
        let mqtt_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_mqtt_ingest(&mqtt_config, mqtt_service, mqtt_shutdown).await {
                error!(error = %e, "mqtt_ingest_error");
            }
        });
    }

    // Start metrics reporter
    let reporter_service = service.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let summary = metrics.report(reporter_service.tracked_subjects());
            summary.log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let state = Arc::new(ApiState::new(service, config.empty_timeline_not_found()));
    if let Err(e) = start_api_server(&config.listen_addr(), state, shutdown_rx).await {
        error!(error = %e, addr = %config.listen_addr(), "timeline_api_error");
        return Err(e);
    }

    info!("timeline-api shutdown complete");
    Ok(())
}
