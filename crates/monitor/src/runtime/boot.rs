//! Logging init, config load, state creation.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::conf::MonitorConfig;
use crate::exec::LiveExecutor;
use crate::health::HttpHealthClient;
use crate::service;
use crate::state::{MonitorState, SharedState};

/// Initialise the tracing / logging subsystem.
///
/// `MONITOR_LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "job_monitor=info".into());
    let json = std::env::var("MONITOR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Load config, build shared state and spawn the background discovery task.
///
/// Returns `(SharedState, MonitorConfig)` on success.
pub async fn boot() -> Result<(SharedState, MonitorConfig), Box<dyn std::error::Error>> {
    info!("Starting job monitor v{}", env!("CARGO_PKG_VERSION"));

    let config = MonitorConfig::load()?;
    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    info!(
        "Monitoring {} via {} (DOCKER_HOST={})",
        config.infrastructure_target,
        config.docker_binary,
        if config.docker_host.is_empty() { "default" } else { &config.docker_host }
    );
    if config.hostname.is_empty() {
        error!("No hostname configured (MONITOR_HOSTNAME); discovery passes will fail");
    }

    let state = Arc::new(MonitorState::new(
        config.clone(),
        Arc::new(LiveExecutor::new()),
        Arc::new(HttpHealthClient::new()),
    ));
    info!("Initialized shared monitor state");

    tokio::spawn(service::background_inventory_sync(
        Arc::clone(&state),
        config.discovery_interval_secs,
    ));

    Ok((state, config))
}
