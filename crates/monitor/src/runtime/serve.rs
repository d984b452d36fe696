//! Run until shutdown, then stop every log stream.

use tracing::info;

use crate::conf::MonitorConfig;
use crate::runtime::stop::shutdown_signal;
use crate::state::SharedState;

pub async fn serve(state: SharedState, config: MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Job monitor is ready: discovery every {}s, default log tail {} lines",
        config.discovery_interval_secs, config.default_tail_lines
    );

    shutdown_signal().await;

    let open = state.sessions.len();
    if open > 0 {
        info!("Closing {} log stream sessions", open);
    }
    state.sessions.close_all().await;

    info!("Session totals: {}", serde_json::to_string(&state.sessions.metrics())?);
    info!("Discovery totals: {}", serde_json::to_string(&state.sync.snapshot())?);
    info!("Shutdown complete");
    Ok(())
}
