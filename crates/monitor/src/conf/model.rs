//! MonitorConfig and related structs.

use std::time::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Daemon endpoint exported as `DOCKER_HOST` to every docker invocation.
    /// Empty means the CLI default.
    pub docker_host: String,
    pub docker_binary: String,
    /// Host name under which the daemon's published ports are reachable.
    /// Required for discovery.
    pub hostname: String,
    /// Label stamped on every descriptor this monitor produces.
    pub infrastructure_target: String,
    pub discovery_interval_secs: u64,
    pub default_tail_lines: u32,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Timeout of the single discovery-time `/live` probe and metrics scrape.
    pub quick_probe_timeout_ms: u64,
    /// Per-request timeout while waiting for a job to become operational.
    pub request_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub operational_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            docker_host: "".to_string(),
            docker_binary: "docker".to_string(),
            hostname: "".to_string(),
            infrastructure_target: "docker-daemon".to_string(),
            discovery_interval_secs: 30,
            default_tail_lines: 20,
            probe: ProbeConfig::default(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            quick_probe_timeout_ms: 5_000,
            request_timeout_ms: 3_000,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 3_000,
            operational_timeout_secs: 600,
        }
    }
}

impl ProbeConfig {
    pub fn quick_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.quick_probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn operational_timeout(&self) -> Duration {
        Duration::from_secs(self.operational_timeout_secs)
    }

    /// Validate probe timing values
    pub fn validate(&self) -> Result<(), String> {
        if self.quick_probe_timeout_ms == 0 {
            return Err("probe.quick_probe_timeout_ms must be > 0".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("probe.request_timeout_ms must be > 0".to_string());
        }
        if self.backoff_initial_ms == 0 {
            return Err("probe.backoff_initial_ms must be > 0".to_string());
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err("probe.backoff_max_ms must be >= probe.backoff_initial_ms".to_string());
        }
        if self.operational_timeout_secs == 0 {
            return Err("probe.operational_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}
