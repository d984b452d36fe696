//! Config loading from file and environment variables.

use std::path::Path;

use super::model::{MonitorConfig, ProbeConfig};

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl MonitorConfig {
    /// Load configuration from file or environment variables
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = std::env::var("MONITOR_CONFIG_FILE")
            .unwrap_or_else(|_| "/etc/job-monitor/monitor.toml".to_string());

        if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            let mut config = Self::from_file(&config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::info!("Config file not found at {}, using environment variables", config_path);
            Ok(Self::from_env())
        }
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: MonitorConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Every `MONITOR_*` variable (and `DOCKER_HOST`) that is set wins over
    /// the current value.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("DOCKER_HOST") {
            self.docker_host = host;
        }
        if let Ok(binary) = std::env::var("MONITOR_DOCKER_BINARY") {
            self.docker_binary = binary;
        }
        if let Ok(hostname) = std::env::var("MONITOR_HOSTNAME") {
            self.hostname = hostname;
        }
        if let Ok(target) = std::env::var("MONITOR_INFRASTRUCTURE_TARGET") {
            self.infrastructure_target = target;
        }
        if let Some(interval) = env_parse("MONITOR_DISCOVERY_INTERVAL") {
            self.discovery_interval_secs = interval;
        }
        if let Some(tail) = env_parse("MONITOR_DEFAULT_TAIL_LINES") {
            self.default_tail_lines = tail;
        }
        self.probe.apply_env_overrides();
    }

    /// Validate that configuration values are sane.
    ///
    /// An empty `hostname` is not rejected here; discovery refuses to run
    /// without it, while log sessions work fine.
    pub fn validate(&self) -> Result<(), String> {
        if self.docker_binary.is_empty() {
            return Err("docker_binary must not be empty".to_string());
        }
        if self.discovery_interval_secs == 0 {
            return Err("discovery_interval_secs must be > 0".to_string());
        }
        self.probe.validate()
    }
}

impl ProbeConfig {
    pub fn apply_env_overrides(&mut self) {
        if let Some(ms) = env_parse("MONITOR_QUICK_PROBE_TIMEOUT_MS") {
            self.quick_probe_timeout_ms = ms;
        }
        if let Some(ms) = env_parse("MONITOR_PROBE_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = ms;
        }
        if let Some(ms) = env_parse("MONITOR_PROBE_BACKOFF_INITIAL_MS") {
            self.backoff_initial_ms = ms;
        }
        if let Some(ms) = env_parse("MONITOR_PROBE_BACKOFF_MAX_MS") {
            self.backoff_max_ms = ms;
        }
        if let Some(secs) = env_parse("MONITOR_OPERATIONAL_TIMEOUT_SECS") {
            self.operational_timeout_secs = secs;
        }
    }
}
