//! MonitorState struct, shared state type alias.

use std::sync::Arc;

use dashmap::DashMap;

use crate::conf::MonitorConfig;
use crate::discovery::DockerDaemonMonitor;
use crate::docker::{DockerCli, JobResourceName, ResourceNamer};
use crate::exec::ProcessExecutor;
use crate::health::{HealthClient, HealthProber};
use crate::job::JobDescriptor;
use crate::logs::{BroadcastHub, SessionManager};
use crate::service::SyncStatus;

/// Lines buffered per subscriber before slow receivers start lagging.
const HUB_CAPACITY: usize = 1024;

pub struct MonitorState {
    /// Latest discovery snapshot, keyed by container name.
    pub inventory: DashMap<String, JobDescriptor>,
    pub monitor: DockerDaemonMonitor,
    pub sessions: SessionManager,
    pub hub: BroadcastHub,
    pub config: MonitorConfig,
    pub sync: Arc<SyncStatus>,
}

impl MonitorState {
    pub fn new(
        config: MonitorConfig,
        executor: Arc<dyn ProcessExecutor>,
        client: Arc<dyn HealthClient>,
    ) -> Self {
        let docker = DockerCli::from_config(&config);
        let namer: Arc<dyn ResourceNamer> = Arc::new(JobResourceName);
        let hub = BroadcastHub::new(HUB_CAPACITY);

        let monitor = DockerDaemonMonitor::new(
            Arc::clone(&executor),
            docker.clone(),
            HealthProber::new(client, config.probe.clone()),
            Arc::clone(&namer),
            &config,
        );
        let sessions = SessionManager::new(
            executor,
            docker,
            namer,
            Arc::new(hub.clone()),
            config.default_tail_lines,
        );

        Self {
            inventory: DashMap::new(),
            monitor,
            sessions,
            hub,
            config,
            sync: Arc::new(SyncStatus::new()),
        }
    }
}

pub type SharedState = Arc<MonitorState>;
