use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::job::{JobDescriptor, JobStatus};
use crate::state::SharedState;

/// Upper bound for one discovery pass, probes included.
const PASS_TIMEOUT: Duration = Duration::from_secs(120);

fn perform_mark_and_sweep(inventory: &DashMap<String, JobDescriptor>, jobs: Vec<JobDescriptor>) {
    let active: HashSet<String> = jobs.iter().map(|j| j.resource_name.clone()).collect();

    for job in jobs {
        inventory.insert(job.resource_name.clone(), job);
    }

    inventory.retain(|name, _| active.contains(name));
}

/// Run one discovery pass and fold it into the inventory.
/// Returns the number of jobs found.
pub async fn sync_once(state: &SharedState) -> Result<usize> {
    let jobs: Vec<JobDescriptor> = state.monitor.list_jobs().await?.collect().await;
    let total = jobs.len();
    let in_error = jobs.iter().filter(|j| j.status() == JobStatus::Error).count();

    perform_mark_and_sweep(&state.inventory, jobs);
    state.sync.record_pass(total as u64, in_error as u64);
    Ok(total)
}

/// Periodically refreshes the job inventory.
///
/// A failed or hung pass keeps the previous inventory; stale data is better
/// than none. Jobs that disappear from the listing are swept out.
pub async fn background_inventory_sync(state: SharedState, interval_secs: u64) {
    info!(
        "Starting background job discovery on {} (interval: {}s)",
        state.monitor.infrastructure_target(),
        interval_secs
    );

    let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_count: Option<usize> = None;

    loop {
        interval.tick().await;

        match time::timeout(PASS_TIMEOUT, sync_once(&state)).await {
            Ok(Ok(count)) => {
                if last_count != Some(count) {
                    info!("Discovered {} jobs", count);
                    last_count = Some(count);
                }
            }
            Ok(Err(e)) => {
                let failures = state.sync.record_failure();
                error!("Job discovery failed (attempt {}): {}", failures, e);
                if failures >= 3 {
                    warn!("Job discovery has failed {} times consecutively - check the docker daemon", failures);
                }
            }
            Err(_) => {
                let failures = state.sync.record_failure();
                warn!("Job discovery timed out after {:?} (attempt {})", PASS_TIMEOUT, failures);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::{MonitorConfig, ProbeConfig};
    use crate::exec::fake::{FakeExecutor, FakeOutcome};
    use crate::health::FakeHealthClient;
    use crate::job::JobIdentity;
    use crate::state::MonitorState;
    use std::sync::Arc;

    fn job(resource: &str, name: &str) -> JobDescriptor {
        JobDescriptor::running(JobIdentity::new(name, "1"), resource, "node1:7000", "docker")
    }

    #[test]
    fn test_mark_and_sweep_initial_population() {
        let inventory = DashMap::new();
        perform_mark_and_sweep(&inventory, vec![job("job-a-v-1", "a"), job("job-b-v-1", "b")]);

        assert_eq!(inventory.len(), 2);
        assert!(inventory.contains_key("job-a-v-1"));
        assert!(inventory.contains_key("job-b-v-1"));
    }

    #[test]
    fn test_mark_and_sweep_replaces_and_removes() {
        let inventory = DashMap::new();
        inventory.insert("job-a-v-1".to_string(), job("job-a-v-1", "a"));
        inventory.insert("job-gone-v-1".to_string(), job("job-gone-v-1", "gone"));

        let mut updated = job("job-a-v-1", "a");
        updated.mark_failed("unreachable");
        perform_mark_and_sweep(&inventory, vec![updated]);

        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.get("job-a-v-1").unwrap().status(), JobStatus::Error);
        assert!(!inventory.contains_key("job-gone-v-1"));
    }

    #[test]
    fn test_mark_and_sweep_handles_empty_listing() {
        let inventory = DashMap::new();
        inventory.insert("job-a-v-1".to_string(), job("job-a-v-1", "a"));
        perform_mark_and_sweep(&inventory, vec![]);
        assert!(inventory.is_empty());
    }

    fn state(executor: Arc<FakeExecutor>, client: Arc<FakeHealthClient>) -> SharedState {
        let config = MonitorConfig {
            hostname: "node1".to_string(),
            probe: ProbeConfig {
                quick_probe_timeout_ms: 100,
                ..ProbeConfig::default()
            },
            ..MonitorConfig::default()
        };
        Arc::new(MonitorState::new(config, executor, client))
    }

    #[tokio::test]
    async fn test_sync_once_updates_inventory_and_status() {
        let executor = Arc::new(FakeExecutor::new());
        let client = Arc::new(FakeHealthClient::new());
        let state = state(executor.clone(), client.clone());
        client.respond("http://node1:7001/live", 200, "{}");
        client.respond("http://node1:7001/metrics", 200, "last_call_timestamp 0\n");

        executor.push_output(
            "job-a-v-1 a 1 0.0.0.0:7001->7000/tcp\njob-b-v-1 b 1 0.0.0.0:7002->7000/tcp\n",
        );
        assert_eq!(sync_once(&state).await.unwrap(), 2);
        assert_eq!(state.inventory.len(), 2);
        let snap = state.sync.snapshot();
        assert_eq!(snap.jobs_total, 2);
        assert_eq!(snap.jobs_in_error, 1);

        executor.push_output("job-a-v-1 a 1 0.0.0.0:7001->7000/tcp\n");
        assert_eq!(sync_once(&state).await.unwrap(), 1);
        assert!(state.inventory.contains_key("job-a-v-1"));
        assert!(!state.inventory.contains_key("job-b-v-1"));
    }

    #[tokio::test]
    async fn test_sync_once_failure_keeps_inventory() {
        let executor = Arc::new(FakeExecutor::new());
        let client = Arc::new(FakeHealthClient::new());
        let state = state(executor.clone(), client);
        state
            .inventory
            .insert("job-a-v-1".to_string(), job("job-a-v-1", "a"));

        executor.push_outcome(FakeOutcome::Failure {
            exit_code: 1,
            output: "Cannot connect to the Docker daemon".to_string(),
        });
        assert!(sync_once(&state).await.is_err());
        assert_eq!(state.inventory.len(), 1);
    }
}
