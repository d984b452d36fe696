//! Discovers job containers on one docker daemon.
//!
//! A discovery pass lists `job-*` containers once, probes each candidate and
//! yields one [`JobDescriptor`] per reachable job. An unhealthy job is still
//! yielded, marked `ERROR`; only a broken listing aborts the pass.

use std::sync::Arc;

use futures_util::Stream;
use tracing::{debug, info, warn};

use super::parse::{parse_listing_line, ListedJob};
use crate::conf::MonitorConfig;
use crate::docker::{DockerCli, ResourceNamer};
use crate::error::{MonitorError, Result};
use crate::exec::ProcessExecutor;
use crate::health::{HealthProber, ProbePhase};
use crate::job::{JobDescriptor, JobIdentity};

/// Called once, when the job first reports the expected deployment as live.
pub type OnAlive = Box<dyn FnOnce() + Send>;

pub struct DockerDaemonMonitor {
    executor: Arc<dyn ProcessExecutor>,
    docker: DockerCli,
    prober: HealthProber,
    namer: Arc<dyn ResourceNamer>,
    hostname: String,
    infrastructure_target: String,
    default_tail: u32,
}

impl DockerDaemonMonitor {
    pub fn new(
        executor: Arc<dyn ProcessExecutor>,
        docker: DockerCli,
        prober: HealthProber,
        namer: Arc<dyn ResourceNamer>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            executor,
            docker,
            prober,
            namer,
            hostname: config.hostname.clone(),
            infrastructure_target: config.infrastructure_target.clone(),
            default_tail: config.default_tail_lines,
        }
    }

    pub fn infrastructure_target(&self) -> &str {
        &self.infrastructure_target
    }

    /// Run one discovery pass.
    ///
    /// The listing runs before this returns; probing happens lazily as the
    /// stream is polled, in listing order.
    pub async fn list_jobs(&self) -> Result<impl Stream<Item = JobDescriptor> + Send + '_> {
        if self.hostname.is_empty() {
            return Err(MonitorError::Configuration(
                "hostname of a docker daemon must be set".to_string(),
            ));
        }

        let listing = self.executor.run(&self.docker.list_jobs()).await?;
        debug!("Listed containers with `{}`", listing.command_line);
        let output = listing.output;

        Ok(async_stream::stream! {
            for line in output.lines() {
                match parse_listing_line(line) {
                    Some(listed) => yield self.describe(listed).await,
                    None => debug!("Skipping listing line {:?}", line),
                }
            }
        })
    }

    /// Probe one listed job. Failures degrade the descriptor, never the pass.
    async fn describe(&self, listed: ListedJob) -> JobDescriptor {
        let internal_name = listed.internal_name(&self.hostname);
        let mut job = JobDescriptor::running(
            JobIdentity::new(listed.job_name, listed.job_version),
            listed.resource_name,
            internal_name,
            self.infrastructure_target.clone(),
        );

        match self.prober.inspect(&job.base_url()).await {
            Ok(last_call) => job.last_call_time = last_call,
            Err(e) => {
                let detail = e.to_string();
                warn!("Job {} is in bad condition: {}", job, detail);
                job.mark_failed(detail);
            }
        }
        job
    }

    /// Wait until `job` runs a deployment from `deployment_timestamp` or later
    /// and reports ready. With `logs_on_error` a failure message ends with the
    /// job's recent logs.
    pub async fn check_job_condition(
        &self,
        job: &JobDescriptor,
        deployment_timestamp: i64,
        on_alive: Option<OnAlive>,
        logs_on_error: bool,
    ) -> Result<()> {
        let mut on_alive = on_alive;
        let base_url = job.base_url();

        let outcome = self
            .prober
            .wait_until_operational(&base_url, deployment_timestamp, |attempt| {
                match &attempt.error {
                    Some(e) => debug!(
                        "{} not operational yet (attempt {}, {:?}): {}",
                        base_url, attempt.attempt, attempt.phase, e
                    ),
                    None if attempt.phase == ProbePhase::Live => {
                        if let Some(callback) = on_alive.take() {
                            callback();
                        }
                    }
                    None => {}
                }
            })
            .await;

        let Err(e) = outcome else {
            info!("Job {} is operational", job.identity());
            return Ok(());
        };

        let mut message = e.to_string();
        if logs_on_error {
            let logs = match self.read_recent_logs(job, self.default_tail).await {
                Ok(logs) => logs,
                Err(read_error) => format!("<failed to read logs: {}>", read_error),
            };
            message = format!("{}\nJob logs:\n{}", message, logs);
        }
        Err(MonitorError::JobCondition { message })
    }

    /// The last `tail` lines of the job container's output.
    pub async fn read_recent_logs(&self, job: &JobDescriptor, tail: u32) -> Result<String> {
        let container = self.namer.resource_name(&job.identity());
        let result = self
            .executor
            .run(&self.docker.recent_logs(&container, tail))
            .await?;
        Ok(result.output)
    }
}
