//! Reachability checks, metrics scraping and the operational wait.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time;
use tracing::debug;

use super::client::{HealthClient, HttpResponse};
use super::metrics::{extract_last_activity, parse_metrics, MetricSample};
use crate::conf::ProbeConfig;

#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("{url} responded with status {status}: {body}")]
    UnexpectedStatus { url: String, status: u16, body: String },
    #[error("Invalid response from {url}: {reason}")]
    InvalidBody { url: String, reason: String },
    #[error("Job at {url} still runs an older deployment (deployment_timestamp {reported} < {expected})")]
    StaleDeployment { url: String, reported: i64, expected: i64 },
    #[error("Job did not become operational within {elapsed:?} ({attempts} attempts). Last error: {last_error}")]
    Timeout {
        elapsed: Duration,
        attempts: u32,
        last_error: String,
    },
}

/// Which endpoint an operational-wait attempt polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    /// `/live`: process answers and runs the expected deployment.
    Live,
    /// `/ready`: job finished its own startup.
    Ready,
}

/// Reported to the observer after every operational-wait attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeAttempt {
    pub attempt: u32,
    pub phase: ProbePhase,
    pub elapsed: Duration,
    /// `None` when the attempt passed.
    pub error: Option<String>,
}

impl ProbeAttempt {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Fibonacci delays (1, 1, 2, 3, 5, ... × initial), capped.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    initial: Duration,
    max: Duration,
    current: u32,
    next: u32,
}

impl FibonacciBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: 1,
            next: 1,
        }
    }

    pub fn reset(&mut self) {
        self.current = 1;
        self.next = 1;
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.initial.saturating_mul(self.current).min(self.max);
        if delay < self.max {
            let following = self.current.saturating_add(self.next);
            self.current = self.next;
            self.next = following;
        }
        delay
    }
}

/// Probes a job's HTTP interface.
#[derive(Clone)]
pub struct HealthProber {
    client: Arc<dyn HealthClient>,
    config: ProbeConfig,
}

impl HealthProber {
    pub fn new(client: Arc<dyn HealthClient>, config: ProbeConfig) -> Self {
        Self { client, config }
    }

    async fn get_ok(&self, url: &str, timeout: Duration) -> Result<HttpResponse, ProbeError> {
        let response = self.client.get(url, timeout).await?;
        if !response.is_success() {
            return Err(ProbeError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status,
                body: truncate(&response.body, 200),
            });
        }
        Ok(response)
    }

    /// Single `/live` request with the quick timeout, no retry.
    pub async fn quick_check(&self, base_url: &str) -> Result<(), ProbeError> {
        let url = format!("{}/live", base_url);
        self.get_ok(&url, self.config.quick_probe_timeout()).await?;
        Ok(())
    }

    pub async fn scrape_metrics(&self, base_url: &str) -> Result<Vec<MetricSample>, ProbeError> {
        let url = format!("{}/metrics", base_url);
        let response = self.get_ok(&url, self.config.quick_probe_timeout()).await?;
        parse_metrics(&response.body).map_err(|reason| ProbeError::InvalidBody { url, reason })
    }

    /// Quick check plus metrics scrape, as done for every discovered job.
    pub async fn inspect(&self, base_url: &str) -> Result<Option<DateTime<Utc>>, ProbeError> {
        self.quick_check(base_url).await?;
        let samples = self.scrape_metrics(base_url).await?;
        Ok(extract_last_activity(&samples))
    }

    /// `/live` must answer 200 and report a deployment not older than `not_before`.
    async fn check_live(&self, base_url: &str, not_before: i64) -> Result<(), ProbeError> {
        let url = format!("{}/live", base_url);
        let response = self.get_ok(&url, self.config.request_timeout()).await?;
        if not_before <= 0 {
            return Ok(());
        }

        let body: serde_json::Value =
            serde_json::from_str(&response.body).map_err(|e| ProbeError::InvalidBody {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let reported = body
            .get("deployment_timestamp")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| ProbeError::InvalidBody {
                url: url.clone(),
                reason: "missing deployment_timestamp".to_string(),
            })?;
        if reported < not_before {
            return Err(ProbeError::StaleDeployment {
                url,
                reported,
                expected: not_before,
            });
        }
        Ok(())
    }

    async fn check_ready(&self, base_url: &str) -> Result<(), ProbeError> {
        let url = format!("{}/ready", base_url);
        self.get_ok(&url, self.config.request_timeout()).await?;
        Ok(())
    }

    /// Poll until the job is live (running a deployment from `not_before`
    /// or later) and then ready. `on_attempt` sees every attempt.
    pub async fn wait_until_operational<F>(
        &self,
        base_url: &str,
        not_before: i64,
        mut on_attempt: F,
    ) -> Result<(), ProbeError>
    where
        F: FnMut(&ProbeAttempt) + Send,
    {
        let started = Instant::now();
        let deadline = self.config.operational_timeout();
        let mut backoff = FibonacciBackoff::new(self.config.backoff_initial(), self.config.backoff_max());
        let mut phase = ProbePhase::Live;
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let outcome = match phase {
                ProbePhase::Live => self.check_live(base_url, not_before).await,
                ProbePhase::Ready => self.check_ready(base_url).await,
            };

            on_attempt(&ProbeAttempt {
                attempt,
                phase,
                elapsed: started.elapsed(),
                error: outcome.as_ref().err().map(ToString::to_string),
            });

            let last_error = match (outcome, phase) {
                (Ok(()), ProbePhase::Live) => {
                    debug!("{} is alive after {} attempts", base_url, attempt);
                    phase = ProbePhase::Ready;
                    backoff.reset();
                    continue;
                }
                (Ok(()), ProbePhase::Ready) => {
                    debug!("{} is operational after {} attempts", base_url, attempt);
                    return Ok(());
                }
                (Err(e), _) => e.to_string(),
            };

            let elapsed = started.elapsed();
            if elapsed >= deadline {
                return Err(ProbeError::Timeout {
                    elapsed,
                    attempts: attempt,
                    last_error,
                });
            }
            time::sleep(backoff.next_delay().min(deadline - elapsed)).await;
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
