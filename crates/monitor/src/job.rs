//! Descriptors produced by discovery and the identity used by sessions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse job status as reported to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Error => "ERROR",
        }
    }
}

/// Status plus failure detail. `Error` always carries its detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobCondition {
    Running,
    Error(String),
}

/// Name and version of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobIdentity {
    pub name: String,
    pub version: String,
}

impl JobIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// Snapshot of one discovered job. Built once per discovery pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub version: String,
    /// Container name as listed by the runtime.
    pub resource_name: String,
    /// `host:port` the job answers on.
    pub internal_name: String,
    #[serde(flatten)]
    pub condition: JobCondition,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub last_call_time: Option<DateTime<Utc>>,
    pub infrastructure_target: String,
}

impl JobDescriptor {
    /// A freshly discovered job, presumed running until a probe says otherwise.
    pub fn running(
        identity: JobIdentity,
        resource_name: impl Into<String>,
        internal_name: impl Into<String>,
        infrastructure_target: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: identity.name,
            version: identity.version,
            resource_name: resource_name.into(),
            internal_name: internal_name.into(),
            condition: JobCondition::Running,
            create_time: now,
            update_time: now,
            last_call_time: None,
            infrastructure_target: infrastructure_target.into(),
        }
    }

    pub fn identity(&self) -> JobIdentity {
        JobIdentity::new(self.name.clone(), self.version.clone())
    }

    pub fn status(&self) -> JobStatus {
        match self.condition {
            JobCondition::Running => JobStatus::Running,
            JobCondition::Error(_) => JobStatus::Error,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.condition {
            JobCondition::Running => None,
            JobCondition::Error(detail) => Some(detail),
        }
    }

    /// Downgrade to `ERROR` with the given detail.
    pub fn mark_failed(&mut self, detail: impl Into<String>) {
        self.condition = JobCondition::Error(detail.into());
    }

    /// Base URL of the job's HTTP interface.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.internal_name)
    }
}

impl fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} ({} at {}, {})",
            self.name,
            self.version,
            self.resource_name,
            self.internal_name,
            self.status().as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobDescriptor {
        JobDescriptor::running(JobIdentity::new("foo", "1"), "job-foo-1", "node1:7020", "docker-daemon")
    }

    #[test]
    fn test_running_job_has_no_error() {
        let job = job();
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.error(), None);
        assert_eq!(job.create_time, job.update_time);
        assert!(job.last_call_time.is_none());
    }

    #[test]
    fn test_mark_failed_sets_status_and_detail_together() {
        let mut job = job();
        job.mark_failed("ConnectError: connection refused");
        assert_eq!(job.status(), JobStatus::Error);
        assert_eq!(job.error(), Some("ConnectError: connection refused"));
    }

    #[test]
    fn test_base_url() {
        assert_eq!(job().base_url(), "http://node1:7020");
    }

    #[test]
    fn test_serializes_status_and_error_fields() {
        let mut job = job();
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "RUNNING");
        assert!(value.get("error").is_none());
        assert_eq!(value["internal_name"], "node1:7020");

        job.mark_failed("boom");
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "ERROR");
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn test_deserializes_what_it_serializes() {
        let mut original = job();
        original.mark_failed("unreachable");
        let json = serde_json::to_string(&original).unwrap();
        let back: JobDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(JobIdentity::new("adder", "0.0.1").to_string(), "adder v0.0.1");
    }
}
