//! Mapping a job identity to its container name.

use crate::job::JobIdentity;

/// Resolves the runtime resource (container) name of a job.
pub trait ResourceNamer: Send + Sync {
    fn resource_name(&self, job: &JobIdentity) -> String;
}

/// `job-<name>-v-<version>`, dots replaced with dashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobResourceName;

impl ResourceNamer for JobResourceName {
    fn resource_name(&self, job: &JobIdentity) -> String {
        format!("job-{}-v-{}", job.name, job.version).replace('.', "-")
    }
}
