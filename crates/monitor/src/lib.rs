// Job monitor for workloads running on a remote docker daemon.

// Core infrastructure
pub mod error;
pub mod exec;
pub mod docker;
pub mod state;

// Domain modules
pub mod runtime;
pub mod conf;
pub mod job;
pub mod discovery;
pub mod health;
pub mod logs;
pub mod service;

pub use error::MonitorError;
pub use job::{JobDescriptor, JobIdentity, JobStatus};
