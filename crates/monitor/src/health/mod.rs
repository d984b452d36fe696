//! HTTP probes against running jobs.

pub mod client;
pub mod metrics;
pub mod probe;

pub use client::{FakeHealthClient, HealthClient, HttpHealthClient, HttpResponse};
pub use metrics::{extract_last_activity, parse_metrics, MetricSample};
pub use probe::{HealthProber, ProbeAttempt, ProbeError, ProbePhase};
