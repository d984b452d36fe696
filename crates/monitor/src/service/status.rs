use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Health of the background discovery loop.
#[derive(Debug, Default)]
pub struct SyncStatus {
    passes: AtomicU64,
    consecutive_failures: AtomicU64,
    jobs_total: AtomicU64,
    jobs_in_error: AtomicU64,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pass finished: reset the failure streak and publish the job counts.
    pub fn record_pass(&self, jobs_total: u64, jobs_in_error: u64) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.jobs_total.store(jobs_total, Ordering::Relaxed);
        self.jobs_in_error.store(jobs_in_error, Ordering::Relaxed);
    }

    /// Returns the new failure streak.
    pub fn record_failure(&self) -> u64 {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            jobs_total: self.jobs_total.load(Ordering::Relaxed),
            jobs_in_error: self.jobs_in_error.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub passes: u64,
    pub consecutive_failures: u64,
    pub jobs_total: u64,
    pub jobs_in_error: u64,
}
