use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;

/// Counters for log streaming sessions.
///
/// All operations use `Ordering::Relaxed`; snapshots may tear slightly
/// across fields, which is fine for observability.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    opened: AtomicU64,
    closed: AtomicU64,
    lines_forwarded: AtomicU64,
    /// Streams that ended with a genuine failure.
    failures: AtomicU64,
    /// Streams stopped on request.
    interrupted: AtomicU64,
    completed: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_opened(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Called once per forwarded line.
    #[inline]
    pub fn record_line(&self) {
        self.lines_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_interrupted(&self) {
        self.interrupted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        let opened = self.opened.load(Ordering::Relaxed);
        let closed = self.closed.load(Ordering::Relaxed);
        SessionMetricsSnapshot {
            opened,
            closed,
            active: opened.saturating_sub(closed),
            lines_forwarded: self.lines_forwarded.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionMetricsSnapshot {
    pub opened: u64,
    pub closed: u64,
    pub active: u64,
    pub lines_forwarded: u64,
    pub failures: u64,
    pub interrupted: u64,
    pub completed: u64,
}
