//! Session-scoped live log streaming.

pub mod metrics;
pub mod session;
pub mod sink;

pub use metrics::{SessionMetrics, SessionMetricsSnapshot};
pub use session::{SessionError, SessionInfo, SessionManager};
pub use sink::{BroadcastHub, BroadcastSink, SessionLine};
