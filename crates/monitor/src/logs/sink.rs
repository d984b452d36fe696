//! Where streamed log lines go.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

/// Fire-and-forget delivery of one line to the subscribers of a session.
pub trait BroadcastSink: Send + Sync {
    fn broadcast(&self, session_id: &str, line: &str);
}

/// A line tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLine {
    pub session_id: Arc<str>,
    pub line: String,
}

/// In-process fan-out over a `tokio::sync::broadcast` channel. The transport
/// layer subscribes and filters by session id.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<SessionLine>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionLine> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Lines of one session from now on. A lagging subscriber loses the
    /// overflowed lines and keeps going.
    pub fn session_lines(&self, session_id: &str) -> impl Stream<Item = String> + Send + 'static {
        let wanted: Arc<str> = session_id.into();
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| match item {
            Ok(line) if line.session_id == wanted => Some(line.line),
            Ok(_) => None,
            Err(e) => {
                warn!("Subscriber of session {}: {}", wanted, e);
                None
            }
        })
    }
}

impl BroadcastSink for BroadcastHub {
    fn broadcast(&self, session_id: &str, line: &str) {
        // No subscribers is not an error.
        let _ = self.tx.send(SessionLine {
            session_id: session_id.into(),
            line: line.to_string(),
        });
    }
}
