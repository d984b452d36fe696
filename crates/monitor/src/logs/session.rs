//! Log-follow streams keyed by session id.
//!
//! Each session owns one `docker logs --follow` process. Lines go to the
//! broadcast sink under the session id; closing a session stops the process
//! and waits until its worker has gone quiet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::metrics::{SessionMetrics, SessionMetricsSnapshot};
use super::sink::BroadcastSink;
use crate::docker::{DockerCli, ResourceNamer};
use crate::exec::{
    ExecError, ProcessExecutor, StreamEvent, StreamHandle, StreamObserver, Termination,
};
use crate::job::JobIdentity;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session {0} is already active")]
    AlreadyActive(String),
    #[error("Session {0} not found")]
    NotFound(String),
    #[error("Invalid resource properties: {0}")]
    InvalidProperties(String),
    #[error("Failed to start log stream: {0}")]
    Exec(#[from] ExecError),
}

struct StreamSession {
    job: JobIdentity,
    tail: u32,
    /// Distinguishes successive sessions that reuse one id.
    serial: u64,
    handle: StreamHandle,
    started_at: DateTime<Utc>,
}

/// A session id is reserved while its process is being spawned, so the map
/// guard is never held across process creation.
enum Slot {
    Starting,
    Active(StreamSession),
}

/// Public view of an active session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub job: JobIdentity,
    pub tail: u32,
    pub command_line: String,
    pub started_at: DateTime<Utc>,
    /// The process already ended on its own; the session awaits close.
    pub finished: bool,
}

/// Forwards one session's stream events to the sink.
struct SessionForwarder {
    session_id: String,
    command_line: String,
    sink: Arc<dyn BroadcastSink>,
    metrics: Arc<SessionMetrics>,
}

impl StreamObserver for SessionForwarder {
    fn on_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Line(line) => {
                self.sink.broadcast(&self.session_id, &line);
                self.metrics.record_line();
            }
            StreamEvent::Terminated(Termination::Interrupted) => {
                self.metrics.record_interrupted();
                debug!("Session {}: `{}` stopped on request", self.session_id, self.command_line);
            }
            StreamEvent::Terminated(Termination::Completed) => {
                self.metrics.record_completed();
                info!("Session {}: `{}` ended", self.session_id, self.command_line);
            }
            StreamEvent::Terminated(Termination::Failed { exit_code, reason }) => {
                self.metrics.record_failure();
                match exit_code {
                    Some(code) => error!(
                        "Session {}: command \"{}\" failed with return code {}: {}",
                        self.session_id, self.command_line, code, reason
                    ),
                    None => error!(
                        "Session {}: command \"{}\" failed: {}",
                        self.session_id, self.command_line, reason
                    ),
                }
            }
        }
    }
}

/// Owns every active log stream.
pub struct SessionManager {
    executor: Arc<dyn ProcessExecutor>,
    docker: DockerCli,
    namer: Arc<dyn ResourceNamer>,
    sink: Arc<dyn BroadcastSink>,
    default_tail: u32,
    sessions: DashMap<String, Slot>,
    next_serial: AtomicU64,
    metrics: Arc<SessionMetrics>,
}

impl SessionManager {
    pub fn new(
        executor: Arc<dyn ProcessExecutor>,
        docker: DockerCli,
        namer: Arc<dyn ResourceNamer>,
        sink: Arc<dyn BroadcastSink>,
        default_tail: u32,
    ) -> Self {
        Self {
            executor,
            docker,
            namer,
            sink,
            default_tail,
            sessions: DashMap::new(),
            next_serial: AtomicU64::new(0),
            metrics: Arc::new(SessionMetrics::new()),
        }
    }

    /// Start following the logs of `job`'s container, `tail` lines back.
    ///
    /// Reusing the id of a live session is a caller bug and is rejected.
    pub fn create_session(
        &self,
        session_id: &str,
        job: JobIdentity,
        tail: u32,
    ) -> Result<(), SessionError> {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => {
                warn!("Refusing to open session {}: id already in use", session_id);
                return Err(SessionError::AlreadyActive(session_id.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(Slot::Starting);
            }
        }

        let container = self.namer.resource_name(&job);
        let command = self.docker.follow_logs(&container, tail);
        let command_line = command.command_line();
        let forwarder = Arc::new(SessionForwarder {
            session_id: session_id.to_string(),
            command_line: command_line.clone(),
            sink: Arc::clone(&self.sink),
            metrics: Arc::clone(&self.metrics),
        });

        let handle = match self.executor.run_streaming(command, forwarder) {
            Ok(handle) => handle,
            Err(e) => {
                self.sessions
                    .remove_if(session_id, |_, slot| matches!(slot, Slot::Starting));
                return Err(e.into());
            }
        };
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        info!("Session {} opened for {}: {}", session_id, job, command_line);

        self.sessions.insert(
            session_id.to_string(),
            Slot::Active(StreamSession {
                job,
                tail,
                serial,
                handle,
                started_at: Utc::now(),
            }),
        );
        self.metrics.record_opened();
        Ok(())
    }

    /// Like [`create_session`](Self::create_session), from a resource-properties
    /// map with `job_name`, `job_version` and optional `tail`.
    pub fn create_session_from_props(
        &self,
        session_id: &str,
        props: &HashMap<String, String>,
    ) -> Result<(), SessionError> {
        let field = |key: &str| {
            props
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| SessionError::InvalidProperties(format!("missing `{}`", key)))
        };
        let job = JobIdentity::new(field("job_name")?, field("job_version")?);
        let tail = match props.get("tail").map(|t| t.trim()) {
            None | Some("") => self.default_tail,
            Some(text) => text.parse().map_err(|_| {
                SessionError::InvalidProperties(format!("`tail` must be a non-negative integer, got `{}`", text))
            })?,
        };
        self.create_session(session_id, job, tail)
    }

    /// Stop the session's process and forget the session.
    ///
    /// Resolves after the stream's worker has finished, so no line of this
    /// session reaches the sink afterwards. Unknown ids are an error, and so
    /// is losing a race against another close of the same session.
    pub async fn close_session(&self, session_id: &str) -> Result<(), SessionError> {
        let not_found = || SessionError::NotFound(session_id.to_string());
        let (handle, serial) = match self.sessions.get(session_id) {
            Some(entry) => match entry.value() {
                Slot::Active(session) => (session.handle.clone(), session.serial),
                Slot::Starting => return Err(not_found()),
            },
            None => return Err(not_found()),
        };

        handle.interrupt().await;

        let removed = self.sessions.remove_if(session_id, |_, slot| {
            matches!(slot, Slot::Active(session) if session.serial == serial)
        });
        if removed.is_none() {
            debug!("Session {} was closed concurrently", session_id);
            return Err(not_found());
        }
        self.metrics.record_closed();
        info!("Session {} closed", session_id);
        Ok(())
    }

    /// Close every session. Used on shutdown.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| matches!(e.value(), Slot::Active(_)))
            .map(|e| e.key().clone())
            .collect();
        for id in ids {
            if let Err(e) = self.close_session(&id).await {
                debug!("Session {} vanished during shutdown: {}", id, e);
            }
        }
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|entry| matches!(entry.value(), Slot::Active(_)))
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .iter()
            .filter(|e| matches!(e.value(), Slot::Active(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .filter_map(|entry| {
                let Slot::Active(s) = entry.value() else {
                    return None;
                };
                Some(SessionInfo {
                    session_id: entry.key().clone(),
                    job: s.job.clone(),
                    tail: s.tail,
                    command_line: s.handle.command_line().to_string(),
                    started_at: s.started_at,
                    finished: s.handle.is_finished(),
                })
            })
            .collect()
    }

    pub fn metrics(&self) -> SessionMetricsSnapshot {
        self.metrics.snapshot()
    }
}
