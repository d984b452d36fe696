//! Executor trait, command description, outcomes and error types.
//!
//! `live.rs` provides the real tokio-backed implementation.
//! `fake.rs` provides a scripted test double.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Signal number the runtime uses to stop a process on request.
pub const SIGTERM: i32 = 15;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to spawn `{command_line}`: {source}")]
    Spawn {
        command_line: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while running `{command_line}`: {source}")]
    Io {
        command_line: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command `{command_line}` failed with return code {exit_code}: {output}")]
    Failed {
        command_line: String,
        exit_code: i32,
        output: String,
    },
    #[error("Command `{command_line}` was terminated on request")]
    Interrupted { command_line: String },
}

impl ExecError {
    /// True when the process ended because somebody asked it to stop.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, ExecError::Interrupted { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::Failed { exit_code, .. } => Some(*exit_code),
            ExecError::Interrupted { .. } => Some(-SIGTERM),
            _ => None,
        }
    }
}

/// An external command: program, arguments and environment overrides.
///
/// Arguments are passed to the OS verbatim, never through a shell, so job
/// names containing spaces or metacharacters need no escaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Human-readable rendering used in logs and error messages, e.g.
    /// `DOCKER_HOST=tcp://h:2375 docker logs 'job-a b' --tail 20`.
    pub fn command_line(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, quote(v)))
            .collect();
        parts.push(quote(&self.program));
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }

    pub(super) fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env).kill_on_drop(true);
        cmd
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Outcome of a one-shot command that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub exit_code: i32,
    /// stdout followed by stderr.
    pub output: String,
    pub command_line: String,
}

/// How a streamed process ended. Delivered exactly once per stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own with status 0.
    Completed,
    /// Stopped because a stop was requested (SIGTERM, or SIGKILL after the grace period).
    Interrupted,
    /// Anything else: non-zero exit, unexpected signal, or a wait error.
    Failed { exit_code: Option<i32>, reason: String },
}

impl Termination {
    /// Classify a process exit. `signal` is the terminating signal, if any.
    pub fn classify(code: Option<i32>, signal: Option<i32>, stop_requested: bool) -> Self {
        if stop_requested || signal == Some(SIGTERM) {
            return Termination::Interrupted;
        }
        match (code, signal) {
            (Some(0), _) => Termination::Completed,
            (Some(code), _) => Termination::Failed {
                exit_code: Some(code),
                reason: format!("exited with return code {}", code),
            },
            (None, Some(sig)) => Termination::Failed {
                exit_code: Some(-sig),
                reason: format!("killed by signal {}", sig),
            },
            (None, None) => Termination::Failed {
                exit_code: None,
                reason: "exited without a status".to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Termination::Failed { .. })
    }
}

/// One event produced by a streamed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Line(String),
    Terminated(Termination),
}

/// Receives the events of one stream, in emission order, from the worker task.
pub trait StreamObserver: Send + Sync {
    fn on_event(&self, event: StreamEvent);
}

/// Control handle for a running stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    command_line: Arc<str>,
    stop: CancellationToken,
    finished: watch::Receiver<bool>,
}

impl StreamHandle {
    pub fn new(
        command_line: impl Into<Arc<str>>,
        stop: CancellationToken,
        finished: watch::Receiver<bool>,
    ) -> Self {
        Self {
            command_line: command_line.into(),
            stop,
            finished,
        }
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// True once the worker has delivered its `Terminated` event.
    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Ask the process to stop and wait until the worker has delivered its
    /// final event. Idempotent. No `Line` event is delivered after this
    /// resolves.
    pub async fn interrupt(&self) {
        self.stop.cancel();
        let mut finished = self.finished.clone();
        // A dropped sender means the worker is gone, which is just as final.
        let _ = finished.wait_for(|done| *done).await;
    }
}

/// Async interface over external commands.
///
/// Object-safe thanks to `Pin<Box<…>>` returns.
/// Implementations must be `Send + Sync` so they can live inside `Arc<MonitorState>`.
pub trait ProcessExecutor: Send + Sync {
    /// Run a command to completion and capture its output.
    fn run<'a>(
        &'a self,
        command: &'a ShellCommand,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessResult, ExecError>> + Send + 'a>>;

    /// Launch a long-lived command and return as soon as it is spawned.
    /// Output lines and the final termination go to `observer` from a
    /// dedicated task. Must be called from within a tokio runtime.
    fn run_streaming(
        &self,
        command: ShellCommand,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<StreamHandle, ExecError>;
}
