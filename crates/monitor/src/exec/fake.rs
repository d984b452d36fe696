//! Test double for process execution.
//!
//! Provides a deterministic [`FakeExecutor`] that implements [`ProcessExecutor`]
//! from scripted outputs. Useful for unit-testing discovery and sessions
//! without a Docker daemon.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::process::{
    ExecError, ProcessExecutor, ProcessResult, ShellCommand, StreamEvent, StreamHandle,
    StreamObserver, Termination,
};

/// A canned one-shot outcome.
#[derive(Clone, Debug)]
pub enum FakeOutcome {
    Output(String),
    Failure { exit_code: i32, output: String },
    Interrupted,
}

/// A canned stream: lines to emit, then either wait for a stop request or
/// end on its own.
#[derive(Clone, Debug, Default)]
pub struct FakeStream {
    pub lines: Vec<String>,
    /// `None` keeps the stream open until it is interrupted.
    pub ends_with: Option<Termination>,
}

#[derive(Default)]
struct Inner {
    outcomes: VecDeque<FakeOutcome>,
    streams: VecDeque<FakeStream>,
    spawn_failures: usize,
    commands: Vec<ShellCommand>,
    streaming: Vec<ShellCommand>,
}

/// A fake executor for deterministic testing.
#[derive(Default)]
pub struct FakeExecutor {
    inner: Mutex<Inner>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the outcome of the next `run` call. Unscripted calls succeed
    /// with empty output.
    pub fn push_outcome(&self, outcome: FakeOutcome) {
        self.lock().outcomes.push_back(outcome);
    }

    pub fn push_output(&self, output: impl Into<String>) {
        self.push_outcome(FakeOutcome::Output(output.into()));
    }

    /// Queue the script of the next `run_streaming` call. Unscripted streams
    /// emit nothing and stay open until interrupted.
    pub fn push_stream(&self, stream: FakeStream) {
        self.lock().streams.push_back(stream);
    }

    /// Make the next `run_streaming` call fail to spawn.
    pub fn fail_next_spawn(&self) {
        self.lock().spawn_failures += 1;
    }

    /// Commands passed to `run`, in call order.
    pub fn commands(&self) -> Vec<ShellCommand> {
        self.lock().commands.clone()
    }

    /// Commands passed to `run_streaming`, in call order.
    pub fn streaming_commands(&self) -> Vec<ShellCommand> {
        self.lock().streaming.clone()
    }
}

impl ProcessExecutor for FakeExecutor {
    fn run<'a>(
        &'a self,
        command: &'a ShellCommand,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessResult, ExecError>> + Send + 'a>> {
        let outcome = {
            let mut state = self.lock();
            state.commands.push(command.clone());
            state.outcomes.pop_front()
        };
        let command_line = command.command_line();

        Box::pin(async move {
            match outcome.unwrap_or(FakeOutcome::Output(String::new())) {
                FakeOutcome::Output(output) => Ok(ProcessResult {
                    exit_code: 0,
                    output,
                    command_line,
                }),
                FakeOutcome::Failure { exit_code, output } => Err(ExecError::Failed {
                    command_line,
                    exit_code,
                    output,
                }),
                FakeOutcome::Interrupted => Err(ExecError::Interrupted { command_line }),
            }
        })
    }

    fn run_streaming(
        &self,
        command: ShellCommand,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<StreamHandle, ExecError> {
        let command_line = command.command_line();
        let script = {
            let mut state = self.lock();
            state.streaming.push(command);
            if state.spawn_failures > 0 {
                state.spawn_failures -= 1;
                return Err(ExecError::Spawn {
                    command_line,
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "fake spawn failure"),
                });
            }
            state.streams.pop_front().unwrap_or_default()
        };

        let stop = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        let token = stop.clone();

        tokio::spawn(async move {
            let mut termination = None;
            for line in script.lines {
                if token.is_cancelled() {
                    termination = Some(Termination::Interrupted);
                    break;
                }
                observer.on_event(StreamEvent::Line(line));
                tokio::task::yield_now().await;
            }
            let termination = match (termination, script.ends_with) {
                (Some(t), _) => t,
                (None, Some(t)) => t,
                (None, None) => {
                    token.cancelled().await;
                    Termination::Interrupted
                }
            };
            observer.on_event(StreamEvent::Terminated(termination));
            let _ = done_tx.send(true);
        });

        Ok(StreamHandle::new(command_line, stop, done_rx))
    }
}
