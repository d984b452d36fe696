//! The tokio-process backed [`ProcessExecutor`].

use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::process::{
    ExecError, ProcessExecutor, ProcessResult, ShellCommand, StreamEvent, StreamHandle,
    StreamObserver, Termination, SIGTERM,
};

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Runs commands as real OS processes.
#[derive(Debug, Clone)]
pub struct LiveExecutor {
    /// How long a stopped stream gets to exit after SIGTERM before SIGKILL.
    grace_period: Duration,
}

impl LiveExecutor {
    pub fn new() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(grace_period: Duration) -> Self {
        Self { grace_period }
    }
}

impl Default for LiveExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor for LiveExecutor {
    fn run<'a>(
        &'a self,
        command: &'a ShellCommand,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessResult, ExecError>> + Send + 'a>> {
        Box::pin(run_once(command))
    }

    fn run_streaming(
        &self,
        command: ShellCommand,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<StreamHandle, ExecError> {
        let command_line = command.command_line();
        let (child, output) = spawn_merged(&command, &command_line)?;

        debug!("Spawned streaming command: {}", command_line);

        let stop = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        tokio::spawn(follow_output(
            child,
            output,
            observer,
            stop.clone(),
            done_tx,
            command_line.clone(),
            self.grace_period,
        ));

        Ok(StreamHandle::new(command_line, stop, done_rx))
    }
}

#[cfg(unix)]
type MergedOutput = tokio::net::unix::pipe::Receiver;

#[cfg(windows)]
type MergedOutput = tokio::fs::File;

#[cfg(unix)]
fn merged_reader(reader: std::io::PipeReader) -> std::io::Result<MergedOutput> {
    tokio::net::unix::pipe::Receiver::from_owned_fd(reader.into())
}

#[cfg(windows)]
fn merged_reader(reader: std::io::PipeReader) -> std::io::Result<MergedOutput> {
    let handle = std::os::windows::io::OwnedHandle::from(reader);
    Ok(tokio::fs::File::from_std(std::fs::File::from(handle)))
}

/// Spawn with stdout and stderr sharing one pipe, so the reader sees lines in
/// the order the process wrote them.
fn spawn_merged(
    command: &ShellCommand,
    command_line: &str,
) -> Result<(Child, MergedOutput), ExecError> {
    let spawn_error = |source: std::io::Error| ExecError::Spawn {
        command_line: command_line.to_string(),
        source,
    };

    let (reader, writer) = std::io::pipe().map_err(spawn_error)?;
    let writer_err = writer.try_clone().map_err(spawn_error)?;
    let child = {
        // Dropping the command closes our copies of the write end; EOF then
        // arrives once the process (and anything it forked) exits.
        let mut cmd = command.to_command();
        cmd.stdin(Stdio::null()).stdout(writer).stderr(writer_err);
        cmd.spawn().map_err(spawn_error)?
    };
    let output = merged_reader(reader).map_err(spawn_error)?;
    Ok((child, output))
}

async fn run_once(command: &ShellCommand) -> Result<ProcessResult, ExecError> {
    let command_line = command.command_line();
    let (mut child, mut output) = spawn_merged(command, &command_line)?;
    let io_error = |source: std::io::Error| ExecError::Io {
        command_line: command_line.clone(),
        source,
    };

    let mut raw = Vec::new();
    let read = output.read_to_end(&mut raw).await;
    let status = child.wait().await.map_err(io_error)?;
    read.map_err(io_error)?;
    let text = String::from_utf8_lossy(&raw).into_owned();

    if status.success() {
        return Ok(ProcessResult {
            exit_code: 0,
            output: text,
            command_line,
        });
    }
    if signal_of(&status) == Some(SIGTERM) {
        return Err(ExecError::Interrupted { command_line });
    }
    Err(ExecError::Failed {
        command_line,
        exit_code: exit_code_of(&status),
        output: text,
    })
}

/// Worker task: forwards output lines, then reports how the process ended.
async fn follow_output(
    mut child: Child,
    output: MergedOutput,
    observer: Arc<dyn StreamObserver>,
    stop: CancellationToken,
    done: watch::Sender<bool>,
    command_line: String,
    grace_period: Duration,
) {
    let mut lines = BufReader::new(output).lines();
    let mut stop_requested = false;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                stop_requested = true;
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => observer.on_event(StreamEvent::Line(line)),
                Ok(None) => break,
                Err(e) => {
                    warn!("Reading output of `{}` failed: {}", command_line, e);
                    break;
                }
            },
        }
    }
    drop(lines);

    let status = if stop_requested {
        terminate(&mut child, grace_period, &command_line).await
    } else {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                stop_requested = true;
                terminate(&mut child, grace_period, &command_line).await
            }
            status = child.wait() => status,
        }
    };

    let termination = match status {
        Ok(status) => Termination::classify(status.code(), signal_of(&status), stop_requested),
        Err(e) if stop_requested => {
            debug!("Wait on stopped `{}` failed: {}", command_line, e);
            Termination::Interrupted
        }
        Err(e) => Termination::Failed {
            exit_code: None,
            reason: e.to_string(),
        },
    };

    debug!("Stream `{}` ended: {:?}", command_line, termination);
    observer.on_event(StreamEvent::Terminated(termination));
    let _ = done.send(true);
}

/// SIGTERM, then SIGKILL if the process outlives the grace period.
async fn terminate(
    child: &mut Child,
    grace_period: Duration,
    command_line: &str,
) -> std::io::Result<ExitStatus> {
    send_sigterm(child, command_line);
    match time::timeout(grace_period, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                "`{}` still running {:?} after SIGTERM, killing it",
                command_line, grace_period
            );
            if let Err(e) = child.start_kill() {
                debug!("SIGKILL for `{}` failed: {}", command_line, e);
            }
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &mut Child, command_line: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // Already reaped.
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!("SIGTERM for `{}` (pid {}) failed: {}", command_line, pid, e);
    }
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child, command_line: &str) {
    if let Err(e) = child.start_kill() {
        debug!("Kill for `{}` failed: {}", command_line, e);
    }
}

#[cfg(unix)]
fn signal_of(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Exit code, or the negated signal number for signalled processes.
fn exit_code_of(status: &ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| signal_of(status).map(|sig| -sig))
        .unwrap_or(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<StreamEvent>>,
    }

    impl StreamObserver for Recorder {
        fn on_event(&self, event: StreamEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    StreamEvent::Line(l) => Some(l.clone()),
                    _ => None,
                })
                .collect()
        }

        fn terminations(&self) -> Vec<Termination> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    StreamEvent::Terminated(t) => Some(t.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    fn sh(script: &str) -> ShellCommand {
        ShellCommand::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_run_captures_output() {
        let result = LiveExecutor::new().run(&sh("echo hello; echo oops >&2")).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output, "hello\noops\n");
        assert!(result.command_line.starts_with("sh -c"));
    }

    #[tokio::test]
    async fn test_run_keeps_stdout_and_stderr_interleaved() {
        let result = LiveExecutor::new()
            .run(&sh("echo e1 >&2; echo o1; echo e2 >&2; echo o2"))
            .await
            .unwrap();
        assert_eq!(result.output, "e1\no1\ne2\no2\n");
    }

    #[tokio::test]
    async fn test_run_passes_environment_override() {
        let cmd = sh("printf %s \"$DOCKER_HOST\"").env("DOCKER_HOST", "tcp://daemon:2375");
        let result = LiveExecutor::new().run(&cmd).await.unwrap();
        assert_eq!(result.output, "tcp://daemon:2375");
    }

    #[tokio::test]
    async fn test_run_non_zero_exit_is_failure() {
        let err = LiveExecutor::new().run(&sh("echo broken; exit 3")).await.unwrap_err();
        match err {
            ExecError::Failed { exit_code, output, .. } => {
                assert_eq!(exit_code, 3);
                assert_eq!(output, "broken\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_sigterm_is_interrupt() {
        let err = LiveExecutor::new().run(&sh("kill -TERM $$")).await.unwrap_err();
        assert!(err.is_interrupt(), "expected interrupt, got {err:?}");
    }

    #[tokio::test]
    async fn test_run_missing_program_is_spawn_error() {
        let err = LiveExecutor::new()
            .run(&ShellCommand::new("definitely-not-a-real-binary-4711"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_streaming_delivers_lines_in_order_then_completes() {
        let recorder = Arc::new(Recorder::default());
        let handle = LiveExecutor::new()
            .run_streaming(sh("for i in 1 2 3 4 5; do echo line-$i; done"), recorder.clone())
            .unwrap();

        time::timeout(Duration::from_secs(10), async {
            while !handle.is_finished() {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(recorder.lines(), vec!["line-1", "line-2", "line-3", "line-4", "line-5"]);
        assert_eq!(recorder.terminations(), vec![Termination::Completed]);
    }

    #[tokio::test]
    async fn test_streaming_keeps_stdout_and_stderr_interleaved() {
        for _ in 0..5 {
            let recorder = Arc::new(Recorder::default());
            let handle = LiveExecutor::new()
                .run_streaming(
                    sh("echo e1 >&2; echo o1; echo e2 >&2; echo o2"),
                    recorder.clone(),
                )
                .unwrap();

            time::timeout(Duration::from_secs(10), async {
                while !handle.is_finished() {
                    time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap();

            assert_eq!(recorder.lines(), vec!["e1", "o1", "e2", "o2"]);
            assert_eq!(recorder.terminations(), vec![Termination::Completed]);
        }
    }

    #[tokio::test]
    async fn test_streaming_failure_is_reported() {
        let recorder = Arc::new(Recorder::default());
        let handle = LiveExecutor::new()
            .run_streaming(sh("echo no such container >&2; exit 1"), recorder.clone())
            .unwrap();

        time::timeout(Duration::from_secs(10), async {
            while !handle.is_finished() {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(recorder.lines(), vec!["no such container"]);
        let terminations = recorder.terminations();
        assert_eq!(terminations.len(), 1);
        assert!(terminations[0].is_failure());
    }

    #[tokio::test]
    async fn test_interrupt_stops_process_without_failure() {
        let recorder = Arc::new(Recorder::default());
        let handle = LiveExecutor::new()
            .run_streaming(sh("echo started; exec sleep 30"), recorder.clone())
            .unwrap();

        time::timeout(Duration::from_secs(10), async {
            while recorder.lines().is_empty() {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        time::timeout(Duration::from_secs(10), handle.interrupt()).await.unwrap();

        assert!(handle.is_finished());
        assert_eq!(recorder.lines(), vec!["started"]);
        assert_eq!(recorder.terminations(), vec![Termination::Interrupted]);
    }

    #[tokio::test]
    async fn test_interrupt_escalates_when_sigterm_is_ignored() {
        let recorder = Arc::new(Recorder::default());
        let handle = LiveExecutor::with_grace_period(Duration::from_millis(200))
            .run_streaming(
                sh("trap '' TERM; echo ready; while true; do sleep 1; done"),
                recorder.clone(),
            )
            .unwrap();

        time::timeout(Duration::from_secs(10), async {
            while recorder.lines().is_empty() {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        time::timeout(Duration::from_secs(10), handle.interrupt()).await.unwrap();
        assert_eq!(recorder.terminations(), vec![Termination::Interrupted]);
    }

    #[test]
    fn test_streaming_missing_program_is_spawn_error() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let err = LiveExecutor::new()
                .run_streaming(
                    ShellCommand::new("definitely-not-a-real-binary-4711"),
                    Arc::new(Recorder::default()),
                )
                .unwrap_err();
            assert!(matches!(err, ExecError::Spawn { .. }));
        });
    }
}
