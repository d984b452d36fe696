//! One-shot and streaming external commands.

pub mod process;
pub mod live;
pub mod fake;

pub use process::{
    ExecError, ProcessExecutor, ProcessResult, ShellCommand, StreamEvent, StreamHandle,
    StreamObserver, Termination,
};
pub use live::LiveExecutor;
