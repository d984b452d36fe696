use thiserror::Error;

use crate::exec::ExecError;

/// Errors surfaced by discovery and the job condition check.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Execution(#[from] ExecError),

    /// The job never became operational. `message` may carry its recent logs.
    #[error("{message}")]
    JobCondition { message: String },
}

pub type Result<T> = std::result::Result<T, MonitorError>;
