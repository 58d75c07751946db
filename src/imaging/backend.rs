//! Engine execution trait and shared types.
//!
//! The [`Executor`] trait is the only seam between the pure compiler and the
//! outside world: it receives a compiled [`EngineCommand`] and a deadline and
//! reports how the process ended.
//!
//! The production implementation is
//! [`MagickExecutor`](super::magick_backend::MagickExecutor), which spawns the
//! engine binary directly (no shell) and kills it when the deadline passes.
//! Tests use the recording mock in this module.

use super::params::EngineCommand;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("engine exited with {}: {stderr}", exit_label(.status))]
    EngineFailed { status: Option<i32>, stderr: String },
    #[error("engine timed out after {}ms", .timeout.as_millis())]
    Timeout { timeout: Duration },
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Captured output of a successful (zero exit) engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Runs compiled commands against an external engine.
///
/// Implementations return `Ok` only for a zero exit status. Whether non-empty
/// stderr counts as failure is decided by the caller, not the executor.
pub trait Executor: Sync {
    fn execute(&self, command: &EngineCommand, timeout: Duration)
    -> Result<ExecOutput, BackendError>;
}
