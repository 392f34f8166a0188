use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::log_monitor::ValidationReport;
use crate::report::CriticalPolicy;

/// Result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors raised while launching the host, running a script or validating its log.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to launch host: {0}")]
    HostStart(String),
    #[error("host terminated early with status {0}")]
    HostExited(ExitStatus),
    #[error("host did not finish within {0:?}")]
    HostTimeout(Duration),
    #[error("critical step failed: {step} ({policy:?})")]
    CriticalFailure {
        step: String,
        policy: CriticalPolicy,
    },
    #[error("log validation failed: {0}")]
    Validation(ValidationReport),
    #[error("fixture error: {0}")]
    Fixture(String),
    #[error("invalid suite: {0}")]
    Suite(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub(crate) fn host_start(err: impl Into<String>) -> Self {
        HarnessError::HostStart(err.into())
    }

    pub(crate) fn fixture(message: impl Into<String>) -> Self {
        HarnessError::Fixture(message.into())
    }

    /// Critical failures halt the script; everything else is infrastructure or validation.
    pub fn is_critical(&self) -> bool {
        matches!(self, HarnessError::CriticalFailure { .. })
    }
}
