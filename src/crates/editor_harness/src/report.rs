use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{HarnessError, HarnessResult};

/// Prefix written before the text of a passing step.
pub const SUCCESS_PREFIX: &str = "Success:";
/// Prefix written before the text of a failing step.
pub const FAILURE_PREFIX: &str = "Failure:";
/// Line written when a critical step asks the runner to skip the rest of the suite.
pub const SUITE_ABORT_MARKER: &str = "Suite aborted by critical step:";

/// Expected-result pair for a single test step.
///
/// Exactly one of the two texts ends up in the log for every recorded step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub success: String,
    pub failure: String,
}

impl Step {
    pub fn new(success: impl Into<String>, failure: impl Into<String>) -> Self {
        Self {
            success: success.into(),
            failure: failure.into(),
        }
    }

    /// Text to emit for the given outcome.
    pub fn text_for(&self, outcome: bool) -> &str {
        if outcome {
            &self.success
        } else {
            &self.failure
        }
    }
}

impl From<(&str, &str)> for Step {
    fn from((success, failure): (&str, &str)) -> Self {
        Step::new(success, failure)
    }
}

/// What a failed step does to the remaining work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalPolicy {
    /// Best-effort continuation: record the failure and keep going.
    Continue,
    /// Halt the current script.
    #[default]
    AbortScript,
    /// Halt the current script and ask the runner to skip later cases.
    AbortSuite,
}

/// Writes result lines to a log sink and accumulates the overall outcome.
pub struct Report {
    prefix: Option<String>,
    sink: Box<dyn Write + Send>,
    transcript: Vec<String>,
    success: bool,
    recorded: usize,
}

impl Report {
    /// Report that writes to the process stdout, which the host forwards to its log.
    pub fn stdout() -> Self {
        Self::with_sink(io::stdout())
    }

    pub fn with_sink(sink: impl Write + Send + 'static) -> Self {
        Self {
            prefix: None,
            sink: Box::new(sink),
            transcript: Vec::new(),
            success: true,
            recorded: 0,
        }
    }

    /// Prepend `prefix: ` to every written line.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Record a step outcome. Returns the outcome so calls chain with `&&`.
    pub fn record_step(&mut self, step: &Step, outcome: bool) -> bool {
        let label = if outcome {
            SUCCESS_PREFIX
        } else {
            FAILURE_PREFIX
        };
        self.write_line(&format!("{label} {}", step.text_for(outcome)));
        self.success &= outcome;
        self.recorded += 1;
        outcome
    }

    /// Non-critical result; identical to [`Report::record_step`].
    pub fn result(&mut self, step: &Step, outcome: bool) -> bool {
        self.record_step(step, outcome)
    }

    /// Record a step whose failure halts the current script.
    pub fn critical_result(&mut self, step: &Step, outcome: bool) -> HarnessResult<()> {
        self.record_step_with_policy(step, outcome, CriticalPolicy::AbortScript)
            .map(|_| ())
    }

    /// Record a step and apply `policy` if it failed.
    pub fn record_step_with_policy(
        &mut self,
        step: &Step,
        outcome: bool,
        policy: CriticalPolicy,
    ) -> HarnessResult<bool> {
        self.record_step(step, outcome);
        if outcome || policy == CriticalPolicy::Continue {
            return Ok(outcome);
        }

        if policy == CriticalPolicy::AbortSuite {
            self.write_line(&format!("{SUITE_ABORT_MARKER} {}", step.failure));
        }
        Err(HarnessError::CriticalFailure {
            step: step.failure.clone(),
            policy,
        })
    }

    /// Informational line; never affects the outcome.
    pub fn info(&mut self, message: &str) {
        self.write_line(message);
    }

    /// Logical AND of every recorded outcome. True when nothing was recorded.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Number of steps recorded since the last reset.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Lines written since the last reset, without the prefix.
    pub fn lines(&self) -> &[String] {
        &self.transcript
    }

    /// Start a new script run.
    pub fn reset(&mut self) {
        self.success = true;
        self.recorded = 0;
        self.transcript.clear();
    }

    fn write_line(&mut self, line: &str) {
        let written = match &self.prefix {
            Some(prefix) => writeln!(self.sink, "{prefix}: {line}"),
            None => writeln!(self.sink, "{line}"),
        };
        if let Err(err) = written.and_then(|()| self.sink.flush()) {
            warn!(error = %err, line, "failed to write result line to the log sink");
        }
        self.transcript.push(line.to_string());
    }
}

impl std::fmt::Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Report")
            .field("prefix", &self.prefix)
            .field("success", &self.success)
            .field("recorded", &self.recorded)
            .finish_non_exhaustive()
    }
}
