use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{HostConfig, TestCase};
use crate::error::{HarnessError, HarnessResult};
use crate::host::HostProcess;
use crate::poll::Poller;

/// Matches expected and unexpected lines against a captured log.
///
/// Matching is a literal substring test per log line; every expected line is
/// looked up independently, so one log line may satisfy several expectations.
#[derive(Debug, Clone, Default)]
pub struct LogMonitor {
    expected: Vec<String>,
    unexpected: Vec<String>,
}

impl LogMonitor {
    pub fn new(expected: Vec<String>, unexpected: Vec<String>) -> Self {
        Self {
            expected,
            unexpected,
        }
    }

    pub fn for_case(case: &TestCase) -> Self {
        Self::new(case.expected_lines.clone(), case.unexpected_lines.clone())
    }

    /// Check `lines` against the expectations.
    pub fn validate<S: AsRef<str>>(&self, lines: &[S]) -> ValidationReport {
        let contains = |needle: &str| lines.iter().any(|line| line.as_ref().contains(needle));

        let (found, missing): (Vec<String>, Vec<String>) = self
            .expected
            .iter()
            .cloned()
            .partition(|expected| contains(expected.as_str()));
        let unexpected_found = self
            .unexpected
            .iter()
            .filter(|unexpected| contains(unexpected.as_str()))
            .cloned()
            .collect();

        ValidationReport {
            found,
            missing,
            unexpected_found,
            exit_code: None,
            timed_out: false,
        }
    }

    /// Re-read `path` until every expected line shows up or `timeout` elapses.
    ///
    /// A log file that does not exist yet counts as empty.
    pub fn monitor_file(
        &self,
        path: &Path,
        timeout: Duration,
        poller: Poller,
    ) -> HarnessResult<ValidationReport> {
        let mut lines = Vec::new();
        let mut read_error = None;
        poller.wait_for_condition(
            || match read_lines(path) {
                Ok(current) => {
                    lines = current;
                    self.validate(&lines).missing.is_empty()
                }
                Err(err) => {
                    read_error = Some(err);
                    true
                }
            },
            timeout,
        );

        if let Some(err) = read_error {
            return Err(err.into());
        }
        Ok(self.validate(&lines))
    }
}

fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text.lines().map(str::to_string).collect()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

/// Outcome of matching a log against a case's expectations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub found: Vec<String>,
    pub missing: Vec<String>,
    pub unexpected_found: Vec<String>,
    /// Host exit code when validation followed a host run that ended on its own.
    pub exit_code: Option<i32>,
    /// The host outlived its run timeout and was killed; the log is what it
    /// wrote until then.
    pub timed_out: bool,
}

impl ValidationReport {
    /// Every expected line present, no unexpected line present, and a clean host exit.
    ///
    /// A host killed at the run timeout has no exit code; its captured lines
    /// alone decide.
    pub fn passed(&self) -> bool {
        self.missing.is_empty()
            && self.unexpected_found.is_empty()
            && self.exit_code.map_or(true, |code| code == 0)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} expected line(s) found, {} missing",
            self.found.len(),
            self.missing.len()
        )?;
        if !self.missing.is_empty() {
            write!(f, " [{}]", self.missing.join("; "))?;
        }
        if !self.unexpected_found.is_empty() {
            write!(f, ", unexpected [{}]", self.unexpected_found.join("; "))?;
        }
        if let Some(code) = self.exit_code.filter(|code| *code != 0) {
            write!(f, ", host exit code {code}")?;
        }
        if self.timed_out {
            write!(f, ", host killed at run timeout")?;
        }
        Ok(())
    }
}

/// Captured log of one host run plus its validation.
#[derive(Debug, Clone)]
pub struct CaseRun {
    pub report: ValidationReport,
    pub lines: Vec<String>,
}

/// Launch the host with the case's script, wait for it and validate its log.
///
/// Expectation failures are part of the returned report; only launch
/// problems are errors here. A host still running at the case timeout is
/// killed and whatever it logged is validated.
pub fn run_case(host: &HostConfig, case: &TestCase) -> HarnessResult<CaseRun> {
    let monitor = LogMonitor::for_case(case);
    let timeout = case.run_timeout(host);

    if let Some(path) = &host.log_file {
        // Lines left over from an earlier run must not satisfy this one.
        match fs::remove_file(path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
            _ => {}
        }
    }

    let mut process = HostProcess::launch(host, &case.script, &case.script_args())?;
    let status = process.wait_or_kill(timeout)?;

    let lines = match &host.log_file {
        Some(path) => read_lines(path)?,
        None => process.lines(),
    };
    let mut report = monitor.validate(&lines);
    match status {
        // A signal-terminated host has no code; treat it as a crash.
        Some(status) => report.exit_code = Some(status.code().unwrap_or(-1)),
        None => report.timed_out = true,
    }
    debug!(case = %case.name, %report, "validated host log");

    Ok(CaseRun { report, lines })
}

/// Launch the host with the case's script and validate what it logged.
///
/// Returns the report on success and [`HarnessError::Validation`] carrying the
/// same report when any expectation failed.
pub fn launch_and_validate_results(
    host: &HostConfig,
    case: &TestCase,
) -> HarnessResult<ValidationReport> {
    let run = run_case(host, case)?;
    if run.report.passed() {
        info!(case = %case.name, "all expected lines found");
        Ok(run.report)
    } else {
        Err(HarnessError::Validation(run.report))
    }
}
