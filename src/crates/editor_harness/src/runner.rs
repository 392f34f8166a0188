use std::fmt::Write as _;

use tracing::{error, info, warn};

use crate::config::{FixtureScope, HostConfig, SuiteConfig, TestCase};
use crate::error::{HarnessError, HarnessResult};
use crate::fixture::{Fixture, FixtureGuard, TempLevel};
use crate::log_monitor::{run_case, CaseRun};
use crate::report::{CriticalPolicy, SUITE_ABORT_MARKER};

/// Result of one case within a suite run.
#[derive(Debug, Clone, Default)]
pub struct CaseOutcome {
    pub name: String,
    pub passed: bool,
    pub skipped: bool,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    /// Infrastructure error that prevented validation.
    pub error: Option<String>,
}

/// Aggregated suite result.
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    pub cases: Vec<CaseOutcome>,
    /// Case whose critical failure stopped the suite.
    pub aborted_by: Option<String>,
    /// Suite-level fixture failed to tear down.
    pub fixture_error: Option<String>,
}

impl SuiteReport {
    /// True when every case ran and passed and suite teardown succeeded.
    pub fn passed(&self) -> bool {
        !self.cases.is_empty()
            && self.cases.iter().all(|case| case.passed)
            && self.fixture_error.is_none()
    }

    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|case| case.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.cases
            .iter()
            .filter(|case| !case.passed && !case.skipped)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.cases.iter().filter(|case| case.skipped).count()
    }

    /// Human-readable summary, one line per case.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for case in &self.cases {
            let status = if case.skipped {
                "SKIPPED"
            } else if case.passed {
                "PASSED"
            } else {
                "FAILED"
            };
            let _ = writeln!(out, "{status} {}", case.name);
            for line in &case.missing {
                let _ = writeln!(out, "    missing: {line}");
            }
            for line in &case.unexpected {
                let _ = writeln!(out, "    unexpected: {line}");
            }
            if let Some(err) = &case.error {
                let _ = writeln!(out, "    error: {err}");
            }
        }
        if let Some(name) = &self.aborted_by {
            let _ = writeln!(out, "suite aborted after {name}");
        }
        if let Some(err) = &self.fixture_error {
            let _ = writeln!(out, "suite teardown failed: {err}");
        }
        let _ = write!(
            out,
            "{} passed, {} failed, {} skipped",
            self.passed_count(),
            self.failed_count(),
            self.skipped_count()
        );
        out
    }
}

/// Runs suite cases one after another, each against a fresh host process.
pub struct SuiteRunner {
    suite: SuiteConfig,
    host: HostConfig,
    filter: Option<String>,
}

impl SuiteRunner {
    pub fn new(suite: SuiteConfig) -> Self {
        let host = suite.host_config();
        Self {
            suite,
            host,
            filter: None,
        }
    }

    /// Only run cases whose name contains `filter`.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn host_config(&self) -> &HostConfig {
        &self.host
    }

    /// Run the selected cases, inside the suite's background process when it
    /// declares one with suite scope.
    pub fn run(&self) -> SuiteReport {
        match &self.suite.background {
            Some(spec) if spec.scope == FixtureScope::Suite => {
                self.run_within(spec.process(self.suite.project_dir.as_deref()))
            }
            _ => self.run_cases(),
        }
    }

    /// Run the selected cases between one setup and one teardown of `fixture`.
    ///
    /// A failed setup fails every selected case without launching the host.
    pub fn run_within<F: Fixture>(&self, fixture: F) -> SuiteReport {
        let guard = match FixtureGuard::new(fixture) {
            Ok(guard) => guard,
            Err(err) => {
                error!(error = %err, "suite fixture setup failed");
                let cases = self
                    .selected_cases()
                    .map(|case| CaseOutcome {
                        name: case.name.clone(),
                        error: Some(format!("suite fixture setup failed: {err}")),
                        ..CaseOutcome::default()
                    })
                    .collect();
                return SuiteReport {
                    cases,
                    ..SuiteReport::default()
                };
            }
        };

        let mut report = self.run_cases();
        if let Err(err) = guard.finish() {
            error!(error = %err, "suite fixture teardown failed");
            report.fixture_error = Some(err.to_string());
        }
        report
    }

    fn run_cases(&self) -> SuiteReport {
        let mut report = SuiteReport::default();

        for case in self.selected_cases() {
            if report.aborted_by.is_some() {
                report.cases.push(CaseOutcome {
                    name: case.name.clone(),
                    skipped: true,
                    ..CaseOutcome::default()
                });
                continue;
            }

            info!(case = %case.name, "running case");
            let (outcome, abort) = match self.run_one(case) {
                Ok(run) => {
                    let abort = run
                        .lines
                        .iter()
                        .any(|line| line.contains(SUITE_ABORT_MARKER));
                    let outcome = CaseOutcome {
                        name: case.name.clone(),
                        passed: run.report.passed(),
                        skipped: false,
                        missing: run.report.missing,
                        unexpected: run.report.unexpected_found,
                        error: match run.report.exit_code {
                            Some(code) if code != 0 => Some(format!("host exit code {code}")),
                            _ if run.report.timed_out => {
                                Some("host killed at run timeout".to_string())
                            }
                            _ => None,
                        },
                    };
                    (outcome, abort)
                }
                Err(err) => {
                    error!(case = %case.name, error = %err, "case could not be validated");
                    let outcome = CaseOutcome {
                        name: case.name.clone(),
                        error: Some(err.to_string()),
                        ..CaseOutcome::default()
                    };
                    (outcome, false)
                }
            };

            let abort = self.suite.stop_on_suite_abort
                && (abort
                    || (!outcome.passed && case.critical_policy == CriticalPolicy::AbortSuite));
            if abort {
                warn!(case = %case.name, "critical failure, skipping remaining cases");
                report.aborted_by = Some(case.name.clone());
            }
            report.cases.push(outcome);
        }

        report
    }

    fn selected_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.suite.cases.iter().filter(move |case| match &self.filter {
            Some(filter) => case.name.contains(filter.as_str()),
            None => true,
        })
    }

    fn run_one(&self, case: &TestCase) -> HarnessResult<CaseRun> {
        let level = match (&case.level, &self.suite.levels_dir) {
            (Some(name), Some(dir)) => Some(FixtureGuard::new(TempLevel::new(dir, name))?),
            (Some(name), None) => {
                return Err(HarnessError::Suite(format!(
                    "case {} needs levels_dir for level {name}",
                    case.name
                )))
            }
            (None, _) => None,
        };
        let background = match &self.suite.background {
            Some(spec) if spec.scope == FixtureScope::Case => Some(FixtureGuard::new(
                spec.process(self.suite.project_dir.as_deref()),
            )?),
            _ => None,
        };

        let mut run = run_case(&self.host, case);
        if let Some(guard) = background {
            let teardown = guard.finish();
            if run.is_ok() {
                run = teardown.and(run);
            }
        }
        if let Some(guard) = level {
            let teardown = guard.finish();
            if run.is_ok() {
                run = teardown.and(run);
            }
        }
        run
    }
}
