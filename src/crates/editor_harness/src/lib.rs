//! Utilities for running editor test scripts against a host editor process and
//! validating the result lines they log.
//!
//! Two sides share one contract. Inside the host, a script records each step
//! as exactly one of its success or failure texts through [`Report`] and
//! polls host state with [`Poller`]. Outside, the harness launches the host
//! with the script, captures its log and checks every expected line with
//! [`LogMonitor`].
//!
//! Typical usage:
//! ```no_run
//! use editor_harness::{launch_and_validate_results, HostConfig, TestCase};
//!
//! let host = HostConfig::new("/path/to/Editor").with_arg("--autotest_mode");
//! let case = TestCase::new("ComponentAssetList", "EditorScripts/ComponentUpdateListProperty.py")
//!     .with_level("tmp_level")
//!     .expect_line("Set EditorDescriptorListComponent Embedded Assets as List");
//!
//! let report = launch_and_validate_results(&host, &case).expect("expected lines should be logged");
//! assert!(report.passed());
//! ```

mod config;
mod error;
mod fixture;
mod host;
mod log_monitor;
mod poll;
mod report;
mod runner;
mod script;

pub use config::{BackgroundSpec, FixtureScope, HostConfig, SuiteConfig, TestCase};
pub use error::{HarnessError, HarnessResult};
pub use fixture::{with_fixture, BackgroundProcess, Fixture, FixtureGuard, TempLevel};
pub use host::{HostProcess, LogLine, LogStream, SCRIPT_ARG, SCRIPT_ARGS_ARG};
pub use log_monitor::{launch_and_validate_results, run_case, CaseRun, LogMonitor, ValidationReport};
pub use poll::{idle_wait, Poller};
pub use report::{
    CriticalPolicy, Report, Step, FAILURE_PREFIX, SUCCESS_PREFIX, SUITE_ABORT_MARKER,
};
pub use runner::{CaseOutcome, SuiteReport, SuiteRunner};
pub use script::{run_script, summary_line, ScriptContext, ScriptOutcome, TestScript};
