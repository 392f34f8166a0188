use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HarnessError, HarnessResult};
use crate::fixture::BackgroundProcess;
use crate::report::CriticalPolicy;

/// How the harness starts the editor for every case.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Editor or launcher executable that accepts `--runpython`.
    pub binary_path: PathBuf,
    /// Editor flags such as `--autotest_mode`, placed ahead of the script.
    pub extra_args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Usually the project root, so the editor finds its assets.
    pub working_directory: Option<PathBuf>,
    /// How long the editor may stay silent after launch.
    pub startup_timeout: Duration,
    /// Default time a case may run before the editor is killed.
    pub run_timeout: Duration,
    /// Read results from this log file instead of the captured stdout/stderr.
    pub log_file: Option<PathBuf>,
}

impl HostConfig {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            extra_args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
            startup_timeout: Duration::from_secs(30),
            run_timeout: Duration::from_secs(180),
            log_file: None,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Validate against a log file written by the host, e.g. `Editor.log`.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

/// A single scripted test: which script to run and which lines prove it passed.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    pub name: String,
    /// Script path handed to the host.
    pub script: PathBuf,
    /// Script arguments, usually the level name first.
    #[serde(default)]
    pub args: Vec<String>,
    /// Lines that must all appear in the log.
    #[serde(default)]
    pub expected_lines: Vec<String>,
    /// Lines that must not appear in the log.
    #[serde(default)]
    pub unexpected_lines: Vec<String>,
    /// Overrides the host run timeout for this case.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Temporary level removed before and after the case.
    #[serde(default)]
    pub level: Option<String>,
    /// `AbortSuite` makes a failure of this case skip the remaining cases.
    #[serde(default)]
    pub critical_policy: CriticalPolicy,
}

impl TestCase {
    pub fn new(name: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            args: Vec::new(),
            expected_lines: Vec::new(),
            unexpected_lines: Vec::new(),
            timeout_secs: None,
            level: None,
            critical_policy: CriticalPolicy::default(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn expect_line(mut self, line: impl Into<String>) -> Self {
        self.expected_lines.push(line.into());
        self
    }

    pub fn reject_line(mut self, line: impl Into<String>) -> Self {
        self.unexpected_lines.push(line.into());
        self
    }

    /// Manage `level` as a temporary level and pass it as the first script argument.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Arguments handed to the script; the level leads unless already listed.
    pub fn script_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(level) = &self.level {
            if !args.contains(level) {
                args.insert(0, level.clone());
            }
        }
        args
    }

    pub fn with_critical_policy(mut self, policy: CriticalPolicy) -> Self {
        self.critical_policy = policy;
        self
    }

    /// Per-case run timeout, rounded up to whole seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let partial = u64::from(timeout.subsec_nanos() > 0);
        self.timeout_secs = Some(timeout.as_secs().saturating_add(partial).max(1));
        self
    }

    /// Run timeout for this case, falling back to the host default.
    pub fn run_timeout(&self, host: &HostConfig) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(host.run_timeout)
    }
}

/// Suite description loaded from JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct SuiteConfig {
    /// Host binary; relative paths resolve against the suite file.
    pub host: PathBuf,
    #[serde(default)]
    pub host_args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Project root; used as the host working directory.
    #[serde(default)]
    pub project_dir: Option<PathBuf>,
    /// Directory holding levels; temporary levels are created under it.
    #[serde(default)]
    pub levels_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub startup_timeout_secs: Option<u64>,
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    /// Skip remaining cases after a critical step requests a suite abort.
    #[serde(default = "default_true")]
    pub stop_on_suite_abort: bool,
    /// Helper process kept running around the suite or each case.
    #[serde(default)]
    pub background: Option<BackgroundSpec>,
    pub cases: Vec<TestCase>,
}

fn default_true() -> bool {
    true
}

/// When a background process is started and stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureScope {
    /// Once before the first case, stopped after the last.
    #[default]
    Suite,
    /// Around every case.
    Case,
}

/// Background process declared by a suite, such as the asset processor.
#[derive(Debug, Clone, Deserialize)]
pub struct BackgroundSpec {
    #[serde(default = "default_background_name")]
    pub name: String,
    /// Executable; relative paths resolve against the suite file.
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub scope: FixtureScope,
}

fn default_background_name() -> String {
    "asset processor".to_string()
}

impl BackgroundSpec {
    /// Unstarted fixture for this process, run from `working_directory` when given.
    pub fn process(&self, working_directory: Option<&Path>) -> BackgroundProcess {
        let mut process = BackgroundProcess::new(&self.name, &self.program);
        for arg in &self.args {
            process = process.with_arg(arg);
        }
        if let Some(dir) = working_directory {
            process = process.with_working_directory(dir);
        }
        process
    }
}

impl SuiteConfig {
    /// Parse a suite file and resolve its relative paths.
    pub fn load(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut suite: SuiteConfig = serde_json::from_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        suite.resolve_paths(base);
        suite.validate()?;
        Ok(suite)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.host);
        if let Some(dir) = self.project_dir.as_mut() {
            resolve(dir);
        }
        if let Some(dir) = self.levels_dir.as_mut() {
            resolve(dir);
        }
        if let Some(file) = self.log_file.as_mut() {
            resolve(file);
        }
        if let Some(background) = self.background.as_mut() {
            resolve(&mut background.program);
        }
        for case in &mut self.cases {
            resolve(&mut case.script);
        }
    }

    /// Reject suites the runner could not execute meaningfully.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.cases.is_empty() {
            return Err(HarnessError::Suite("suite has no cases".to_string()));
        }
        for case in &self.cases {
            if case.expected_lines.is_empty() {
                return Err(HarnessError::Suite(format!(
                    "case {} declares no expected lines",
                    case.name
                )));
            }
            if case.level.is_some() && self.levels_dir.is_none() {
                return Err(HarnessError::Suite(format!(
                    "case {} uses a temporary level but the suite has no levels_dir",
                    case.name
                )));
            }
        }
        Ok(())
    }

    /// Host configuration shared by every case.
    pub fn host_config(&self) -> HostConfig {
        let mut config = HostConfig::new(&self.host);
        config.extra_args = self.host_args.clone();
        config.env = self.env.clone();
        config.working_directory = self.project_dir.clone();
        config.log_file = self.log_file.clone();
        if let Some(secs) = self.startup_timeout_secs {
            config.startup_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.run_timeout_secs {
            config.run_timeout = Duration::from_secs(secs);
        }
        config
    }
}
