use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Resource acquired before a test (or suite) and released after it.
pub trait Fixture {
    fn setup(&mut self) -> HarnessResult<()>;

    fn teardown(&mut self) -> HarnessResult<()>;
}

/// Owns a fixture between setup and teardown.
///
/// Teardown runs exactly once: through [`FixtureGuard::finish`], or on drop
/// when the body returned early, failed or panicked.
pub struct FixtureGuard<F: Fixture> {
    fixture: F,
    torn_down: bool,
}

impl<F: Fixture> FixtureGuard<F> {
    /// Run setup and take ownership of the fixture.
    ///
    /// A failed setup still runs teardown to release partial state.
    pub fn new(mut fixture: F) -> HarnessResult<Self> {
        if let Err(err) = fixture.setup() {
            if let Err(teardown_err) = fixture.teardown() {
                warn!(error = %teardown_err, "teardown after failed setup also failed");
            }
            return Err(err);
        }
        Ok(Self {
            fixture,
            torn_down: false,
        })
    }

    pub fn get(&self) -> &F {
        &self.fixture
    }

    pub fn get_mut(&mut self) -> &mut F {
        &mut self.fixture
    }

    /// Tear down now and surface the teardown result.
    pub fn finish(mut self) -> HarnessResult<()> {
        self.run_teardown()
    }

    fn run_teardown(&mut self) -> HarnessResult<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        self.fixture.teardown()
    }
}

impl<F: Fixture> Drop for FixtureGuard<F> {
    fn drop(&mut self) {
        if let Err(err) = self.run_teardown() {
            warn!(error = %err, "fixture teardown failed");
        }
    }
}

/// Run `body` between setup and teardown of `fixture`.
///
/// The body's error wins over a teardown error; a teardown error is returned
/// only when the body succeeded.
pub fn with_fixture<F, T, B>(fixture: F, body: B) -> HarnessResult<T>
where
    F: Fixture,
    B: FnOnce(&mut F) -> HarnessResult<T>,
{
    let mut guard = FixtureGuard::new(fixture)?;
    let result = body(guard.get_mut());
    let teardown = guard.finish();
    match result {
        Ok(value) => teardown.map(|()| value),
        Err(err) => Err(err),
    }
}

/// A level directory that must not exist before or after the test.
#[derive(Debug, Clone)]
pub struct TempLevel {
    levels_dir: PathBuf,
    name: String,
}

impl TempLevel {
    pub fn new(levels_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            levels_dir: levels_dir.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> PathBuf {
        self.levels_dir.join(&self.name)
    }

    fn remove(&self) -> HarnessResult<()> {
        let mut components = Path::new(&self.name).components();
        let single = matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none();
        if !single {
            return Err(HarnessError::fixture(format!(
                "level name {:?} must be a single path component",
                self.name
            )));
        }
        match fs::remove_dir_all(self.path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(HarnessError::fixture(format!(
                "failed to delete level {}: {err}",
                self.path().display()
            ))),
        }
    }
}

impl Fixture for TempLevel {
    fn setup(&mut self) -> HarnessResult<()> {
        self.remove()
    }

    fn teardown(&mut self) -> HarnessResult<()> {
        self.remove()
    }
}

/// Long-running helper process, such as an asset processor, kept alive for a
/// test or a whole suite.
#[derive(Debug)]
pub struct BackgroundProcess {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    working_directory: Option<PathBuf>,
    child: Option<Child>,
}

impl BackgroundProcess {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_directory: None,
            child: None,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Process id while the process is running.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn is_running(&mut self) -> HarnessResult<bool> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?.is_none()),
            None => Ok(false),
        }
    }
}

impl Fixture for BackgroundProcess {
    fn setup(&mut self) -> HarnessResult<()> {
        if self.child.is_some() {
            return Ok(());
        }
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        let child = cmd.spawn().map_err(|err| {
            HarnessError::fixture(format!("failed to start {}: {err}", self.name))
        })?;
        info!(name = %self.name, pid = child.id(), "started background process");
        self.child = Some(child);
        Ok(())
    }

    fn teardown(&mut self) -> HarnessResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!(name = %self.name, pid = child.id(), "stopping background process");
        if child.try_wait()?.is_none() {
            child.kill()?;
        }
        child.wait()?;
        Ok(())
    }
}
