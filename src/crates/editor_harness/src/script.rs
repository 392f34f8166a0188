//! Script-side lifecycle: the part of the contract that runs inside the host.
//!
//! A script body records steps through [`ScriptContext::report`] and polls
//! host state through [`ScriptContext::wait_for_condition`]. [`run_script`]
//! frames the body with a start line and a summary line, turns a failed
//! critical step into a halted run and runs registered teardowns once.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::HarnessResult;
use crate::poll::Poller;
use crate::report::{CriticalPolicy, Report, Step};
use crate::HarnessError;

/// A test script executed against the host.
pub trait TestScript {
    fn name(&self) -> &str;

    fn run(&mut self, ctx: &mut ScriptContext) -> HarnessResult<()>;
}

type Teardown = Box<dyn FnOnce(&mut Report) + Send>;

/// Per-run state handed to a script body.
pub struct ScriptContext {
    report: Report,
    poller: Poller,
    args: Vec<String>,
    named_args: BTreeMap<String, String>,
    teardowns: Vec<Teardown>,
}

impl ScriptContext {
    pub fn new(report: Report, args: Vec<String>) -> Self {
        Self {
            report,
            poller: Poller::default(),
            args,
            named_args: BTreeMap::new(),
            teardowns: Vec::new(),
        }
    }

    /// Bind positional args to names, in order. Extra names stay unbound.
    pub fn with_arg_names(mut self, names: &[&str]) -> Self {
        self.named_args = names
            .iter()
            .zip(&self.args)
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        self
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.named_args.get(name).map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn report(&mut self) -> &mut Report {
        &mut self.report
    }

    pub fn poller(&self) -> Poller {
        self.poller
    }

    /// Shorthand for [`Report::record_step`].
    pub fn result(&mut self, step: &Step, outcome: bool) -> bool {
        self.report.record_step(step, outcome)
    }

    /// Shorthand for [`Report::critical_result`].
    pub fn critical_result(&mut self, step: &Step, outcome: bool) -> HarnessResult<()> {
        self.report.critical_result(step, outcome)
    }

    pub fn wait_for_condition<F>(&self, predicate: F, timeout: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        self.poller.wait_for_condition(predicate, timeout)
    }

    /// Register cleanup that runs after the body, whatever its outcome.
    pub fn on_teardown<F>(&mut self, teardown: F)
    where
        F: FnOnce(&mut Report) + Send + 'static,
    {
        self.teardowns.push(Box::new(teardown));
    }

    pub fn into_report(self) -> Report {
        self.report
    }

    fn run_teardowns(&mut self) {
        // Reverse registration order, like nested fixtures unwinding.
        while let Some(teardown) = self.teardowns.pop() {
            teardown(&mut self.report);
        }
    }
}

/// Final state of one script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub name: String,
    pub success: bool,
    /// Set when a critical step stopped the script early.
    pub halted: Option<CriticalPolicy>,
}

/// Summary line written at the end of every run.
pub fn summary_line(name: &str, success: bool) -> String {
    let result = if success { "SUCCESS" } else { "FAILURE" };
    format!("Test {name} finished. Result: {result}")
}

/// Run a script body and report its overall result.
pub fn run_script<S: TestScript + ?Sized>(script: &mut S, ctx: &mut ScriptContext) -> ScriptOutcome {
    let name = script.name().to_string();
    ctx.report.reset();
    ctx.report.info(&format!("Starting test {name}"));

    let result = match panic::catch_unwind(AssertUnwindSafe(|| script.run(ctx))) {
        Ok(result) => result,
        Err(payload) => {
            ctx.run_teardowns();
            panic::resume_unwind(payload);
        }
    };

    let mut halted = None;
    let mut success = match result {
        Ok(()) => true,
        Err(HarnessError::CriticalFailure { step, policy }) => {
            debug!(script = %name, %step, ?policy, "critical step halted script");
            halted = Some(policy);
            false
        }
        Err(err) => {
            warn!(script = %name, error = %err, "script raised an error");
            ctx.report.info(&format!("Test {name} raised an error: {err}"));
            false
        }
    };

    ctx.run_teardowns();
    success &= ctx.report.success();
    ctx.report.info(&summary_line(&name, success));

    ScriptOutcome {
        name,
        success,
        halted,
    }
}
