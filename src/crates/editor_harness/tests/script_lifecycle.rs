#[path = "harness_support.rs"]
mod support;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use editor_harness::{
    run_script, summary_line, CriticalPolicy, HarnessError, HarnessResult, Report, ScriptContext,
    Step, TestScript,
};
use support::SharedLog;

/// Joint collision scenario: game mode, two entity lookups, then the collision check.
struct BallJointScript {
    lead_found: bool,
    collided: bool,
    panic_in_body: bool,
    raise_io_error: bool,
}

impl BallJointScript {
    fn passing() -> Self {
        Self {
            lead_found: true,
            collided: true,
            panic_in_body: false,
            raise_io_error: false,
        }
    }
}

impl TestScript for BallJointScript {
    fn name(&self) -> &str {
        "Joints_BallLeadFollowerCollide"
    }

    fn run(&mut self, ctx: &mut ScriptContext) -> HarnessResult<()> {
        ctx.critical_result(&Step::new("Entered game mode", "Failed to enter game mode"), true)?;
        ctx.critical_result(&Step::new("Found lead", "Did not find lead"), self.lead_found)?;
        ctx.critical_result(&Step::new("Found follower", "Did not find follower"), true)?;
        if self.panic_in_body {
            panic!("host binding blew up");
        }
        if self.raise_io_error {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "bus unavailable").into());
        }
        let collided = self.collided;
        let observed = ctx.wait_for_condition(|| collided, Duration::from_millis(20));
        ctx.result(
            &Step::new("Lead and follower collided", "Lead and follower did not collide"),
            observed,
        );
        ctx.result(&Step::new("Exited game mode", "Couldn't exit game mode"), true);
        Ok(())
    }
}

fn context(log: &SharedLog) -> ScriptContext {
    ScriptContext::new(Report::with_sink(log.clone()), vec!["tmp_level".to_string()])
        .with_arg_names(&["level"])
}

fn counting_teardown(ctx: &mut ScriptContext) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    ctx.on_teardown(move |report| {
        counter.fetch_add(1, Ordering::SeqCst);
        report.info("teardown ran");
    });
    count
}

#[test]
fn passing_script_reports_success_summary() {
    let log = SharedLog::default();
    let mut ctx = context(&log);
    let teardowns = counting_teardown(&mut ctx);

    let outcome = run_script(&mut BallJointScript::passing(), &mut ctx);

    assert!(outcome.success);
    assert_eq!(outcome.halted, None);
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    let lines = log.lines();
    assert_eq!(lines.first().map(String::as_str), Some("Starting test Joints_BallLeadFollowerCollide"));
    assert_eq!(
        lines.last().map(String::as_str),
        Some(summary_line("Joints_BallLeadFollowerCollide", true).as_str())
    );
}

#[test]
fn failed_critical_step_skips_remaining_steps() {
    let log = SharedLog::default();
    let mut ctx = context(&log);
    let teardowns = counting_teardown(&mut ctx);
    let mut script = BallJointScript {
        lead_found: false,
        ..BallJointScript::passing()
    };

    let outcome = run_script(&mut script, &mut ctx);

    assert!(!outcome.success);
    assert_eq!(outcome.halted, Some(CriticalPolicy::AbortScript));
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    let lines = log.lines();
    assert!(lines.iter().any(|line| line == "Failure: Did not find lead"));
    assert!(!lines.iter().any(|line| line.contains("Found follower")));
    assert!(!lines.iter().any(|line| line.contains("collide")));
    assert!(lines.iter().any(|line| line.ends_with("Result: FAILURE")));
}

#[test]
fn non_critical_failure_still_runs_later_steps() {
    let log = SharedLog::default();
    let mut ctx = context(&log);
    let mut script = BallJointScript {
        collided: false,
        ..BallJointScript::passing()
    };

    let outcome = run_script(&mut script, &mut ctx);

    assert!(!outcome.success);
    assert_eq!(outcome.halted, None);
    let lines = log.lines();
    assert!(lines.iter().any(|line| line == "Failure: Lead and follower did not collide"));
    assert!(lines.iter().any(|line| line == "Success: Exited game mode"));
}

#[test]
fn script_error_fails_run_and_still_tears_down() {
    let log = SharedLog::default();
    let mut ctx = context(&log);
    let teardowns = counting_teardown(&mut ctx);
    let mut script = BallJointScript {
        raise_io_error: true,
        ..BallJointScript::passing()
    };

    let outcome = run_script(&mut script, &mut ctx);

    assert!(!outcome.success);
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert!(log.lines().iter().any(|line| line.contains("bus unavailable")));
}

#[test]
fn panicking_script_still_tears_down_once() {
    let log = SharedLog::default();
    let mut ctx = context(&log);
    let teardowns = counting_teardown(&mut ctx);
    let mut script = BallJointScript {
        panic_in_body: true,
        ..BallJointScript::passing()
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| run_script(&mut script, &mut ctx)));

    assert!(result.is_err());
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn success_flag_resets_between_runs() {
    let log = SharedLog::default();
    let mut ctx = context(&log);

    let first = run_script(
        &mut BallJointScript {
            collided: false,
            ..BallJointScript::passing()
        },
        &mut ctx,
    );
    let second = run_script(&mut BallJointScript::passing(), &mut ctx);

    assert!(!first.success);
    assert!(second.success);
}

#[test]
fn named_args_bind_in_order() {
    let ctx = ScriptContext::new(
        Report::with_sink(std::io::sink()),
        vec!["tmp_level".to_string(), "extra".to_string()],
    )
    .with_arg_names(&["level", "mode", "unbound"]);

    assert_eq!(ctx.arg("level"), Some("tmp_level"));
    assert_eq!(ctx.arg("mode"), Some("extra"));
    assert_eq!(ctx.arg("unbound"), None);
    assert_eq!(ctx.args().len(), 2);
    assert_eq!(ctx.poller().interval(), Duration::from_millis(100));
    assert!(ctx.into_report().success());
}

#[test]
fn critical_error_is_reported_as_critical() {
    let mut report = Report::with_sink(std::io::sink());
    let err = report
        .critical_result(&Step::new("ok", "broken"), false)
        .expect_err("critical failure");
    assert!(matches!(err, HarnessError::CriticalFailure { .. }));
}
