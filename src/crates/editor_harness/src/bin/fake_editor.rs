//! Stand-in host editor for harness tests.
//!
//! Reads a JSON plan from the `--runpython` path and plays it through the
//! script-side API, so the lines it logs are exactly what a real script
//! would produce.

use std::fs::{self, File};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use editor_harness::{
    idle_wait, run_script, CriticalPolicy, HarnessResult, Poller, Report, ScriptContext, Step,
    TestScript,
};
use serde::Deserialize;

#[derive(Parser)]
struct Args {
    #[arg(long = "runpython")]
    script: PathBuf,

    #[arg(long = "runpythonargs", num_args = 0.., allow_hyphen_values = true)]
    script_args: Vec<String>,

    #[arg(long)]
    autotest_mode: bool,
}

#[derive(Debug, Deserialize)]
struct Plan {
    name: String,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    arg_names: Vec<String>,
    #[serde(default)]
    steps: Vec<PlanStep>,
    /// Write result lines here instead of stdout.
    #[serde(default)]
    log_file: Option<PathBuf>,
    /// Create `<levels_dir>/<level arg>` like the editor does when saving a level.
    #[serde(default)]
    levels_dir: Option<PathBuf>,
    #[serde(default)]
    exit_code: i32,
    #[serde(default)]
    crash: bool,
    /// Keep running this long after the script finished.
    #[serde(default)]
    linger_ms: u64,
}

#[derive(Debug, Deserialize)]
struct PlanStep {
    #[serde(flatten)]
    step: Step,
    #[serde(default)]
    outcome: bool,
    #[serde(default = "continue_policy")]
    policy: CriticalPolicy,
    /// Idle before the step, as a script does after issuing a host command.
    #[serde(default)]
    delay_ms: u64,
    /// Poll a condition that becomes true this long after the step starts.
    #[serde(default)]
    ready_after_ms: Option<u64>,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

fn continue_policy() -> CriticalPolicy {
    CriticalPolicy::Continue
}

fn default_timeout_ms() -> u64 {
    1_000
}

struct PlannedScript {
    plan: Plan,
}

impl TestScript for PlannedScript {
    fn name(&self) -> &str {
        &self.plan.name
    }

    fn run(&mut self, ctx: &mut ScriptContext) -> HarnessResult<()> {
        if let Some(level) = ctx.arg("level").map(str::to_string) {
            if let Some(dir) = &self.plan.levels_dir {
                fs::create_dir_all(dir.join(&level))?;
            }
            ctx.report().info(&format!("Level {level} opened"));
        }

        for planned in &self.plan.steps {
            idle_wait(Duration::from_millis(planned.delay_ms));
            let outcome = match planned.ready_after_ms {
                Some(ready_after) => {
                    let start = Instant::now();
                    let ready_after = Duration::from_millis(ready_after);
                    ctx.wait_for_condition(
                        || start.elapsed() >= ready_after,
                        Duration::from_millis(planned.timeout_ms),
                    )
                }
                None => planned.outcome,
            };
            ctx.report()
                .record_step_with_policy(&planned.step, outcome, planned.policy)?;
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let plan: Plan = serde_json::from_str(&fs::read_to_string(&args.script)?)?;

    let mut report = match &plan.log_file {
        Some(path) => Report::with_sink(File::create(path)?),
        None => Report::stdout(),
    };
    if let Some(prefix) = &plan.prefix {
        report = report.with_prefix(prefix.clone());
    }
    if args.autotest_mode {
        report.info("Autotest mode enabled");
    }

    let arg_names: Vec<&str> = plan.arg_names.iter().map(String::as_str).collect();
    let mut ctx = ScriptContext::new(report, args.script_args.clone())
        .with_arg_names(&arg_names)
        .with_poller(Poller::new(Duration::from_millis(10)));

    let crash = plan.crash;
    let exit_code = plan.exit_code;
    let linger = Duration::from_millis(plan.linger_ms);
    let mut script = PlannedScript { plan };
    run_script(&mut script, &mut ctx);

    if crash {
        std::process::abort();
    }
    thread::sleep(linger);
    std::process::exit(exit_code);
}
