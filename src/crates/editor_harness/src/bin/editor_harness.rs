use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use editor_harness::{SuiteConfig, SuiteRunner};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Run editor test scripts and validate their logged results", long_about = None)]
struct Cli {
    /// Suite file (JSON) listing the host binary and the cases to run
    suite: PathBuf,

    /// Only run cases whose name contains this text
    #[arg(short, long)]
    filter: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let suite = match SuiteConfig::load(&cli.suite) {
        Ok(suite) => suite,
        Err(err) => {
            error!("failed to load suite {}: {err}", cli.suite.display());
            return ExitCode::from(2);
        }
    };
    info!("Loaded {} case(s) from {}", suite.cases.len(), cli.suite.display());

    let mut runner = SuiteRunner::new(suite);
    if let Some(filter) = cli.filter {
        runner = runner.with_filter(filter);
    }

    let report = runner.run();
    println!("{}", report.summary());

    if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
