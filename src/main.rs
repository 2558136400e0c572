//! dts-e2e
//!
//! Runs one end-to-end pass of the data transfer service against local SQLite
//! stores and reports PASS or FAIL.
//!
//! Usage:
//!   dts-e2e [--debug | --no-debug]
//!
//! Exit status: 0 passed, 1 verification failed, 2 the run itself failed.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use dts_harness::{orchestrator, Harness, HarnessConfig, RunOutcome};

#[derive(Parser, Debug)]
#[command(name = "dts-e2e")]
#[command(about = "End-to-end test of the data transfer service")]
struct Args {
    /// Don't clean up databases
    #[arg(long, overrides_with = "no_debug")]
    debug: bool,

    /// Remove both databases after the run (default)
    #[arg(long = "no-debug", overrides_with = "debug")]
    no_debug: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let args = Args::parse();
    let keep_stores = args.debug && !args.no_debug;

    let result = run(keep_stores);
    let status = orchestrator::exit_status(&result);
    match result {
        Ok(outcome) => println!("{}", outcome.verdict),
        Err(e) => {
            let report = anyhow::Error::new(e);
            error!("harness run failed: {:#}", report);
            eprintln!("ERROR: {:#}", report);
        }
    }
    ExitCode::from(status)
}

fn run(keep_stores: bool) -> dts_harness::Result<RunOutcome> {
    let config = HarnessConfig::default();
    info!("Starting data transfer harness");
    info!("  Server port: {}", config.server_port);
    info!("  Intervals: {} x {}s", config.interval_count, config.interval_secs);
    info!("  Keep stores: {}", keep_stores);

    let mut harness = Harness::new(config, keep_stores)?;
    let window = harness.plan_window()?;
    println!("Start time: {}", window.start);
    println!("End time: {}", window.end);

    harness.run(&window)
}
