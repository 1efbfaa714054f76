//! Webcamoid Windows deploy CLI entrypoint.
//!
//! This binary stages a MinGW cross-compiled build and writes the portable
//! and installer packages. Progress goes to the log on stderr; package
//! summaries go to stdout.

use camino::Utf8PathBuf;
use clap::Parser;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use webcamoid_deploy::cli::Cli;
use webcamoid_deploy::error::Result;
use webcamoid_deploy::exec::SystemCommandExecutor;
use webcamoid_deploy::pipeline::Deploy;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    let mut stderr = std::io::stderr();
    let exit_code = exit_code_for_run_result(run(&cli), &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().without_time().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let current_dir = Utf8PathBuf::try_from(std::env::current_dir()?)?;
    let options = cli.deploy_options(&current_dir);
    let mut deploy = Deploy::detect(&options, Arc::new(SystemCommandExecutor::from_env()))?;

    if cli.should_prepare() {
        deploy.prepare()?;
    }
    if cli.should_package() {
        let console = Mutex::new(std::io::stdout());
        deploy.package(&console)?;
    }

    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format_args!("error: {err}"));
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Nothing left to report to.
    }
}
