//! toptask - CLI
//!
//! Boots an in-process runtime over the process arguments and runs the
//! top-level task on its worker thread.

use std::process::ExitCode;

use anyhow::{Context, Result};
use toptask::runtime::local::LocalRuntime;
use toptask::util::config::load_user_config;
use toptask::util::logger::{self, LogLevel};
use toptask::{ArgumentVector, TaskError, TopLevel, TopLevelConfig};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("toptask: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let runtime = LocalRuntime::new(ArgumentVector::new(std::env::args()));
    let config = load_user_config().context("Failed to load configuration")?;
    init_logging(&runtime, &config)?;

    let outcome = runtime
        .execute(move |rt| {
            let processor = rt.processor(0);
            TopLevel::new(rt.clone(), config)
                .run(&[], &[], processor)
                .map_err(Failure::from)
        })
        .context("Runtime worker failed")?;

    match outcome {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(Failure { exit_status: Some(status), .. }) => Ok(ExitCode::from(status)),
        Err(Failure { message, .. }) => {
            eprintln!("{}", message);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Runtime options on the command line win over the config file
fn init_logging(
    runtime: &LocalRuntime,
    config: &TopLevelConfig,
) -> Result<()> {
    let options = runtime.options();
    let level = match options.log_level {
        Some(level) => LogLevel::from_runtime_level(level),
        None => config
            .log
            .level
            .parse()
            .map_err(anyhow::Error::msg)
            .context("Invalid log level in configuration")?,
    };

    match options.logfile.as_ref().or(config.log.file.as_ref()) {
        Some(path) => logger::init_with_file(level, path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?,
        None => logger::init_with_level(level),
    }
    Ok(())
}

/// A task error flattened so it can cross back from the worker thread
struct Failure {
    exit_status: Option<u8>,
    message: String,
}

impl From<TaskError> for Failure {
    fn from(err: TaskError) -> Self {
        Self {
            exit_status: err.exit_status(),
            message: err.to_string(),
        }
    }
}
