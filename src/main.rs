use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod aws;
mod cli;
mod config;
mod execution;
mod model;
mod poll;
mod progress;
mod propagation;
mod render;
mod services;
#[cfg(test)]
mod testing;
mod workflow;

const ENV_LOG: &str = "AMI_AUTOMATION_LOG";

fn main() -> Result<ExitCode> {
    let args = cli::RootArgs::parse();
    init_tracing(args.global.verbose)?;
    if args.global.no_color {
        colored::control::set_override(false);
    }
    workflow::dispatch(args).map(ExitCode::from)
}

/// Diagnostics go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize logging: {err}"))
}
