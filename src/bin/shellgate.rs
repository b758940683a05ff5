// src/bin/shellgate.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use shellgate::cli::{Cli, dispatcher};

/// Sets up logging, dispatches, and turns errors into a styled message and exit code `1`.
/// On success the process exits with the code the handler returned.
fn main() {
    env_logger::init();

    let code = match run_cli(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            1
        }
    };
    std::process::exit(code);
}

fn run_cli(cli: Cli) -> Result<i32> {
    let runtime = tokio::runtime::Runtime::new()?;
    dispatcher::dispatch(cli, &runtime)
}
