use anyhow::Result;
use clap::Parser;
use colored::*;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::{
    cli::{args::RunArgs, handlers::commons},
    core::errors::ErrorKind,
    models::ExecOptions,
    system::{executor::ShellExecutor, shell::PromptApproval},
};

/// Exit code reported when a command is denied, like a shell's "cannot execute".
const EXIT_DENIED: i32 = 126;
/// Exit code reported on timeout, matching coreutils `timeout`.
const EXIT_TIMED_OUT: i32 = 124;

/// Entry point for `shellgate run`. Returns the command's own exit code.
pub fn handle(args: Vec<String>, runtime: &Runtime) -> Result<i32> {
    let args = RunArgs::parse_from(args);
    let (mut config, _) = commons::load_config(args.cwd.clone(), args.timeout, args.approval.as_deref())?;
    if config.approval_handler.is_none() {
        config.approval_handler = Some(Arc::new(PromptApproval::new(Arc::new(commons::DialoguerPrompt))));
    }

    let command = args.command.join(" ");
    let executor = ShellExecutor::new(config);
    runtime.block_on(execute(&executor, &command, args.json))
}

async fn execute(executor: &ShellExecutor, command: &str, json: bool) -> Result<i32> {
    let outcome = if json {
        executor.execute(command, ExecOptions::default()).await
    } else {
        let (sink, printer) = commons::stream_to_terminal();
        let outcome = executor
            .execute(command, ExecOptions::default().stream_to(sink))
            .await;
        if let Err(e) = printer.await {
            log::debug!("Output printer ended abnormally: {}", e);
        }
        outcome
    };

    match outcome {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.truncated {
                eprintln!("{}", t!("cli.run.truncated").dimmed());
            }
            Ok(result.exit_code)
        }
        Err(e) if e.kind() == ErrorKind::Permission => {
            eprintln!("{} {}", t!("cli.run.denied").red().bold(), e);
            Ok(EXIT_DENIED)
        }
        Err(e) if e.kind() == ErrorKind::Timeout => {
            eprintln!("{} {}", t!("cli.run.timeout").yellow().bold(), e);
            Ok(EXIT_TIMED_OUT)
        }
        Err(e) => Err(e.into()),
    }
}
