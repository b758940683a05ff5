use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use dialoguer::{Input, theme::ColorfulTheme};
use std::fs;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::{
    cli::{args::SessionArgs, handlers::commons},
    core::builtins::Builtin,
    models::ExecOptions,
    system::shell::{InteractiveShell, SessionOptions},
};

/// Entry point for `shellgate session`: a line-oriented REPL over one session.
pub fn handle(args: Vec<String>, runtime: &Runtime) -> Result<i32> {
    let args = SessionArgs::parse_from(args);
    let (config, settings) = commons::load_config(args.cwd.clone(), None, args.approval.as_deref())?;
    let options = SessionOptions {
        session_id: args.id.clone(),
        session_timeout: settings.session_timeout(),
        observer: None,
        prompt: Some(Arc::new(commons::DialoguerPrompt)),
    };

    let shell = match &args.load {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!(t!("cli.session.load_failed"), path = path.display()))?;
            InteractiveShell::from_json(&json, config, options)?
        }
        None => InteractiveShell::with_options(config, options),
    };
    let shell = Arc::new(shell);

    println!("{}", format!(t!("cli.session.welcome"), id = shell.id()).bold());
    runtime.block_on(repl(&shell))?;

    if let Some(path) = &args.save {
        fs::write(path, shell.to_json()?)?;
        println!("{}", format!(t!("cli.session.saved"), path = path.display()).dimmed());
    }
    shell.close();
    println!("{}", t!("cli.session.closed").dimmed());
    Ok(0)
}

async fn repl(shell: &Arc<InteractiveShell>) -> Result<()> {
    while shell.is_active() {
        let prompt = shell.cwd().display().to_string();
        let line = tokio::task::spawn_blocking(move || {
            Input::<String>::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
        })
        .await?;

        // EOF or an interrupted terminal ends the session.
        let line = match line {
            Ok(line) => line.trim().to_string(),
            Err(e) => {
                log::debug!("Input ended: {}", e);
                break;
            }
        };
        if line.is_empty() {
            continue;
        }

        // Built-ins do not stream; their output arrives with the result.
        let is_builtin = Builtin::parse(&line).is_some();
        let (sink, printer) = commons::stream_to_terminal();
        let outcome = shell.enqueue(line, ExecOptions::default().stream_to(sink)).await;
        if let Err(e) = printer.await {
            log::debug!("Output printer ended abnormally: {}", e);
        }

        match outcome {
            Ok(result) if is_builtin => {
                print!("{}", result.stdout);
                eprint!("{}", result.stderr);
            }
            Ok(result) if !result.success => {
                eprintln!("{}", format!("[exit {}]", result.exit_code).dimmed());
            }
            Ok(_) => {}
            Err(e) => commons::print_error(&e),
        }
    }
    Ok(())
}
