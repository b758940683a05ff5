// src/cli/handlers/commons.rs

// Shared helpers for the CLI handlers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use dialoguer::{Input, theme::ColorfulTheme};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

use crate::{
    core::{
        config_loader::{self, ShellSettings},
        errors::ShellError,
        output::OutputChunk,
    },
    models::{ApprovalContext, ShellConfig},
    system::shell::PromptHandler,
};

/// Loads the user's settings and applies command-line overrides on top.
pub fn load_config(
    cwd: Option<PathBuf>,
    timeout_ms: Option<u64>,
    approval: Option<&str>,
) -> Result<(ShellConfig, ShellSettings)> {
    let settings = config_loader::load_settings().context(t!("cli.error.settings"))?;

    let cwd = match cwd {
        Some(dir) => dunce::canonicalize(&dir)
            .with_context(|| format!(t!("cli.error.bad_cwd"), path = dir.display()))?,
        None => std::env::current_dir()?,
    };

    let mut config = settings.clone().into_config(cwd)?;
    if let Some(ms) = timeout_ms {
        config.timeout_ms = ms;
    }
    if let Some(mode) = approval {
        config.approval_mode = mode.parse()?;
    }
    Ok((config, settings))
}

/// Asks for approval on the terminal.
#[derive(Debug, Default)]
pub struct DialoguerPrompt;

#[async_trait]
impl PromptHandler for DialoguerPrompt {
    async fn prompt(&self, message: &str, _context: &ApprovalContext) -> Result<String> {
        // The last line of the message is the question itself.
        let (body, question) = match message.rsplit_once('\n') {
            Some((body, question)) => (body.to_string(), question.to_string()),
            None => (String::new(), message.to_string()),
        };
        let answer = tokio::task::spawn_blocking(move || {
            if !body.is_empty() {
                eprintln!("\n{}", body.yellow());
            }
            Input::<String>::with_theme(&ColorfulTheme::default())
                .with_prompt(question)
                .allow_empty(true)
                .interact_text()
        })
        .await??;
        Ok(answer)
    }
}

/// Spawns a task that copies streamed output to the terminal as it arrives.
///
/// The task ends once every sender is gone. Dropping the receiver (on a broken pipe) cancels
/// the running command.
pub fn stream_to_terminal() -> (UnboundedSender<OutputChunk>, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<OutputChunk>();
    let printer = tokio::spawn(async move {
        while let Some(chunk) = receiver.recv().await {
            let written = match &chunk {
                OutputChunk::Stdout(bytes) => {
                    let mut out = std::io::stdout().lock();
                    out.write_all(bytes).and_then(|()| out.flush())
                }
                OutputChunk::Stderr(bytes) => {
                    let mut err = std::io::stderr().lock();
                    err.write_all(bytes).and_then(|()| err.flush())
                }
            };
            if let Err(e) = written {
                log::debug!("Terminal write failed: {}", e);
                break;
            }
        }
    });
    (sender, printer)
}

/// Prints a library error in the binary's error style.
pub fn print_error(error: &ShellError) {
    eprintln!("{}: {}", t!("cli.error.label").red().bold(), error);
}
