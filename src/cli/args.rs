// src/cli/args.rs
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)] // The dispatcher has already consumed the action name.
pub struct RunArgs {
    /// Working directory for the command. Defaults to the current directory.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Timeout in milliseconds; `0` disables it.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Approval mode: never, always, dangerous or custom.
    #[arg(long)]
    pub approval: Option<String>,

    /// Print the full execution result as JSON instead of streaming output.
    #[arg(long)]
    pub json: bool,

    /// The command line to run.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct ClassifyArgs {
    /// Print the classification as JSON.
    #[arg(long)]
    pub json: bool,

    /// The command line to classify.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct SessionArgs {
    /// Restore a session previously written with `--save`.
    #[arg(long)]
    pub load: Option<PathBuf>,

    /// Write the session to this file when it ends.
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Starting directory for a new session.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Session id for a new session.
    #[arg(long)]
    pub id: Option<String>,

    /// Approval mode: never, always, dangerous or custom.
    #[arg(long)]
    pub approval: Option<String>,
}
