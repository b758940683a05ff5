use anyhow::Result;
use clap::Parser;
use colored::*;
use tokio::runtime::Runtime;

use crate::cli::{args::ClassifyArgs, handlers::commons};

/// Entry point for `shellgate classify`: reports which dangerous patterns a command matches
/// without running it.
pub fn handle(args: Vec<String>, _runtime: &Runtime) -> Result<i32> {
    let args = ClassifyArgs::parse_from(args);
    let (config, _) = commons::load_config(None, None, None)?;

    let command = args.command.join(" ");
    let classification = config.dangerous_patterns.classify(&command);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
    } else if classification.is_dangerous {
        println!("{}", t!("cli.classify.dangerous").red().bold());
        for pattern in &classification.matched_patterns {
            println!("  {} {}", "-".dimmed(), pattern.yellow());
        }
    } else {
        println!("{}", t!("cli.classify.safe").green());
    }
    Ok(0)
}
