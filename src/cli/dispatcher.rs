use anyhow::Result;
use clap::CommandFactory;
use tokio::runtime::Runtime;

use crate::cli::{Cli, handlers};

/// A CLI action, its aliases, and its handler. Handlers return the process exit code.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &Runtime) -> Result<i32>,
}

/// Every action the binary understands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "classify",
        aliases: &["check"],
        handler: handlers::classify::handle,
    },
    CommandDefinition {
        name: "run",
        aliases: &["exec"],
        handler: handlers::run::handle,
    },
    CommandDefinition {
        name: "session",
        aliases: &["repl"],
        handler: handlers::session::handle,
    },
];

fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Routes parsed arguments to a handler.
///
/// An unknown action is treated as the first word of a command line: `shellgate ls -la`
/// is shorthand for `shellgate run ls -la`.
pub fn dispatch(cli: Cli, runtime: &Runtime) -> Result<i32> {
    log::debug!("CLI args parsed: {:?}", cli);

    let Some(action) = cli.action else {
        Cli::command().print_help()?;
        return Ok(0);
    };

    match find_command(&action) {
        Some(command) => (command.handler)(cli.args, runtime),
        None => {
            let mut run_args = vec![action];
            run_args.extend(cli.args);
            handlers::run::handle(run_args, runtime)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_command_by_name_and_alias() {
        assert_eq!(find_command("run").map(|c| c.name), Some("run"));
        assert_eq!(find_command("repl").map(|c| c.name), Some("session"));
        assert_eq!(find_command("check").map(|c| c.name), Some("classify"));
        assert!(find_command("ls").is_none());
    }
}
