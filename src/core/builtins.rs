// src/core/builtins.rs

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid");
}

/// Commands a session answers itself instead of spawning a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    /// `cd [target]`; no target means home.
    Cd(Option<String>),
    Pwd,
    /// `export [KEY=VALUE ...]`; no arguments lists the session environment.
    Export(Vec<String>),
    Unset(Vec<String>),
    /// `history [N]`
    History(Option<usize>),
    /// `clear` / `cls`
    Clear,
    /// `exit` / `quit`
    Exit,
}

impl Builtin {
    /// Parses raw input into a built-in.
    ///
    /// Returns `None` when the input is not a built-in, when quoting is unbalanced, or when it
    /// contains shell operators. Compound input such as `cd src && ls` belongs to the shell.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || contains_shell_operator(trimmed) {
            return None;
        }
        let mut tokens = shlex::split(trimmed)?.into_iter();
        let name = tokens.next()?;
        let args: Vec<String> = tokens.collect();

        let builtin = match name.as_str() {
            "cd" => Self::Cd(args.into_iter().next()),
            "pwd" => Self::Pwd,
            "export" => Self::Export(args),
            "unset" => Self::Unset(args),
            "history" => Self::History(args.first().and_then(|n| n.parse().ok())),
            "clear" | "cls" => Self::Clear,
            "exit" | "quit" => Self::Exit,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cd(_) => "cd",
            Self::Pwd => "pwd",
            Self::Export(_) => "export",
            Self::Unset(_) => "unset",
            Self::History(_) => "history",
            Self::Clear => "clear",
            Self::Exit => "exit",
        }
    }
}

/// True when the text chains, pipes, redirects or substitutes commands.
pub fn contains_shell_operator(command: &str) -> bool {
    command.contains("$(")
        || command
            .chars()
            .any(|c| matches!(c, ';' | '|' | '&' | '`' | '\n' | '>' | '<'))
}

/// Extracts the leading `cd <target>` segment of a compound command, if it starts with one.
pub fn leading_cd_target(command: &str) -> Option<String> {
    let trimmed = command.trim_start();
    let rest = trimmed.strip_prefix("cd")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let end = rest
        .find(|c| matches!(c, ';' | '&' | '|' | '\n'))
        .unwrap_or(rest.len());
    let segment = rest.get(..end)?.trim();
    let mut tokens = shlex::split(segment)?.into_iter();
    tokens.next()
}

pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Parses `KEY=VALUE` arguments. Returns the offending token on the first invalid one.
pub fn parse_assignments(args: &[String]) -> Result<Vec<(String, String)>, String> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, value)) if is_valid_identifier(key) => Ok((key.to_string(), value.to_string())),
            _ => Err(arg.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recognizes_every_builtin() {
        assert_eq!(Builtin::parse("cd /tmp"), Some(Builtin::Cd(Some("/tmp".into()))));
        assert_eq!(Builtin::parse("  cd  "), Some(Builtin::Cd(None)));
        assert_eq!(Builtin::parse("cd 'my dir'"), Some(Builtin::Cd(Some("my dir".into()))));
        assert_eq!(Builtin::parse("pwd"), Some(Builtin::Pwd));
        assert_eq!(
            Builtin::parse("export A=1 B=\"two words\""),
            Some(Builtin::Export(vec!["A=1".into(), "B=two words".into()]))
        );
        assert_eq!(Builtin::parse("unset A"), Some(Builtin::Unset(vec!["A".into()])));
        assert_eq!(Builtin::parse("history 5"), Some(Builtin::History(Some(5))));
        assert_eq!(Builtin::parse("history"), Some(Builtin::History(None)));
        assert_eq!(Builtin::parse("cls"), Some(Builtin::Clear));
        assert_eq!(Builtin::parse("quit"), Some(Builtin::Exit));
    }

    #[test]
    fn test_parse_leaves_other_input_to_the_shell() {
        assert_eq!(Builtin::parse("ls -la"), None);
        assert_eq!(Builtin::parse("cd src && ls"), None);
        assert_eq!(Builtin::parse("pwd | cat"), None);
        assert_eq!(Builtin::parse("echo 'unbalanced"), None);
        assert_eq!(Builtin::parse("cdrom"), None);
        assert_eq!(Builtin::parse(""), None);
    }

    #[test]
    fn test_leading_cd_target() {
        assert_eq!(leading_cd_target("cd src && make"), Some("src".into()));
        assert_eq!(leading_cd_target("cd 'a b'; ls"), Some("a b".into()));
        assert_eq!(leading_cd_target("cdx foo && ls"), None);
        assert_eq!(leading_cd_target("ls && cd foo"), None);
    }

    #[test]
    fn test_parse_assignments() {
        let ok = parse_assignments(&["A=1".into(), "_B=x=y".into(), "C=".into()]).unwrap();
        assert_eq!(
            ok,
            vec![
                ("A".into(), "1".into()),
                ("_B".into(), "x=y".into()),
                ("C".into(), String::new())
            ]
        );
        assert_eq!(parse_assignments(&["NOPE".into()]).unwrap_err(), "NOPE");
        assert_eq!(parse_assignments(&["1X=2".into()]).unwrap_err(), "1X=2");
    }
}
