// src/core/errors.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Execution context attached to every [`ShellError`] that concerns a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub command: String,
    pub cwd: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ErrorContext {
    /// Creates a context carrying only the command and its working directory.
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    /// Attaches the environment overlay that was in effect.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Attaches the elapsed time.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' in '{}'", self.command, self.cwd.display())
    }
}

/// Coarse classification of a [`ShellError`], useful for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Permission,
    Exit,
    Signal,
    Spawn,
    Cancelled,
    SessionClosed,
    InvalidPattern,
    Serialization,
    Config,
}

/// The error taxonomy of the execution engine.
///
/// Ordinary non-zero exits are *not* errors on the single-command path: they come back as a
/// failed `ExecutionResult`. `Exit` and `Signal` are produced only when a caller asks for a
/// checked result (`ExecutionResult::into_checked`, `ShellExecutor::run`).
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Command {context} timed out after {timeout_ms}ms")]
    Timeout {
        context: ErrorContext,
        timeout_ms: u64,
    },
    #[error("Command {context} was not approved: {reason}")]
    Permission {
        context: ErrorContext,
        reason: String,
    },
    #[error("Command {context} exited with code {code}")]
    Exit { context: ErrorContext, code: i32 },
    #[error("Command {context} was terminated by signal {signal}")]
    Signal {
        context: ErrorContext,
        signal: String,
    },
    #[error("Command {context} could not be spawned: {source}")]
    Spawn {
        context: ErrorContext,
        #[source]
        source: std::io::Error,
    },
    #[error("Command {context} was cancelled: the output receiver was dropped")]
    Cancelled { context: ErrorContext },
    #[error("Session '{session_id}' is closed")]
    SessionClosed { session_id: String },
    #[error("Invalid dangerous pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ShellError {
    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::Exit { .. } => ErrorKind::Exit,
            Self::Signal { .. } => ErrorKind::Signal,
            Self::Spawn { .. } => ErrorKind::Spawn,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::SessionClosed { .. } => ErrorKind::SessionClosed,
            Self::InvalidPattern { .. } => ErrorKind::InvalidPattern,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns the execution context, if this error concerns a specific command.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Timeout { context, .. }
            | Self::Permission { context, .. }
            | Self::Exit { context, .. }
            | Self::Signal { context, .. }
            | Self::Spawn { context, .. }
            | Self::Cancelled { context } => Some(context),
            Self::SessionClosed { .. }
            | Self::InvalidPattern { .. }
            | Self::Serialization(_)
            | Self::Config(_) => None,
        }
    }

    /// Shorthand for a permission failure.
    pub fn permission(context: ErrorContext, reason: impl Into<String>) -> Self {
        Self::Permission {
            context,
            reason: reason.into(),
        }
    }
}
