//! # shellgate
//!
//! A guarded command execution engine for automated agents. Commands are classified
//! against a dangerous-pattern set, gated behind an approval policy, spawned through the
//! platform shell with a bounded wall-clock budget and bounded output, and recorded in a
//! fixed-capacity history. [`system::shell::InteractiveShell`] layers a stateful session
//! (working directory, environment, built-ins, FIFO queue) on top of
//! [`system::executor::ShellExecutor`].

include!(concat!(env!("OUT_DIR"), "/translations.rs"));

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;

pub use crate::core::approval::{ApprovalHandler, ApprovalMode, DangerousPatterns, approval_fn};
pub use crate::core::errors::{ErrorContext, ErrorKind, ShellError};
pub use crate::core::history::CommandHistory;
pub use crate::core::output::OutputChunk;
pub use crate::core::session_manager::{SessionManager, SessionSummary};
pub use crate::models::{
    ApprovalContext, ConfigOverrides, ExecOptions, ExecutionObserver, ExecutionResult,
    HistoryEntry, SequenceOptions, SessionObserver, SessionState, ShellConfig,
};
pub use crate::system::executor::ShellExecutor;
pub use crate::system::platform::PlatformInfo;
pub use crate::system::shell::{InteractiveShell, PromptHandler, SessionOptions, SessionSnapshot};
