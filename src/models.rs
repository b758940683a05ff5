// src/models.rs

use crate::constants::{DEFAULT_MAX_HISTORY_ENTRIES, DEFAULT_MAX_OUTPUT_SIZE, DEFAULT_TIMEOUT_MS};
use crate::core::approval::{ApprovalHandler, ApprovalMode, DangerousPatterns};
use crate::core::errors::{ErrorContext, ShellError};
use crate::core::output::OutputChunk;
use crate::system::platform::PlatformInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

// --- OBSERVERS ---

/// Announces a command that passed approval and is about to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStart {
    pub id: String,
    pub command: String,
    pub cwd: PathBuf,
}

/// Receives lifecycle notifications from a `ShellExecutor`. Every method defaults to a no-op.
pub trait ExecutionObserver: Send + Sync {
    fn on_start(&self, _start: &ExecutionStart) {}
    fn on_stdout(&self, _id: &str, _chunk: &[u8]) {}
    fn on_stderr(&self, _id: &str, _chunk: &[u8]) {}
    fn on_complete(&self, _result: &ExecutionResult) {}
}

/// Receives a snapshot of the session every time its state changes.
pub trait SessionObserver: Send + Sync {
    fn on_session_change(&self, state: &SessionState);
}

// --- CONFIGURATION ---

/// Defaults for one `ShellExecutor`. Only `cwd` is mutable after construction
/// (through `ShellExecutor::set_cwd`).
#[derive(Clone)]
pub struct ShellConfig {
    pub cwd: PathBuf,
    /// Overlay merged over the inherited process environment.
    pub env: HashMap<String, String>,
    /// Wall-clock budget in milliseconds; `0` means unbounded.
    pub timeout_ms: u64,
    pub max_output_size: usize,
    pub approval_mode: ApprovalMode,
    pub approval_handler: Option<Arc<dyn ApprovalHandler>>,
    /// Upper bound on the approval await. `None` waits as long as the handler takes.
    pub approval_timeout: Option<Duration>,
    pub dangerous_patterns: DangerousPatterns,
    pub track_history: bool,
    pub max_history_entries: usize,
    pub observer: Option<Arc<dyn ExecutionObserver>>,
}

impl fmt::Debug for ShellConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellConfig")
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_output_size", &self.max_output_size)
            .field("approval_mode", &self.approval_mode)
            .field("approval_handler", &self.approval_handler.is_some())
            .field("approval_timeout", &self.approval_timeout)
            .field("dangerous_patterns", &self.dangerous_patterns)
            .field("track_history", &self.track_history)
            .field("max_history_entries", &self.max_history_entries)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PlatformInfo::current().home_or_temp()),
            env: HashMap::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
            approval_mode: ApprovalMode::default(),
            approval_handler: None,
            approval_timeout: None,
            dangerous_patterns: DangerousPatterns::default(),
            track_history: true,
            max_history_entries: DEFAULT_MAX_HISTORY_ENTRIES,
            observer: None,
        }
    }
}

impl ShellConfig {
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_output_size(mut self, max_output_size: usize) -> Self {
        self.max_output_size = max_output_size;
        self
    }

    pub fn with_approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = mode;
        self
    }

    pub fn with_approval_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.approval_handler = Some(handler);
        self
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = Some(timeout);
        self
    }

    pub fn with_dangerous_patterns(mut self, patterns: DangerousPatterns) -> Self {
        self.dangerous_patterns = patterns;
        self
    }

    pub fn with_history(mut self, track: bool, max_entries: usize) -> Self {
        self.track_history = track;
        self.max_history_entries = max_entries;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns a copy with every `Some` field of `overrides` applied.
    pub fn merged(&self, overrides: ConfigOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(cwd) = overrides.cwd {
            merged.cwd = cwd;
        }
        if let Some(env) = overrides.env {
            merged.env.extend(env);
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            merged.timeout_ms = timeout_ms;
        }
        if let Some(max) = overrides.max_output_size {
            merged.max_output_size = max;
        }
        if let Some(mode) = overrides.approval_mode {
            merged.approval_mode = mode;
        }
        if let Some(handler) = overrides.approval_handler {
            merged.approval_handler = Some(handler);
        }
        if let Some(timeout) = overrides.approval_timeout {
            merged.approval_timeout = Some(timeout);
        }
        if let Some(patterns) = overrides.dangerous_patterns {
            merged.dangerous_patterns = patterns;
        }
        if let Some(observer) = overrides.observer {
            merged.observer = Some(observer);
        }
        merged
    }
}

/// A partial `ShellConfig` used by `ShellExecutor::with_overrides`.
#[derive(Clone, Default)]
pub struct ConfigOverrides {
    pub cwd: Option<PathBuf>,
    /// Merged key-by-key into the existing overlay.
    pub env: Option<HashMap<String, String>>,
    pub timeout_ms: Option<u64>,
    pub max_output_size: Option<usize>,
    pub approval_mode: Option<ApprovalMode>,
    pub approval_handler: Option<Arc<dyn ApprovalHandler>>,
    pub approval_timeout: Option<Duration>,
    pub dangerous_patterns: Option<DangerousPatterns>,
    pub observer: Option<Arc<dyn ExecutionObserver>>,
}

impl fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_output_size", &self.max_output_size)
            .field("approval_mode", &self.approval_mode)
            .finish_non_exhaustive()
    }
}

/// Per-call options for `ShellExecutor::execute`.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub cwd: Option<PathBuf>,
    /// Merged over the executor's overlay.
    pub env: Option<HashMap<String, String>>,
    /// Overrides the configured timeout; `Some(0)` disables it for this call.
    pub timeout_ms: Option<u64>,
    pub skip_approval: bool,
    /// Receives output chunks as they arrive. Dropping the receiver cancels the command.
    pub output: Option<UnboundedSender<OutputChunk>>,
}

impl ExecOptions {
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn skip_approval(mut self) -> Self {
        self.skip_approval = true;
        self
    }

    pub fn stream_to(mut self, sender: UnboundedSender<OutputChunk>) -> Self {
        self.output = Some(sender);
        self
    }
}

/// Options for `ShellExecutor::execute_sequence`.
#[derive(Debug, Clone)]
pub struct SequenceOptions {
    /// Halt on the first failed step (and propagate thrown errors). Defaults to `true`.
    pub stop_on_error: bool,
    pub exec: ExecOptions,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            exec: ExecOptions::default(),
        }
    }
}

// --- VALUES ---

/// Everything an approval handler needs to make its decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalContext {
    pub command: String,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub is_dangerous: bool,
    pub matched_patterns: Vec<String>,
    pub platform: PlatformInfo,
}

/// The outcome of one command invocation. Non-zero exits are reported here, not as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub id: String,
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Stdout and stderr interleaved in the order they were received.
    pub combined: String,
    pub success: bool,
    pub duration_ms: u64,
    pub cwd: PathBuf,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    /// `true` when the approval policy cleared the command; `false` when it was bypassed.
    pub approved: bool,
}

impl ExecutionResult {
    /// A zero-duration result for commands the session answers itself.
    pub fn synthetic(command: &str, cwd: PathBuf, exit_code: i32, stdout: String, stderr: String) -> Self {
        let combined = match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.clone(),
            (true, false) => stderr.clone(),
            (false, false) => format!("{}{}", stdout, stderr),
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            command: command.to_string(),
            exit_code,
            stdout,
            stderr,
            combined,
            success: exit_code == 0,
            duration_ms: 0,
            cwd,
            truncated: false,
            signal: None,
            approved: true,
        }
    }

    /// Converts a failed result into the matching `Exit` or `Signal` error.
    pub fn into_checked(self) -> Result<Self, ShellError> {
        if self.success {
            return Ok(self);
        }
        let context = ErrorContext {
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            env: None,
            exit_code: Some(self.exit_code),
            signal: self.signal.clone(),
            duration_ms: Some(self.duration_ms),
        };
        match self.signal {
            Some(signal) => Err(ShellError::Signal { context, signal }),
            None => Err(ShellError::Exit {
                context,
                code: self.exit_code,
            }),
        }
    }
}

/// One command's lifecycle as recorded by `CommandHistory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub command: String,
    pub cwd: PathBuf,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub truncated: bool,
}

impl HistoryEntry {
    /// True once `CommandHistory::complete` has filled in the end-of-life fields.
    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Mutable state of one `InteractiveShell`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub command_count: u64,
    pub active: bool,
    #[serde(default)]
    pub previous_dir: Option<PathBuf>,
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, cwd: PathBuf, env: BTreeMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            cwd,
            env,
            start_time: now,
            last_activity: now,
            command_count: 0,
            active: true,
            previous_dir: None,
            data: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_result_is_zero_duration() {
        let result = ExecutionResult::synthetic("pwd", PathBuf::from("/tmp"), 0, "/tmp".into(), String::new());
        assert!(result.success);
        assert_eq!(result.duration_ms, 0);
        assert_eq!(result.combined, "/tmp");
        assert!(result.approved);
    }

    #[test]
    fn test_into_checked_maps_failures() {
        let failed = ExecutionResult::synthetic("false", PathBuf::from("/"), 1, String::new(), String::new());
        let err = failed.into_checked().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Exit);
        assert_eq!(err.context().and_then(|c| c.exit_code), Some(1));

        let mut killed = ExecutionResult::synthetic("sleep 9", PathBuf::from("/"), 137, String::new(), String::new());
        killed.signal = Some("SIGKILL".to_string());
        let err = killed.into_checked().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Signal);
    }

    #[test]
    fn test_merged_overrides_only_touch_given_fields() {
        let base = ShellConfig::default()
            .with_cwd("/srv")
            .with_env("A", "1")
            .with_timeout_ms(1000);
        let mut env = HashMap::new();
        env.insert("B".to_string(), "2".to_string());
        let merged = base.merged(ConfigOverrides {
            env: Some(env),
            timeout_ms: Some(0),
            ..ConfigOverrides::default()
        });
        assert_eq!(merged.cwd, PathBuf::from("/srv"));
        assert_eq!(merged.env.get("A").map(String::as_str), Some("1"));
        assert_eq!(merged.env.get("B").map(String::as_str), Some("2"));
        assert_eq!(merged.timeout_ms, 0);
        assert_eq!(base.timeout_ms, 1000);
    }

    #[test]
    fn test_session_state_round_trips_through_json() {
        let state = SessionState::new("s1", PathBuf::from("/tmp"), BTreeMap::new());
        let json = serde_json::to_value(&state).unwrap();
        assert!(json["startTime"].is_string());
        let back: SessionState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
