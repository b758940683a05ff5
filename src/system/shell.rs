// src/system/shell.rs

//! # Interactive Session
//!
//! [`InteractiveShell`] wraps one [`ShellExecutor`] with session state: a working directory
//! and environment that persist across commands, built-ins answered in-process, and a FIFO
//! queue that keeps at most one queued command in flight.
//!
//! Lifecycle is `active -> closed`, one way. A closed session rejects new work with
//! [`ShellError::SessionClosed`].
//!
//! `exec` bypasses the queue; mixing it with `enqueue` on the same session lets commands
//! interleave.

use crate::constants::{CLEAR_SCREEN, OLDPWD_VAR, PWD_VAR};
use crate::core::approval::ApprovalHandler;
use crate::core::builtins::{Builtin, leading_cd_target, parse_assignments};
use crate::core::errors::ShellError;
use crate::core::history::HistorySnapshot;
use crate::models::{
    ApprovalContext, ExecOptions, ExecutionResult, HistoryEntry, SessionObserver, SessionState,
    ShellConfig,
};
use crate::system::executor::ShellExecutor;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

// --- PROMPT-BASED APPROVAL ---

/// Asks a human a question and returns the raw answer.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn prompt(&self, message: &str, context: &ApprovalContext) -> anyhow::Result<String>;
}

/// The approval function used when a session has a prompt handler but no explicit approver.
///
/// `y`/`yes` approves and `n`/`no` rejects. Any other answer approves ordinary commands
/// and rejects dangerous ones. A failed prompt rejects.
pub struct PromptApproval {
    handler: Arc<dyn PromptHandler>,
}

impl fmt::Debug for PromptApproval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PromptApproval")
    }
}

impl PromptApproval {
    /// Approves through `handler`.
    pub fn new(handler: Arc<dyn PromptHandler>) -> Self {
        Self { handler }
    }

    /// Builds the text shown to the user for `context`.
    pub fn message(context: &ApprovalContext) -> String {
        let mut lines = Vec::new();
        if context.is_dangerous {
            lines.push(t!("prompt.dangerous.header").to_string());
            lines.push(format!(
                t!("prompt.dangerous.matched"),
                patterns = context.matched_patterns.join(", ")
            ));
        }
        lines.push(format!(t!("prompt.label.command"), command = context.command));
        lines.push(format!(t!("prompt.label.cwd"), cwd = context.cwd.display()));
        lines.push(if context.is_dangerous {
            t!("prompt.dangerous.question").to_string()
        } else {
            t!("prompt.safe.question").to_string()
        });
        lines.join("\n")
    }

    fn interpret(answer: &str, is_dangerous: bool) -> bool {
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => true,
            "n" | "no" => false,
            _ => !is_dangerous,
        }
    }
}

#[async_trait]
impl ApprovalHandler for PromptApproval {
    async fn approve(&self, context: &ApprovalContext) -> bool {
        let message = Self::message(context);
        match self.handler.prompt(&message, context).await {
            Ok(answer) => Self::interpret(&answer, context.is_dangerous),
            Err(e) => {
                log::warn!("Approval prompt for '{}' failed: {:#}", context.command, e);
                false
            }
        }
    }
}

// --- SESSION ---

/// Session-level options that do not belong to the executor.
#[derive(Clone, Default)]
pub struct SessionOptions {
    /// Generated when absent.
    pub session_id: Option<String>,
    /// Idle time after which the session closes itself. `None` never expires.
    pub session_timeout: Option<Duration>,
    pub observer: Option<Arc<dyn SessionObserver>>,
    /// Installs a [`PromptApproval`] when the config carries no approval handler.
    pub prompt: Option<Arc<dyn PromptHandler>>,
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("session_id", &self.session_id)
            .field("session_timeout", &self.session_timeout)
            .field("observer", &self.observer.is_some())
            .field("prompt", &self.prompt.is_some())
            .finish()
    }
}

/// Wire form of a session: `{state, history}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub history: HistorySnapshot,
}

type Reply = oneshot::Sender<Result<ExecutionResult, ShellError>>;

struct QueuedCommand {
    command: String,
    options: ExecOptions,
    reply: Reply,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedCommand>,
    processing: bool,
}

/// A stateful command session over one [`ShellExecutor`].
pub struct InteractiveShell {
    executor: ShellExecutor,
    state: Mutex<SessionState>,
    queue: Mutex<QueueState>,
    observer: Option<Arc<dyn SessionObserver>>,
    session_timeout: Option<Duration>,
}

impl fmt::Debug for InteractiveShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveShell")
            .field("state", &self.state())
            .field("executor", &self.executor)
            .field("session_timeout", &self.session_timeout)
            .finish_non_exhaustive()
    }
}

impl InteractiveShell {
    /// Opens a session with default options.
    pub fn new(config: ShellConfig) -> Self {
        Self::with_options(config, SessionOptions::default())
    }

    /// Opens a session. `config.env` becomes the initial session environment.
    pub fn with_options(mut config: ShellConfig, options: SessionOptions) -> Self {
        if config.approval_handler.is_none() {
            if let Some(prompt) = options.prompt {
                config.approval_handler = Some(Arc::new(PromptApproval::new(prompt)));
            }
        }
        // The session owns the environment; the executor only sees it per call.
        let env: BTreeMap<String, String> = std::mem::take(&mut config.env).into_iter().collect();
        let session_id = options
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let state = SessionState::new(session_id, config.cwd.clone(), env);
        log::debug!("Session {} opened in '{}'", state.session_id, state.cwd.display());

        Self {
            executor: ShellExecutor::new(config),
            state: Mutex::new(state),
            queue: Mutex::new(QueueState::default()),
            observer: options.observer,
            session_timeout: options.session_timeout,
        }
    }

    // --- Accessors ---

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session id.
    pub fn id(&self) -> String {
        self.lock_state().session_id.clone()
    }

    /// A copy of the current session state.
    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    /// The session working directory.
    pub fn cwd(&self) -> PathBuf {
        self.lock_state().cwd.clone()
    }

    /// The session environment overlay.
    pub fn env(&self) -> BTreeMap<String, String> {
        self.lock_state().env.clone()
    }

    /// The executor commands run through.
    pub fn executor(&self) -> &ShellExecutor {
        &self.executor
    }

    /// Commands waiting in the queue (not counting the one in flight).
    pub fn pending(&self) -> usize {
        self.lock_queue().pending.len()
    }

    /// Stores an arbitrary JSON value with the session.
    pub fn set_data(&self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        self.update(|state| {
            state.data.insert(key, value);
        });
    }

    /// Reads a value stored with [`set_data`](Self::set_data).
    pub fn get_data(&self, key: &str) -> Option<serde_json::Value> {
        self.lock_state().data.get(key).cloned()
    }

    /// The `n` most recent history entries of the underlying executor, oldest first.
    pub fn history(&self, n: usize) -> Vec<HistoryEntry> {
        self.executor.history_last(n)
    }

    // --- Lifecycle ---

    /// False once closed, or once idle for longer than the session timeout (which closes it).
    ///
    /// Idle time counts from the end of the last command. A session with queued work in
    /// flight is never idle.
    pub fn is_active(&self) -> bool {
        let idle_too_long = {
            let state = self.lock_state();
            if !state.active {
                return false;
            }
            let idle = (Utc::now() - state.last_activity).to_std().unwrap_or_default();
            self.session_timeout.is_some_and(|limit| idle > limit)
        };
        if idle_too_long && !self.lock_queue().processing {
            log::info!("Session {} expired after inactivity", self.id());
            self.close();
            return false;
        }
        true
    }

    /// Closes the session and rejects every queued command. Closing twice is a no-op.
    pub fn close(&self) {
        let was_active = {
            let mut state = self.lock_state();
            std::mem::replace(&mut state.active, false)
        };
        let pending: Vec<QueuedCommand> = self.lock_queue().pending.drain(..).collect();
        if !pending.is_empty() {
            log::debug!("Rejecting {} queued command(s) on close", pending.len());
        }
        for item in pending {
            let _ = item.reply.send(Err(self.closed_error()));
        }
        if was_active {
            log::debug!("Session {} closed", self.id());
            self.notify();
        }
    }

    fn closed_error(&self) -> ShellError {
        ShellError::SessionClosed {
            session_id: self.id(),
        }
    }

    fn ensure_open(&self) -> Result<(), ShellError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(self.closed_error())
        }
    }

    fn notify(&self) {
        if let Some(observer) = &self.observer {
            let snapshot = self.state();
            observer.on_session_change(&snapshot);
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let out = {
            let mut state = self.lock_state();
            f(&mut state)
        };
        self.notify();
        out
    }

    // --- Execution ---

    /// Runs one command in this session, answering built-ins in-process.
    pub async fn exec(&self, command: &str, options: ExecOptions) -> Result<ExecutionResult, ShellError> {
        self.ensure_open()?;
        self.lock_state().last_activity = Utc::now();

        let outcome = match Builtin::parse(command) {
            Some(builtin) => {
                log::debug!("Built-in '{}' in session {}", builtin.name(), self.id());
                Ok(self.run_builtin(command, builtin).await)
            }
            None => self.passthrough(command, options).await,
        };

        self.update(|state| {
            state.last_activity = Utc::now();
            if outcome.is_ok() {
                state.command_count += 1;
            }
        });
        outcome
    }

    /// Queues `command` and resolves once it has run. Queued commands run one at a time in
    /// submission order.
    pub async fn enqueue(
        self: &Arc<Self>,
        command: impl Into<String>,
        options: ExecOptions,
    ) -> Result<ExecutionResult, ShellError> {
        self.ensure_open()?;
        let (reply, receiver) = oneshot::channel();
        let start_drain = {
            let mut queue = self.lock_queue();
            queue.pending.push_back(QueuedCommand {
                command: command.into(),
                options,
                reply,
            });
            !std::mem::replace(&mut queue.processing, true)
        };
        if start_drain {
            let shell = Arc::clone(self);
            tokio::spawn(async move { shell.drain_queue().await });
        }
        receiver.await.unwrap_or_else(|_| Err(self.closed_error()))
    }

    async fn drain_queue(self: Arc<Self>) {
        let shell = Arc::clone(&self);
        let mut finished = scopeguard::guard(false, move |finished| {
            if !finished {
                shell.lock_queue().processing = false;
            }
        });

        loop {
            let next = {
                let mut queue = self.lock_queue();
                match queue.pending.pop_front() {
                    Some(item) => item,
                    None => {
                        queue.processing = false;
                        break;
                    }
                }
            };
            let result = self.exec(&next.command, next.options).await;
            if next.reply.send(result).is_err() {
                log::debug!("Caller of queued '{}' went away before it finished", next.command);
            }
        }
        *finished = true;
    }

    async fn passthrough(&self, command: &str, mut options: ExecOptions) -> Result<ExecutionResult, ShellError> {
        let (cwd, env) = {
            let state = self.lock_state();
            (state.cwd.clone(), state.env.clone())
        };
        let cwd = options.cwd.get_or_insert(cwd).clone();
        let mut merged: HashMap<String, String> = env.into_iter().collect();
        if let Some(extra) = options.env.take() {
            merged.extend(extra);
        }
        options.env = Some(merged);

        let result = self.executor.execute(command, options).await?;

        if result.success {
            if let Some(target) = leading_cd_target(command) {
                self.resync_cwd(&cwd, &target);
            }
        }
        Ok(result)
    }

    /// Follows a `cd` that ran inside a compound command.
    fn resync_cwd(&self, base: &Path, target: &str) {
        if target == "-" {
            return;
        }
        let expanded = PathBuf::from(shellexpand::tilde(target).as_ref());
        let candidate = if expanded.is_absolute() { expanded } else { base.join(expanded) };
        match dunce::canonicalize(&candidate) {
            Ok(resolved) if resolved.is_dir() => {
                log::debug!("Re-synced session cwd to '{}'", resolved.display());
                self.commit_cwd(resolved);
            }
            _ => log::debug!("Could not re-sync cwd to '{}'", candidate.display()),
        }
    }

    // --- Built-ins ---

    async fn run_builtin(&self, command: &str, builtin: Builtin) -> ExecutionResult {
        match builtin {
            Builtin::Cd(target) => self.change_directory(target.as_deref()).await,
            Builtin::Pwd => {
                let cwd = self.cwd();
                let stdout = format!("{}\n", cwd.display());
                ExecutionResult::synthetic(command, cwd, 0, stdout, String::new())
            }
            Builtin::Export(args) => self.export(command, &args),
            Builtin::Unset(names) => {
                self.update(|state| {
                    for name in &names {
                        state.env.remove(name);
                    }
                });
                ExecutionResult::synthetic(command, self.cwd(), 0, String::new(), String::new())
            }
            Builtin::History(n) => {
                let entries = match n {
                    Some(n) => self.history(n),
                    None => self.history(usize::MAX),
                };
                let listing: String = entries
                    .iter()
                    .enumerate()
                    .map(|(i, entry)| format!("{:>5}  {}\n", i + 1, entry.command))
                    .collect();
                ExecutionResult::synthetic(command, self.cwd(), 0, listing, String::new())
            }
            Builtin::Clear => {
                ExecutionResult::synthetic(command, self.cwd(), 0, CLEAR_SCREEN.to_string(), String::new())
            }
            Builtin::Exit => {
                self.close();
                ExecutionResult::synthetic(command, self.cwd(), 0, String::new(), String::new())
            }
        }
    }

    fn export(&self, command: &str, args: &[String]) -> ExecutionResult {
        if args.is_empty() {
            let listing: String = self
                .env()
                .iter()
                .map(|(key, value)| format!("{}={}\n", key, value))
                .collect();
            return ExecutionResult::synthetic(command, self.cwd(), 0, listing, String::new());
        }
        match parse_assignments(args) {
            Ok(pairs) => {
                self.update(|state| state.env.extend(pairs));
                ExecutionResult::synthetic(command, self.cwd(), 0, String::new(), String::new())
            }
            Err(bad) => {
                let stderr = format!("export: `{}': not a valid identifier\n", bad);
                ExecutionResult::synthetic(command, self.cwd(), 1, String::new(), stderr)
            }
        }
    }

    /// Changes the session directory. Never fails: an unusable target yields a failed result
    /// and leaves the directory unchanged.
    pub async fn change_directory(&self, target: Option<&str>) -> ExecutionResult {
        let command = match target {
            Some(t) => format!("cd {}", t),
            None => "cd".to_string(),
        };
        let (current, previous) = {
            let state = self.lock_state();
            (state.cwd.clone(), state.previous_dir.clone())
        };
        let target = target.map(str::trim).unwrap_or("");

        let resolved = match target {
            "" | "~" => Ok(self.executor.platform().home_or_temp()),
            "-" => previous.ok_or_else(|| "cd: OLDPWD not set\n".to_string()),
            t if t.starts_with('~') => Ok(PathBuf::from(shellexpand::tilde(t).as_ref())),
            t if Path::new(t).is_absolute() => Ok(PathBuf::from(t)),
            t => self.resolve_through_shell(t, &current).await,
        };

        let resolved = match resolved {
            Ok(path) if path.is_dir() => path,
            Ok(_) => {
                let stderr = format!("cd: {}: No such file or directory\n", target);
                return ExecutionResult::synthetic(&command, current, 1, String::new(), stderr);
            }
            Err(stderr) => return ExecutionResult::synthetic(&command, current, 1, String::new(), stderr),
        };

        self.commit_cwd(resolved.clone());
        // `cd -` echoes the new directory, like POSIX shells do.
        let stdout = if target == "-" {
            format!("{}\n", resolved.display())
        } else {
            String::new()
        };
        ExecutionResult::synthetic(&command, resolved, 0, stdout, String::new())
    }

    async fn resolve_through_shell(&self, target: &str, current: &Path) -> Result<PathBuf, String> {
        let not_found = || format!("cd: {}: No such file or directory\n", target);
        let script = if self.executor.platform().is_windows() {
            format!("cd /d \"{}\" && cd", target)
        } else {
            let quoted = shlex::try_quote(target).map_err(|_| not_found())?;
            format!("cd {} && pwd", quoted)
        };
        let options = ExecOptions::default().cwd(current).skip_approval();
        match self.executor.execute_internal(&script, options).await {
            Ok(result) if result.success => {
                let resolved = result.stdout.trim();
                if resolved.is_empty() {
                    Err(not_found())
                } else {
                    Ok(PathBuf::from(resolved))
                }
            }
            Ok(_) => Err(not_found()),
            Err(e) => {
                log::debug!("Resolving '{}' through the shell failed: {}", target, e);
                Err(format!("cd: {}: {}\n", target, e))
            }
        }
    }

    fn commit_cwd(&self, cwd: PathBuf) {
        self.executor.set_cwd(cwd.clone());
        self.update(|state| {
            let previous = std::mem::replace(&mut state.cwd, cwd);
            state
                .env
                .insert(OLDPWD_VAR.to_string(), previous.display().to_string());
            state
                .env
                .insert(PWD_VAR.to_string(), state.cwd.display().to_string());
            state.previous_dir = Some(previous);
        });
    }

    // --- Serialization ---

    /// The session state together with its history.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            history: self.executor.history(),
        }
    }

    /// Serializes [`snapshot`](Self::snapshot) as pretty JSON.
    pub fn to_json(&self) -> Result<String, ShellError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Restores a session saved by [`to_json`](Self::to_json). `config` supplies everything
    /// that is not persisted (approval policy, timeouts, observers).
    pub fn from_json(json: &str, config: ShellConfig, options: SessionOptions) -> Result<Self, ShellError> {
        let snapshot: SessionSnapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot, config, options))
    }

    /// Rebuilds a session from a snapshot. The idle clock restarts at restore time;
    /// `start_time` keeps its saved value.
    pub fn from_snapshot(snapshot: SessionSnapshot, config: ShellConfig, options: SessionOptions) -> Self {
        let config = config.with_cwd(snapshot.state.cwd.clone());
        let shell = Self::with_options(config, options);
        shell.executor.restore_history(snapshot.history);
        let mut state = snapshot.state;
        state.last_activity = Utc::now();
        *shell.lock_state() = state;
        log::debug!("Session {} restored", shell.id());
        shell
    }
}
