// src/system/executor.rs

//! # Shell Executor
//!
//! Runs one command end-to-end: approval, spawn through the platform shell, a race against
//! the wall-clock budget, output capture with head/tail truncation, and a history record.
//!
//! A non-zero exit is *not* an error here; it comes back as an [`ExecutionResult`] with
//! `success == false`. Only approval denial, timeouts, cancellation and spawn-level faults
//! produce a [`ShellError`].

use crate::constants::{PIPE_DRAIN_GRACE_MS, READ_CHUNK_SIZE};
use crate::core::approval;
use crate::core::errors::{ErrorContext, ShellError};
use crate::core::history::{CommandHistory, CompletionRecord, HistorySnapshot};
use crate::core::output::{OutputCapture, OutputChunk};
use crate::models::{
    ApprovalContext, ConfigOverrides, ExecOptions, ExecutionObserver, ExecutionResult, ExecutionStart,
    HistoryEntry, SequenceOptions, ShellConfig,
};
use crate::system::platform::PlatformInfo;
use crate::system::process_tree;
use crate::system::spawner::{ProcessSpawner, SpawnRequest, default_spawner};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time;
use uuid::Uuid;

/// Why driving a child stopped before it exited on its own.
enum DriveError {
    Io(io::Error),
    Cancelled,
}

enum PipeEvent {
    Chunk(OutputChunk),
    StdoutClosed,
    StderrClosed,
    Exited(ExitStatus),
    DrainElapsed,
}

/// Whether a call is visible to history and observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracking {
    Recorded,
    Internal,
}

/// Where output chunks go besides the capture buffer.
struct Listeners<'a> {
    sink: Option<&'a UnboundedSender<OutputChunk>>,
    observer: Option<&'a dyn ExecutionObserver>,
}

struct ProcessOutcome {
    status: ExitStatus,
    capture: OutputCapture,
}

/// Executes commands under one immutable configuration (apart from the default `cwd`).
pub struct ShellExecutor {
    config: ShellConfig,
    cwd: RwLock<PathBuf>,
    history: Arc<Mutex<CommandHistory>>,
    spawner: Arc<dyn ProcessSpawner>,
    platform: PlatformInfo,
}

impl fmt::Debug for ShellExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellExecutor")
            .field("config", &self.config)
            .field("cwd", &self.cwd())
            .field("spawner", &self.spawner.name())
            .finish_non_exhaustive()
    }
}

impl ShellExecutor {
    /// Creates an executor that spawns through the current platform's shell.
    pub fn new(config: ShellConfig) -> Self {
        let platform = PlatformInfo::current().clone();
        let spawner = default_spawner(&platform);
        Self::with_spawner(config, spawner)
    }

    /// Creates an executor with an explicit spawn strategy.
    pub fn with_spawner(config: ShellConfig, spawner: Arc<dyn ProcessSpawner>) -> Self {
        let history = CommandHistory::new(config.max_history_entries, config.max_output_size);
        log::debug!(
            "ShellExecutor created (spawner: {}, cwd: {}, mode: {:?})",
            spawner.name(),
            config.cwd.display(),
            config.approval_mode
        );
        Self {
            cwd: RwLock::new(config.cwd.clone()),
            config,
            history: Arc::new(Mutex::new(history)),
            spawner,
            platform: PlatformInfo::current().clone(),
        }
    }

    /// Returns a new executor with `overrides` applied on top of this one's configuration.
    ///
    /// The new executor shares this executor's spawner and history log; nothing else is shared.
    pub fn with_overrides(&self, overrides: ConfigOverrides) -> Self {
        let cwd = overrides.cwd.clone().unwrap_or_else(|| self.cwd());
        let mut config = self.config.merged(overrides);
        config.cwd = cwd.clone();
        Self {
            cwd: RwLock::new(cwd),
            config,
            history: Arc::clone(&self.history),
            spawner: Arc::clone(&self.spawner),
            platform: self.platform.clone(),
        }
    }

    /// The configuration this executor was built with.
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// The platform commands are spawned on.
    pub fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    /// The default working directory for calls that do not pass one.
    pub fn cwd(&self) -> PathBuf {
        self.cwd.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the default working directory for later calls.
    pub fn set_cwd(&self, cwd: impl Into<PathBuf>) {
        let cwd = cwd.into();
        log::debug!("Executor cwd set to '{}'", cwd.display());
        *self.cwd.write().unwrap_or_else(PoisonError::into_inner) = cwd;
    }

    // --- Single command ---

    /// Runs one command to completion.
    pub async fn execute(&self, command: &str, options: ExecOptions) -> Result<ExecutionResult, ShellError> {
        self.execute_tracked(command, options, Tracking::Recorded).await
    }

    /// Runs a helper command the user never typed. It leaves no history entry and is not
    /// reported to the observer.
    pub(crate) async fn execute_internal(
        &self,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecutionResult, ShellError> {
        self.execute_tracked(command, options, Tracking::Internal).await
    }

    async fn execute_tracked(
        &self,
        command: &str,
        options: ExecOptions,
        tracking: Tracking,
    ) -> Result<ExecutionResult, ShellError> {
        let recorded = tracking == Tracking::Recorded;
        let observer = if recorded { self.config.observer.as_deref() } else { None };
        let track_history = recorded && self.config.track_history;
        let started = Instant::now();
        let cwd = options.cwd.clone().unwrap_or_else(|| self.cwd());
        let mut env = self.config.env.clone();
        if let Some(extra) = &options.env {
            env.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.timeout_ms);

        // 1. Approval. A denied command never reaches the spawner.
        let approved = if options.skip_approval {
            false
        } else {
            self.ensure_approved(command, &cwd, &env).await?;
            true
        };

        // 2. History + start notification.
        let id = Uuid::new_v4().to_string();
        if track_history {
            self.lock_history().start(id.clone(), command, cwd.clone());
        }
        if let Some(observer) = observer {
            observer.on_start(&ExecutionStart {
                id: id.clone(),
                command: command.to_string(),
                cwd: cwd.clone(),
            });
        }
        log::debug!("[{}] Executing '{}' in '{}'", id, command, cwd.display());

        // 3. Spawn and race against the timer.
        let listeners = Listeners {
            sink: options.output.as_ref(),
            observer,
        };
        let outcome = self
            .run_process(&id, command, &cwd, &env, timeout_ms, &listeners)
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                log::debug!("[{}] Execution failed: {}", id, err);
                self.complete_history(
                    track_history,
                    &id,
                    CompletionRecord {
                        exit_code: -1,
                        stdout: String::new(),
                        stderr: err.to_string(),
                        truncated: false,
                    },
                );
                return Err(err);
            }
        };

        // 4. Decode, bound and record.
        let (exit_code, signal) = process_tree::exit_details(&outcome.status);
        let output = outcome.capture.finish(self.config.max_output_size);
        let result = ExecutionResult {
            id: id.clone(),
            command: command.to_string(),
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            combined: output.combined,
            success: exit_code == 0 && signal.is_none(),
            duration_ms: elapsed_ms(started),
            cwd,
            truncated: output.truncated,
            signal,
            approved,
        };

        self.complete_history(
            track_history,
            &id,
            CompletionRecord {
                exit_code: result.exit_code,
                stdout: result.stdout.clone(),
                stderr: result.stderr.clone(),
                truncated: result.truncated,
            },
        );
        if let Some(observer) = observer {
            observer.on_complete(&result);
        }
        log::debug!(
            "[{}] Finished with code {} in {}ms{}",
            id,
            result.exit_code,
            result.duration_ms,
            if result.truncated { " (output truncated)" } else { "" }
        );
        Ok(result)
    }

    async fn ensure_approved(
        &self,
        command: &str,
        cwd: &Path,
        env: &HashMap<String, String>,
    ) -> Result<(), ShellError> {
        let classification = self.config.dangerous_patterns.classify(command);
        if classification.is_dangerous {
            log::debug!(
                "'{}' matched dangerous patterns: {:?}",
                command,
                classification.matched_patterns
            );
        }
        let context = ApprovalContext {
            command: command.to_string(),
            cwd: cwd.to_path_buf(),
            env: env.clone(),
            is_dangerous: classification.is_dangerous,
            matched_patterns: classification.matched_patterns,
            platform: self.platform.clone(),
        };
        let approved = approval::decide(
            self.config.approval_mode,
            &context,
            self.config.approval_handler.as_deref(),
            self.config.approval_timeout,
        )
        .await?;

        if approved {
            Ok(())
        } else {
            log::info!("Command '{}' was denied by the approval function", command);
            Err(ShellError::permission(
                approval::error_context(&context),
                "denied by the approval function",
            ))
        }
    }

    async fn run_process(
        &self,
        id: &str,
        command: &str,
        cwd: &Path,
        env: &HashMap<String, String>,
        timeout_ms: u64,
        listeners: &Listeners<'_>,
    ) -> Result<ProcessOutcome, ShellError> {
        let started = Instant::now();
        let request = SpawnRequest { command, cwd, env };
        let mut child = self.spawner.spawn(&request).map_err(|source| ShellError::Spawn {
            context: ErrorContext::new(command, cwd).with_env(env.clone()),
            source,
        })?;

        let mut capture = OutputCapture::default();
        let driven = if timeout_ms > 0 {
            let limit = Duration::from_millis(timeout_ms);
            // The timer lives inside this future and is dropped with it on either branch.
            let raced = tokio::time::timeout(limit, self.drive(id, &mut child, &mut capture, listeners)).await;
            match raced {
                Ok(driven) => driven,
                Err(_) => {
                    log::warn!("[{}] '{}' exceeded {}ms; killing process tree", id, command, timeout_ms);
                    process_tree::terminate(&mut child).await;
                    return Err(ShellError::Timeout {
                        context: ErrorContext::new(command, cwd).with_duration(elapsed_ms(started)),
                        timeout_ms,
                    });
                }
            }
        } else {
            self.drive(id, &mut child, &mut capture, listeners).await
        };

        match driven {
            Ok(status) => Ok(ProcessOutcome { status, capture }),
            Err(DriveError::Cancelled) => {
                log::debug!("[{}] Output receiver dropped; killing process tree", id);
                process_tree::terminate(&mut child).await;
                Err(ShellError::Cancelled {
                    context: ErrorContext::new(command, cwd).with_duration(elapsed_ms(started)),
                })
            }
            Err(DriveError::Io(source)) => {
                process_tree::terminate(&mut child).await;
                Err(ShellError::Spawn {
                    context: ErrorContext::new(command, cwd).with_duration(elapsed_ms(started)),
                    source,
                })
            }
        }
    }

    /// Pumps both pipes in receipt order until the shell exits and its pipes close.
    ///
    /// Descendants that outlive the shell and keep the pipes open get a short drain window;
    /// after that the process group is killed and the shell's own status is returned.
    async fn drive(
        &self,
        id: &str,
        child: &mut Child,
        capture: &mut OutputCapture,
        listeners: &Listeners<'_>,
    ) -> Result<ExitStatus, DriveError> {
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out_buf = vec![0u8; READ_CHUNK_SIZE];
        let mut err_buf = vec![0u8; READ_CHUNK_SIZE];
        let pid = child.id();
        let mut status: Option<ExitStatus> = None;
        let mut drain_deadline: Option<time::Instant> = None;

        while stdout.is_some() || stderr.is_some() {
            let event = tokio::select! {
                read = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => {
                    match read.map_err(DriveError::Io)? {
                        Some(bytes) => PipeEvent::Chunk(OutputChunk::Stdout(bytes)),
                        None => PipeEvent::StdoutClosed,
                    }
                }
                read = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => {
                    match read.map_err(DriveError::Io)? {
                        Some(bytes) => PipeEvent::Chunk(OutputChunk::Stderr(bytes)),
                        None => PipeEvent::StderrClosed,
                    }
                }
                waited = child.wait(), if status.is_none() => {
                    PipeEvent::Exited(waited.map_err(DriveError::Io)?)
                }
                _ = time::sleep_until(drain_deadline.unwrap_or_else(time::Instant::now)), if drain_deadline.is_some() => {
                    PipeEvent::DrainElapsed
                }
            };

            match event {
                PipeEvent::Chunk(chunk) => {
                    self.dispatch(id, &chunk, listeners)?;
                    capture.push(&chunk);
                }
                PipeEvent::StdoutClosed => stdout = None,
                PipeEvent::StderrClosed => stderr = None,
                PipeEvent::Exited(exit) => {
                    status = Some(exit);
                    drain_deadline = Some(time::Instant::now() + Duration::from_millis(PIPE_DRAIN_GRACE_MS));
                }
                PipeEvent::DrainElapsed => {
                    log::debug!("[{}] Shell exited but its pipes stayed open; killing leftover descendants", id);
                    if let Some(pid) = pid {
                        if let Err(e) = process_tree::kill_tree(pid) {
                            log::warn!("[{}] Failed to kill leftover descendants: {}", id, e);
                        }
                    }
                    break;
                }
            }
        }

        match status {
            Some(status) => Ok(status),
            None => child.wait().await.map_err(DriveError::Io),
        }
    }

    fn dispatch(&self, id: &str, chunk: &OutputChunk, listeners: &Listeners<'_>) -> Result<(), DriveError> {
        if let Some(observer) = listeners.observer {
            match chunk {
                OutputChunk::Stdout(bytes) => observer.on_stdout(id, bytes),
                OutputChunk::Stderr(bytes) => observer.on_stderr(id, bytes),
            }
        }
        if let Some(sink) = listeners.sink {
            sink.send(chunk.clone()).map_err(|_| DriveError::Cancelled)?;
        }
        Ok(())
    }

    // --- Compositions ---

    /// Runs `commands` one at a time.
    ///
    /// With `stop_on_error`, the sequence halts after the first failed result and thrown errors
    /// propagate. Without it, every command runs and thrown errors become failed results.
    pub async fn execute_sequence<S: AsRef<str>>(
        &self,
        commands: &[S],
        options: SequenceOptions,
    ) -> Result<Vec<ExecutionResult>, ShellError> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let command = command.as_ref();
            match self.execute(command, options.exec.clone()).await {
                Ok(result) => {
                    let failed = !result.success;
                    results.push(result);
                    if failed && options.stop_on_error {
                        log::debug!("Sequence stopped at failing step '{}'", command);
                        break;
                    }
                }
                Err(err) if options.stop_on_error => return Err(err),
                Err(err) => {
                    log::warn!("Sequence step '{}' failed: {}", command, err);
                    let cwd = options.exec.cwd.clone().unwrap_or_else(|| self.cwd());
                    results.push(failed_result(command, cwd, &err));
                }
            }
        }
        Ok(results)
    }

    /// Runs `command` and returns its trimmed stdout; a failed exit becomes an error.
    pub async fn run(&self, command: &str) -> Result<String, ShellError> {
        let result = self.execute(command, ExecOptions::default()).await?.into_checked()?;
        Ok(result.stdout.trim().to_string())
    }

    /// Looks `name` up on `PATH` with `which`/`where`. Approval is skipped for the lookup.
    pub async fn command_exists(&self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return false;
        }
        let lookup = if self.platform.is_windows() {
            format!("{} {}", self.platform.which_program(), name)
        } else {
            match shlex::try_quote(name) {
                Ok(quoted) => format!("{} {}", self.platform.which_program(), quoted),
                Err(_) => return false,
            }
        };
        match self.execute_internal(&lookup, ExecOptions::default().skip_approval()).await {
            Ok(result) => result.success,
            Err(e) => {
                log::debug!("Lookup of '{}' failed: {}", name, e);
                false
            }
        }
    }

    // --- History ---

    fn lock_history(&self) -> MutexGuard<'_, CommandHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete_history(&self, track_history: bool, id: &str, record: CompletionRecord) {
        if track_history {
            self.lock_history().complete(id, record);
        }
    }

    /// The history entry recorded for the call with result id `id`.
    pub fn history_entry(&self, id: &str) -> Option<HistoryEntry> {
        self.lock_history().get(id).cloned()
    }

    /// The `n` most recent history entries, oldest first.
    pub fn history_last(&self, n: usize) -> Vec<HistoryEntry> {
        self.lock_history().last(n)
    }

    /// History entries whose command contains `query`, ignoring case.
    pub fn history_search(&self, query: &str) -> Vec<HistoryEntry> {
        self.lock_history().search(query)
    }

    /// Number of entries currently held in history.
    pub fn history_len(&self) -> usize {
        self.lock_history().len()
    }

    /// A serializable copy of the whole history log.
    pub fn history(&self) -> HistorySnapshot {
        self.lock_history().snapshot()
    }

    /// Replaces the history log with a restored one.
    pub fn restore_history(&self, snapshot: HistorySnapshot) {
        *self.lock_history() = CommandHistory::from_snapshot(snapshot);
    }

    /// Drops every history entry.
    pub fn clear_history(&self) {
        self.lock_history().clear();
    }
}

async fn read_some<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> io::Result<Option<Vec<u8>>> {
    let Some(reader) = reader.as_mut() else {
        return Ok(None);
    };
    let n = reader.read(buf).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(buf.get(..n).map(<[u8]>::to_vec))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// A failed result standing in for a step that errored instead of exiting.
fn failed_result(command: &str, cwd: PathBuf, err: &ShellError) -> ExecutionResult {
    let exit_code = err.context().and_then(|c| c.exit_code).unwrap_or(-1);
    let mut result = ExecutionResult::synthetic(command, cwd, exit_code, String::new(), err.to_string());
    result.success = false;
    result.approved = err.kind() != crate::core::errors::ErrorKind::Permission;
    result.duration_ms = err.context().and_then(|c| c.duration_ms).unwrap_or(0);
    result
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::core::approval::{ApprovalMode, approval_fn};
    use crate::models::ExecutionObserver;
    use crate::system::spawner::PosixShellSpawner;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::process::Child;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    struct SpySpawner {
        calls: AtomicUsize,
        inner: PosixShellSpawner,
    }

    impl SpySpawner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                inner: PosixShellSpawner::new("/bin/sh"),
            })
        }
    }

    impl ProcessSpawner for SpySpawner {
        fn spawn(&self, request: &SpawnRequest<'_>) -> io::Result<Child> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.spawn(request)
        }

        fn name(&self) -> &'static str {
            "spy"
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        starts: AtomicUsize,
        stdout_chunks: AtomicUsize,
        completes: AtomicUsize,
    }

    impl ExecutionObserver for CountingObserver {
        fn on_start(&self, _start: &ExecutionStart) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_stdout(&self, _id: &str, _chunk: &[u8]) {
            self.stdout_chunks.fetch_add(1, Ordering::SeqCst);
        }
        fn on_complete(&self, _result: &ExecutionResult) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn executor() -> ShellExecutor {
        ShellExecutor::new(
            ShellConfig::default()
                .with_cwd(std::env::temp_dir())
                .with_approval_mode(ApprovalMode::Never),
        )
    }

    #[tokio::test]
    async fn test_execute_captures_stdout_and_exit_code() {
        let result = executor().execute("echo hello", ExecOptions::default()).await.unwrap();
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.exit_code, 0);
        assert!(result.success);
        assert!(!result.truncated);
        assert!(result.approved);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_result_not_an_error() {
        let result = executor()
            .execute("echo oops >&2; exit 3", ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(!result.success);
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(result.combined, "oops\n");
    }

    #[tokio::test]
    async fn test_combined_output_follows_receipt_order() {
        let result = executor()
            .execute("echo one; sleep 0.05; echo two >&2; sleep 0.05; echo three", ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(result.combined, "one\ntwo\nthree\n");
        assert_eq!(result.stdout, "one\nthree\n");
    }

    #[tokio::test]
    async fn test_env_overlay_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ShellExecutor::new(
            ShellConfig::default()
                .with_cwd(dir.path())
                .with_env("BASE_VAR", "base")
                .with_approval_mode(ApprovalMode::Never),
        );
        let result = exec
            .execute("echo $BASE_VAR-$CALL_VAR; pwd", ExecOptions::default().env("CALL_VAR", "call"))
            .await
            .unwrap();
        let mut lines = result.stdout.lines();
        assert_eq!(lines.next(), Some("base-call"));
        let reported = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_dangerous_command_without_handler_never_spawns() {
        let spy = SpySpawner::new();
        let exec = ShellExecutor::with_spawner(
            ShellConfig::default().with_approval_mode(ApprovalMode::Dangerous),
            spy.clone(),
        );
        let err = exec.execute("rm -rf /", ExecOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(err.context().map(|c| c.command.as_str()), Some("rm -rf /"));
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
        assert_eq!(exec.history_len(), 0);

        exec.execute("echo safe", ExecOptions::default()).await.unwrap();
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denying_handler_blocks_and_approving_handler_allows() {
        let spy = SpySpawner::new();
        let deny = ShellExecutor::with_spawner(
            ShellConfig::default()
                .with_approval_mode(ApprovalMode::Always)
                .with_approval_handler(approval_fn(|_| async { false })),
            spy.clone(),
        );
        let err = deny.execute("echo hi", ExecOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);

        let allow = deny.with_overrides(ConfigOverrides {
            approval_handler: Some(approval_fn(|ctx| async move { ctx.command == "echo hi" })),
            ..ConfigOverrides::default()
        });
        let result = allow.execute("echo hi", ExecOptions::default()).await.unwrap();
        assert!(result.approved);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_approval_bypasses_policy() {
        let exec = ShellExecutor::new(ShellConfig::default().with_approval_mode(ApprovalMode::Always));
        let result = exec
            .execute("echo bypass", ExecOptions::default().skip_approval())
            .await
            .unwrap();
        assert!(result.success);
        assert!(!result.approved);
    }

    #[tokio::test]
    async fn test_timeout_rejects_promptly_and_records_failure() {
        let exec = executor();
        let started = Instant::now();
        let err = exec
            .execute("sleep 5", ExecOptions::default().timeout_ms(50))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(matches!(err, ShellError::Timeout { timeout_ms: 50, .. }));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(250), "took {:?}", elapsed);

        let entry = exec.history_last(1).pop().unwrap();
        assert_eq!(entry.command, "sleep 5");
        assert_eq!(entry.exit_code, Some(-1));
        assert!(!entry.success);
    }

    #[tokio::test]
    async fn test_zero_timeout_is_unbounded() {
        let exec = ShellExecutor::new(
            ShellConfig::default()
                .with_timeout_ms(0)
                .with_approval_mode(ApprovalMode::Never),
        );
        let result = exec.execute("sleep 0.1; echo done", ExecOptions::default()).await.unwrap();
        assert_eq!(result.stdout, "done\n");
    }

    #[tokio::test]
    async fn test_output_boundary_truncation() {
        let exec = ShellExecutor::new(
            ShellConfig::default()
                .with_max_output_size(100)
                .with_approval_mode(ApprovalMode::Never),
        );
        let exact = exec.execute("printf '%0100d' 0", ExecOptions::default()).await.unwrap();
        assert_eq!(exact.combined.len(), 100);
        assert!(!exact.truncated);

        let over = exec.execute("printf '%0101d' 0", ExecOptions::default()).await.unwrap();
        assert!(over.truncated);
        assert!(over.combined.len() <= 100);
        assert!(over.stdout.len() <= 100);
        let entry = exec.history_entry(&over.id).unwrap();
        assert!(entry.truncated);
        assert!(entry.stdout.len() <= 100);
    }

    #[tokio::test]
    async fn test_result_id_matches_history_entry() {
        let exec = executor();
        let result = exec.execute("echo tracked", ExecOptions::default()).await.unwrap();
        let entry = exec.history_entry(&result.id).unwrap();
        assert_eq!(entry.command, "echo tracked");
        assert_eq!(entry.exit_code, Some(0));
        assert_eq!(entry.stdout, "tracked\n");
        assert!(entry.is_complete());
    }

    #[tokio::test]
    async fn test_history_can_be_disabled() {
        let exec = ShellExecutor::new(
            ShellConfig::default()
                .with_history(false, 10)
                .with_approval_mode(ApprovalMode::Never),
        );
        exec.execute("true", ExecOptions::default()).await.unwrap();
        assert_eq!(exec.history_len(), 0);
    }

    #[tokio::test]
    async fn test_observer_sees_lifecycle() {
        let observer = Arc::new(CountingObserver::default());
        let exec = ShellExecutor::new(
            ShellConfig::default()
                .with_approval_mode(ApprovalMode::Never)
                .with_observer(observer.clone()),
        );
        exec.execute("echo observed", ExecOptions::default()).await.unwrap();
        assert_eq!(observer.starts.load(Ordering::SeqCst), 1);
        assert!(observer.stdout_chunks.load(Ordering::SeqCst) >= 1);
        assert_eq!(observer.completes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_streaming_channel_receives_tagged_chunks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = executor()
            .execute("echo out; echo err >&2", ExecOptions::default().stream_to(tx))
            .await
            .unwrap();
        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Ok(chunk) = rx.try_recv() {
            match &chunk {
                OutputChunk::Stdout(_) => stdout.push_str(&chunk.text()),
                OutputChunk::Stderr(_) => stderr.push_str(&chunk.text()),
            }
        }
        assert_eq!(stdout, result.stdout);
        assert_eq!(stderr, result.stderr);
    }

    #[tokio::test]
    async fn test_dropping_the_receiver_cancels_the_command() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let started = Instant::now();
        let err = executor()
            .execute("echo first; sleep 5", ExecOptions::default().stream_to(tx))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_sequence_stops_on_first_failure() {
        let results = executor()
            .execute_sequence(&["echo a", "false", "echo c"], SequenceOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
    }

    #[tokio::test]
    async fn test_sequence_without_stop_runs_everything_and_absorbs_errors() {
        let options = SequenceOptions {
            stop_on_error: false,
            exec: ExecOptions::default().timeout_ms(50),
        };
        let results = executor()
            .execute_sequence(&["false", "sleep 5", "echo c"], options)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(!results[0].success);
        assert!(!results[1].success);
        assert!(results[1].stderr.contains("timed out"));
        assert_eq!(results[2].stdout, "c\n");
    }

    #[tokio::test]
    async fn test_sequence_with_stop_propagates_thrown_errors() {
        let options = SequenceOptions {
            stop_on_error: true,
            exec: ExecOptions::default().timeout_ms(50),
        };
        let err = executor()
            .execute_sequence(&["sleep 5", "echo never"], options)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_run_returns_trimmed_stdout_or_exit_error() {
        let exec = executor();
        assert_eq!(exec.run("echo '  padded  '").await.unwrap(), "padded");
        let err = exec.run("exit 7").await.unwrap_err();
        assert!(matches!(err, ShellError::Exit { code: 7, .. }));
    }

    #[tokio::test]
    async fn test_command_exists() {
        let exec = ShellExecutor::new(ShellConfig::default().with_approval_mode(ApprovalMode::Always));
        assert!(exec.command_exists("sh").await);
        assert!(!exec.command_exists("definitely-not-a-real-binary-xyz").await);
        assert!(!exec.command_exists("sh; rm -rf /").await);
    }

    #[tokio::test]
    async fn test_command_exists_leaves_no_history() {
        let observer = Arc::new(CountingObserver::default());
        let exec = ShellExecutor::new(
            ShellConfig::default()
                .with_approval_mode(ApprovalMode::Never)
                .with_observer(observer.clone()),
        );
        assert!(exec.command_exists("sh").await);
        assert_eq!(exec.history_len(), 0);
        assert_eq!(observer.starts.load(Ordering::SeqCst), 0);
        assert_eq!(observer.completes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backgrounded_child_does_not_hold_the_command_open() {
        let exec = executor();
        for timeout_ms in [1000, 0] {
            let started = Instant::now();
            let result = exec
                .execute("sleep 5 & echo started", ExecOptions::default().timeout_ms(timeout_ms))
                .await
                .unwrap();
            assert!(result.success);
            assert_eq!(result.stdout, "started\n");
            assert!(started.elapsed() < Duration::from_millis(900), "took {:?}", started.elapsed());
        }
    }

    #[tokio::test]
    async fn test_output_written_just_before_exit_is_kept() {
        let result = executor()
            .execute("printf '%05000d' 0; printf tail >&2", ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(result.stdout.len(), 5000);
        assert_eq!(result.stderr, "tail");
    }

    #[tokio::test]
    async fn test_signal_termination_is_reported() {
        let result = executor().execute("kill -KILL $$", ExecOptions::default()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.signal.as_deref(), Some("SIGKILL"));
        assert_eq!(result.exit_code, 137);
        assert!(matches!(result.into_checked(), Err(ShellError::Signal { .. })));
    }

    #[tokio::test]
    async fn test_set_cwd_and_overrides_do_not_leak() {
        let exec = executor();
        let dir = tempfile::tempdir().unwrap();
        let derived = exec.with_overrides(ConfigOverrides {
            cwd: Some(dir.path().to_path_buf()),
            timeout_ms: Some(5),
            ..ConfigOverrides::default()
        });
        assert_eq!(derived.cwd(), dir.path());
        assert_eq!(derived.config().timeout_ms, 5);
        assert_eq!(exec.cwd(), std::env::temp_dir());
        exec.set_cwd(dir.path());
        assert_eq!(exec.cwd(), dir.path());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let exec = ShellExecutor::with_spawner(
            ShellConfig::default().with_approval_mode(ApprovalMode::Never),
            Arc::new(PosixShellSpawner::new("/nonexistent/shell")),
        );
        let err = exec.execute("echo hi", ExecOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Spawn);
    }
}
