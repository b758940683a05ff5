// src/system/spawner.rs

//! Shell indirection for spawning commands.
//!
//! One [`ProcessSpawner`] is chosen per executor at construction time: `sh -c` on POSIX
//! hosts, `cmd /C` on Windows. Every spawned child gets piped stdout/stderr, a null stdin,
//! and (on Unix) its own process group so the whole tree can be killed on timeout.

use crate::system::platform::PlatformInfo;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};

/// What to spawn and where.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    pub command: &'a str,
    pub cwd: &'a Path,
    /// Overlay applied on top of the inherited environment.
    pub env: &'a HashMap<String, String>,
}

/// Starts a command through some shell. Implementations must pipe stdout and stderr.
pub trait ProcessSpawner: Send + Sync + fmt::Debug {
    fn spawn(&self, request: &SpawnRequest<'_>) -> io::Result<Child>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// `sh -c <command>`
#[derive(Debug, Clone)]
pub struct PosixShellSpawner {
    shell: PathBuf,
    shell_args: Vec<String>,
}

impl PosixShellSpawner {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            shell_args: vec!["-c".to_string()],
        }
    }
}

impl ProcessSpawner for PosixShellSpawner {
    fn spawn(&self, request: &SpawnRequest<'_>) -> io::Result<Child> {
        let mut command = base_command(&self.shell, &self.shell_args, request);
        #[cfg(unix)]
        command.process_group(0);
        command.spawn()
    }

    fn name(&self) -> &'static str {
        "posix-sh"
    }
}

/// `cmd.exe /C <command>`
#[derive(Debug, Clone)]
pub struct WindowsShellSpawner {
    shell: PathBuf,
    shell_args: Vec<String>,
}

impl WindowsShellSpawner {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            shell_args: vec!["/C".to_string()],
        }
    }
}

impl ProcessSpawner for WindowsShellSpawner {
    fn spawn(&self, request: &SpawnRequest<'_>) -> io::Result<Child> {
        base_command(&self.shell, &self.shell_args, request).spawn()
    }

    fn name(&self) -> &'static str {
        "windows-cmd"
    }
}

fn base_command(shell: &Path, shell_args: &[String], request: &SpawnRequest<'_>) -> Command {
    let mut command = Command::new(shell);
    command
        .args(shell_args)
        .arg(request.command)
        .current_dir(dunce::simplified(request.cwd))
        .envs(request.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command
}

/// Picks the spawner for `platform`.
pub fn default_spawner(platform: &PlatformInfo) -> Arc<dyn ProcessSpawner> {
    if platform.is_windows() {
        Arc::new(WindowsShellSpawner::new(platform.shell.clone()))
    } else {
        Arc::new(PosixShellSpawner::new(platform.shell.clone()))
    }
}
