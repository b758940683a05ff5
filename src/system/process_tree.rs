// src/system/process_tree.rs

//! Process-tree termination and exit-status decoding.
//!
//! Children are spawned as process-group leaders on Unix, so killing the group reaches
//! every descendant. On Windows `taskkill /T /F` walks the tree.

use std::io;
use std::process::ExitStatus;
use tokio::process::Child;

/// Kills the process tree rooted at `pid` (best-effort; an already-gone tree is not an error).
#[cfg(unix)]
pub fn kill_tree(pid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

/// Kills the process tree rooted at `pid` (best-effort; an already-gone tree is not an error).
#[cfg(windows)]
pub fn kill_tree(pid: u32) -> io::Result<()> {
    use std::process::{Command, Stdio};

    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if !status.success() {
        log::debug!("taskkill for PID {} exited with {:?}", pid, status.code());
    }
    Ok(())
}

/// Kills `child` and all of its descendants, then reaps it.
pub async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        log::debug!("Killing process tree rooted at PID {}", pid);
        if let Err(e) = kill_tree(pid) {
            log::warn!("Failed to kill process tree of PID {}: {}", pid, e);
        }
    }
    if let Err(e) = child.start_kill() {
        log::trace!("start_kill after tree kill: {}", e);
    }
    if let Err(e) = child.wait().await {
        log::warn!("Failed to reap killed child: {}", e);
    }
}

/// Maps an exit status to `(exit_code, signal_name)`.
///
/// A signal-terminated process reports the shell convention `128 + signo`.
pub fn exit_details(status: &ExitStatus) -> (i32, Option<String>) {
    if let Some(code) = status.code() {
        return (code, None);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signo) = status.signal() {
            return (128 + signo, Some(signal_name(signo)));
        }
    }
    (-1, None)
}

#[cfg(unix)]
fn signal_name(signo: i32) -> String {
    nix::sys::signal::Signal::try_from(signo)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("SIG{}", signo))
}
