// src/system/platform.rs

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Operating-system family the engine is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
    /// Any other Unix (BSDs, illumos, ...).
    OtherUnix,
}

/// Static facts about the host that shape how commands are spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub os: String,
    pub family: OsFamily,
    pub arch: String,
    /// Shell used for command indirection (`/bin/sh`, `cmd.exe`).
    pub shell: PathBuf,
    /// Arguments placed between the shell and the command text (`-c`, `/C`).
    pub shell_args: Vec<String>,
    pub home_dir: Option<PathBuf>,
    pub temp_dir: PathBuf,
    pub path_separator: char,
    /// Separator used in `PATH`-like lists.
    pub path_list_separator: char,
}

static CURRENT: OnceLock<PlatformInfo> = OnceLock::new();

impl PlatformInfo {
    /// Detects the platform from compile-time target facts and the process environment.
    pub fn detect() -> Self {
        let family = if cfg!(target_os = "windows") {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::MacOs
        } else if cfg!(target_os = "linux") {
            OsFamily::Linux
        } else {
            OsFamily::OtherUnix
        };

        let (shell, shell_args) = match family {
            OsFamily::Windows => {
                let comspec = env::var_os("ComSpec")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("cmd.exe"));
                (comspec, vec!["/C".to_string()])
            }
            _ => (PathBuf::from("/bin/sh"), vec!["-c".to_string()]),
        };

        let info = Self {
            os: env::consts::OS.to_string(),
            family,
            arch: env::consts::ARCH.to_string(),
            shell,
            shell_args,
            home_dir: dirs::home_dir(),
            temp_dir: env::temp_dir(),
            path_separator: std::path::MAIN_SEPARATOR,
            path_list_separator: if family == OsFamily::Windows { ';' } else { ':' },
        };
        log::debug!("Detected platform: {:?}", info);
        info
    }

    /// Returns the process-wide detection, computed on first use.
    pub fn current() -> &'static Self {
        CURRENT.get_or_init(Self::detect)
    }

    pub fn is_windows(&self) -> bool {
        self.family == OsFamily::Windows
    }

    /// True for every family that spawns through a POSIX `sh`.
    pub fn is_posix(&self) -> bool {
        !self.is_windows()
    }

    /// The home directory, falling back to the temp dir when the user has none.
    pub fn home_or_temp(&self) -> PathBuf {
        self.home_dir
            .clone()
            .unwrap_or_else(|| self.temp_dir.clone())
    }

    /// The program used to probe whether a command exists on `PATH`.
    pub fn which_program(&self) -> &'static str {
        if self.is_windows() { "where" } else { "which" }
    }
}
