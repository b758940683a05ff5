// src/constants.rs

/// Default wall-clock budget for a single command, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default cap on persisted output, in bytes (1 MiB).
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Default capacity of the command history ring.
pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 1000;

/// Size of the read buffer used when draining a child's stdout/stderr pipes.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long output is still collected after the shell exits while a leftover descendant keeps
/// its pipes open. The process group is killed when it runs out.
pub const PIPE_DRAIN_GRACE_MS: u64 = 100;

/// Marker placed between the preserved head and tail of truncated output.
/// `{omitted}` is replaced with the number of dropped bytes.
pub const TRUNCATION_MARKER: &str = "\n... [output truncated: {omitted} bytes omitted] ...\n";

/// The name of the shellgate directory inside the system config directory.
pub const CONFIG_DIR_NAME: &str = "shellgate";

/// The name of the settings file (inside the shellgate config directory).
pub const SETTINGS_FILENAME: &str = "config.toml";

/// Environment variables the `cd` built-in maintains in the session environment.
pub const PWD_VAR: &str = "PWD";
/// Previous working directory, consulted by `cd -`.
pub const OLDPWD_VAR: &str = "OLDPWD";

/// ANSI sequence emitted by the `clear`/`cls` built-in.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
