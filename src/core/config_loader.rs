//! # Config Loader
//!
//! Loads [`ShellSettings`] from `<config_dir>/shellgate/config.toml` and turns them into a
//! [`ShellConfig`]. A missing file is created with the defaults so users have something to
//! edit.

use crate::constants::{
    CONFIG_DIR_NAME, DEFAULT_MAX_HISTORY_ENTRIES, DEFAULT_MAX_OUTPUT_SIZE, DEFAULT_TIMEOUT_MS,
    SETTINGS_FILENAME,
};
use crate::core::approval::{ApprovalMode, DangerousPatterns};
use crate::core::errors::ShellError;
use crate::models::ShellConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// On-disk settings. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    pub timeout_ms: u64,
    pub max_output_size: usize,
    pub approval_mode: ApprovalMode,
    /// Replaces the built-in dangerous-pattern set when present.
    pub dangerous_patterns: Option<Vec<String>>,
    pub track_history: bool,
    pub max_history_entries: usize,
    pub approval_timeout_ms: Option<u64>,
    pub session_timeout_ms: Option<u64>,
    pub env: BTreeMap<String, String>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
            approval_mode: ApprovalMode::default(),
            dangerous_patterns: None,
            track_history: true,
            max_history_entries: DEFAULT_MAX_HISTORY_ENTRIES,
            approval_timeout_ms: None,
            session_timeout_ms: None,
            env: BTreeMap::new(),
        }
    }
}

impl ShellSettings {
    /// Builds an executor configuration rooted at `cwd`.
    pub fn into_config(self, cwd: impl Into<PathBuf>) -> Result<ShellConfig, ShellError> {
        let patterns = match &self.dangerous_patterns {
            Some(sources) => DangerousPatterns::from_sources(sources)?,
            None => DangerousPatterns::default(),
        };
        let mut config = ShellConfig::default()
            .with_cwd(cwd)
            .with_timeout_ms(self.timeout_ms)
            .with_max_output_size(self.max_output_size)
            .with_approval_mode(self.approval_mode)
            .with_dangerous_patterns(patterns)
            .with_history(self.track_history, self.max_history_entries);
        if let Some(ms) = self.approval_timeout_ms {
            config = config.with_approval_timeout(Duration::from_millis(ms));
        }
        config.env.extend(self.env);
        Ok(config)
    }

    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_ms.map(Duration::from_millis)
    }
}

/// Returns `<config_dir>/shellgate`, creating it if needed.
pub fn config_dir() -> Result<PathBuf, ShellError> {
    let dir = dirs::config_dir()
        .ok_or_else(|| ShellError::Config("could not find the system config directory".to_string()))?
        .join(CONFIG_DIR_NAME);
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| {
            ShellError::Config(format!("could not create '{}': {}", dir.display(), e))
        })?;
    }
    Ok(dir)
}

/// Loads settings from the default location.
pub fn load_settings() -> Result<ShellSettings, ShellError> {
    load_or_create(&config_dir()?.join(SETTINGS_FILENAME))
}

/// Reads `path`, or writes the defaults there if it does not exist.
pub fn load_or_create(path: &Path) -> Result<ShellSettings, ShellError> {
    if !path.exists() {
        let defaults = ShellSettings::default();
        let toml_string = toml::to_string_pretty(&defaults)
            .map_err(|e| ShellError::Config(format!("could not serialize default settings: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ShellError::Config(format!("could not create '{}': {}", parent.display(), e))
            })?;
        }
        fs::write(path, toml_string).map_err(|e| {
            ShellError::Config(format!("could not write '{}': {}", path.display(), e))
        })?;
        log::info!("Wrote default settings to '{}'", path.display());
        return Ok(defaults);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ShellError::Config(format!("could not read '{}': {}", path.display(), e)))?;
    let settings = toml::from_str(&content)
        .map_err(|e| ShellError::Config(format!("invalid settings in '{}': {}", path.display(), e)))?;
    log::debug!("Loaded settings from '{}'", path.display());
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);

        let settings = load_or_create(&path).unwrap();
        assert_eq!(settings, ShellSettings::default());
        assert!(path.exists());

        let reloaded = load_or_create(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(
            &path,
            r#"
timeout_ms = 500
approval_mode = "always"
session_timeout_ms = 60000

[env]
CI = "1"
"#,
        )
        .unwrap();

        let settings = load_or_create(&path).unwrap();
        assert_eq!(settings.timeout_ms, 500);
        assert_eq!(settings.approval_mode, ApprovalMode::Always);
        assert_eq!(settings.max_output_size, DEFAULT_MAX_OUTPUT_SIZE);
        assert_eq!(settings.session_timeout(), Some(Duration::from_secs(60)));

        let config = settings.into_config("/srv").unwrap();
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.cwd, PathBuf::from("/srv"));
        assert_eq!(config.env.get("CI").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_replacement_patterns_are_compiled() {
        let settings = ShellSettings {
            dangerous_patterns: Some(vec![r"\bdeploy\b".to_string()]),
            approval_timeout_ms: Some(250),
            ..ShellSettings::default()
        };
        let config = settings.into_config("/").unwrap();
        assert_eq!(config.dangerous_patterns.len(), 1);
        assert!(config.dangerous_patterns.classify("make deploy").is_dangerous);
        assert!(!config.dangerous_patterns.classify("rm -rf /").is_dangerous);
        assert_eq!(config.approval_timeout, Some(Duration::from_millis(250)));

        let broken = ShellSettings {
            dangerous_patterns: Some(vec!["(unclosed".to_string()]),
            ..ShellSettings::default()
        };
        assert_eq!(broken.into_config("/").unwrap_err().kind(), ErrorKind::InvalidPattern);
    }

    #[test]
    fn test_malformed_file_is_a_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "timeout_ms = \"soon\"").unwrap();
        assert_eq!(load_or_create(&path).unwrap_err().kind(), ErrorKind::Config);
    }
}
