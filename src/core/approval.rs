// src/core/approval.rs

//! # Approval Policy
//!
//! Two halves: a pattern matcher that flags a command as dangerous, and a policy evaluator
//! that decides, per [`ApprovalMode`], whether a caller-supplied [`ApprovalHandler`] must be
//! consulted before the command may run. Patterns are data: callers may replace the whole set.

use crate::core::errors::{ErrorContext, ShellError};
use crate::models::ApprovalContext;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Policy governing when execution requires explicit authorization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Auto-approve everything.
    Never,
    /// Every command goes through the approval handler.
    Always,
    /// Only commands matching a dangerous pattern go through the handler.
    #[default]
    Dangerous,
    /// The handler owns the decision for every command.
    Custom,
}

impl std::str::FromStr for ApprovalMode {
    type Err = ShellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            "dangerous" | "dangerous-only" => Ok(Self::Dangerous),
            "custom" => Ok(Self::Custom),
            other => Err(ShellError::Config(format!("unknown approval mode '{}'", other))),
        }
    }
}

/// The built-in dangerous-pattern table, grouped by the kind of harm.
pub const DEFAULT_DANGEROUS_PATTERNS: &[&str] = &[
    // Destructive filesystem operations
    r"\brm\s+(-[a-z]*\s+)*-[a-z]*[rf]",
    r"\brm\s+.*(/|~|\*)\s*$",
    r"\brmdir\b",
    r"\bdel\s+/[sfq]",
    r"\brd\s+/s",
    r"\bmkfs(\.\w+)?\b",
    r"\bshred\b",
    r"\btruncate\s+-s\s*0",
    r">\s*/dev/sd[a-z]",
    r"\bfind\b.*\s-delete\b",
    // Privilege escalation
    r"^\s*sudo\b",
    r"[;&|]\s*sudo\b",
    r"\bsu\s+(-|root\b)",
    r"\bdoas\b",
    r"\brunas\b",
    // Permission and ownership changes
    r"\bchmod\s+(-R\s+)?[0-7]*7{2,}",
    r"\bchmod\s+-R\b",
    r"\bchown\b",
    r"\bchgrp\b",
    r"\bicacls\b.*/grant",
    // Disk-level writes
    r"\bdd\s+.*\bof=",
    r"\bfdisk\b",
    r"\bparted\b",
    r"\bformat\s+[a-z]:",
    r"\bdiskpart\b",
    // Mutating network requests and remote code piping
    r"\bcurl\b.*\s-X\s*(POST|PUT|DELETE|PATCH)\b",
    r"\bcurl\b.*\s(-d|--data(-\w+)?)\b",
    r"\bwget\b.*--post",
    r"\b(curl|wget)\b.*\|\s*(ba|z)?sh\b",
    r"\binvoke-webrequest\b.*-method\s+(post|put|delete|patch)",
    // Package managers installing or removing software
    r"\b(apt|apt-get|yum|dnf|pacman|zypper|apk)\s+(install|remove|purge|erase|-S|-R)\b",
    r"\bbrew\s+(install|uninstall|remove)\b",
    r"\b(npm|pnpm|yarn|bun)\s+(install|i|add|remove|uninstall|rm)\s+(-g|--global)\b",
    r"\bpip3?\s+(install|uninstall)\b",
    r"\bcargo\s+(install|uninstall)\b",
    r"\b(choco|winget|scoop)\s+(install|uninstall)\b",
    // Destructive version-control operations
    r"\bgit\s+push\b.*(--force|-f\b)",
    r"\bgit\s+reset\s+--hard\b",
    r"\bgit\s+clean\s+-[a-z]*f",
    r"\bgit\s+branch\s+-D\b",
    r"\bgit\s+checkout\s+--\s+\.",
    // Destructive SQL
    r"\bdrop\s+(table|database|schema)\b",
    r"\btruncate\s+table\b",
    r"\bdelete\s+from\b",
    // Forceful process kills and power state
    r"\bkill\s+-9\b",
    r"\bkill\s+-(KILL|SIGKILL)\b",
    r"\bkillall\b",
    r"\bpkill\b",
    r"\btaskkill\b.*/f",
    r"\b(shutdown|reboot|halt|poweroff)\b",
    // Registry edits
    r"\breg\s+(add|delete)\b",
    r"\bregedit\b",
    r"\b(set|remove)-itemproperty\b",
    // Persistent environment mutation
    r"\bsetx\b",
    r">>?\s*~?/?\S*\.(bashrc|zshrc|profile|bash_profile)\b",
    r"\[environment\]::setenvironmentvariable",
];

lazy_static! {
    static ref DEFAULT_PATTERNS: DangerousPatterns = DangerousPatterns::compile_defaults();
}

/// A compiled, case-insensitive dangerous-pattern set.
#[derive(Clone)]
pub struct DangerousPatterns {
    patterns: Arc<Vec<Regex>>,
}

impl fmt::Debug for DangerousPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DangerousPatterns")
            .field("count", &self.patterns.len())
            .finish()
    }
}

impl Default for DangerousPatterns {
    fn default() -> Self {
        DEFAULT_PATTERNS.clone()
    }
}

/// Outcome of running a command through the pattern set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub is_dangerous: bool,
    /// Sources of every pattern that matched, in table order.
    pub matched_patterns: Vec<String>,
}

impl DangerousPatterns {
    /// Compiles a replacement pattern set. Every source is matched case-insensitively.
    pub fn from_sources<I, S>(sources: I) -> Result<Self, ShellError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = sources
            .into_iter()
            .map(|source| compile(source.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns: Arc::new(patterns),
        })
    }

    /// An empty set: nothing is ever dangerous.
    pub fn empty() -> Self {
        Self {
            patterns: Arc::new(Vec::new()),
        }
    }

    fn compile_defaults() -> Self {
        let patterns = DEFAULT_DANGEROUS_PATTERNS
            .iter()
            .filter_map(|source| match compile(source) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    log::warn!("Skipping built-in dangerous pattern: {}", e);
                    None
                }
            })
            .collect();
        Self {
            patterns: Arc::new(patterns),
        }
    }

    /// Runs every pattern against the raw command text.
    pub fn classify(&self, command: &str) -> Classification {
        let matched_patterns: Vec<String> = self
            .patterns
            .iter()
            .filter(|regex| regex.is_match(command))
            .map(|regex| regex.as_str().to_string())
            .collect();
        Classification {
            is_dangerous: !matched_patterns.is_empty(),
            matched_patterns,
        }
    }

    pub fn sources(&self) -> Vec<String> {
        self.patterns.iter().map(|r| r.as_str().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile(source: &str) -> Result<Regex, ShellError> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .map_err(|e| ShellError::InvalidPattern {
            pattern: source.to_string(),
            source: e,
        })
}

/// A caller-supplied approval function. It may block for as long as a human takes to answer.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Returns `true` to let the command run.
    async fn approve(&self, context: &ApprovalContext) -> bool;
}

/// Adapts an async closure into an [`ApprovalHandler`].
pub struct FnApproval<F> {
    f: F,
}

impl<F> fmt::Debug for FnApproval<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnApproval")
    }
}

#[async_trait]
impl<F, Fut> ApprovalHandler for FnApproval<F>
where
    F: Fn(ApprovalContext) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    async fn approve(&self, context: &ApprovalContext) -> bool {
        (self.f)(context.clone()).await
    }
}

/// Wraps an async closure as a shareable approval handler.
///
/// ```ignore
/// let handler = approval_fn(|ctx| async move { !ctx.is_dangerous });
/// ```
pub fn approval_fn<F, Fut>(f: F) -> Arc<dyn ApprovalHandler>
where
    F: Fn(ApprovalContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(FnApproval { f })
}

/// Decides whether a command may run under `mode`.
///
/// Fails with [`ShellError::Permission`] when the mode needs a handler and none is present.
/// When `approval_timeout` is set and the handler does not answer in time, the command is
/// treated as denied.
pub async fn decide(
    mode: ApprovalMode,
    context: &ApprovalContext,
    handler: Option<&dyn ApprovalHandler>,
    approval_timeout: Option<Duration>,
) -> Result<bool, ShellError> {
    match mode {
        ApprovalMode::Never => return Ok(true),
        ApprovalMode::Dangerous if !context.is_dangerous => return Ok(true),
        ApprovalMode::Always | ApprovalMode::Dangerous | ApprovalMode::Custom => {}
    }

    let Some(handler) = handler else {
        let reason = if context.is_dangerous {
            format!(
                "approval required (matched: {}) but no approval function is configured",
                context.matched_patterns.join(", ")
            )
        } else {
            "approval required but no approval function is configured".to_string()
        };
        return Err(ShellError::permission(error_context(context), reason));
    };

    log::debug!(
        "Requesting approval for '{}' (mode: {:?}, dangerous: {})",
        context.command,
        mode,
        context.is_dangerous
    );

    match approval_timeout {
        Some(limit) => match tokio::time::timeout(limit, handler.approve(context)).await {
            Ok(approved) => Ok(approved),
            Err(_) => {
                log::warn!(
                    "Approval for '{}' did not answer within {}ms; treating as denied.",
                    context.command,
                    limit.as_millis()
                );
                Ok(false)
            }
        },
        None => Ok(handler.approve(context).await),
    }
}

pub(crate) fn error_context(context: &ApprovalContext) -> ErrorContext {
    ErrorContext::new(context.command.clone(), context.cwd.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::platform::PlatformInfo;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context_for(command: &str) -> ApprovalContext {
        let classification = DangerousPatterns::default().classify(command);
        ApprovalContext {
            command: command.to_string(),
            cwd: PathBuf::from("/tmp"),
            env: HashMap::new(),
            is_dangerous: classification.is_dangerous,
            matched_patterns: classification.matched_patterns,
            platform: PlatformInfo::current().clone(),
        }
    }

    #[test]
    fn test_default_patterns_all_compile() {
        assert_eq!(
            DangerousPatterns::default().len(),
            DEFAULT_DANGEROUS_PATTERNS.len()
        );
    }

    #[test]
    fn test_classify_flags_dangerous_commands() {
        let patterns = DangerousPatterns::default();
        for command in [
            "rm -rf /",
            "sudo apt-get install vim",
            "chmod -R 777 /var/www",
            "dd if=/dev/zero of=/dev/sda",
            "curl -X POST https://example.com/api",
            "npm install -g typescript",
            "git push --force origin main",
            "git reset --hard HEAD~3",
            "DROP TABLE users;",
            "kill -9 1234",
            "reg add HKLM\\Software\\Foo",
            "echo 'export X=1' >> ~/.bashrc",
            "SUDO reboot",
        ] {
            let result = patterns.classify(command);
            assert!(result.is_dangerous, "expected '{}' to be dangerous", command);
            assert!(!result.matched_patterns.is_empty());
        }
    }

    #[test]
    fn test_classify_leaves_safe_commands_alone() {
        let patterns = DangerousPatterns::default();
        for command in ["ls -la", "echo hello", "git status", "cat README.md", "pwd"] {
            let result = patterns.classify(command);
            assert!(!result.is_dangerous, "expected '{}' to be safe", command);
            assert!(result.matched_patterns.is_empty());
        }
    }

    #[test]
    fn test_custom_pattern_set_reports_its_sources() {
        let patterns = DangerousPatterns::from_sources([r"\bdeploy\b", r"^make\s+release"]).unwrap();
        let result = patterns.classify("Make release && DEPLOY now");
        assert!(result.is_dangerous);
        assert_eq!(
            result.matched_patterns,
            vec![r"\bdeploy\b".to_string(), r"^make\s+release".to_string()]
        );
        assert!(!patterns.classify("rm -rf /").is_dangerous);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = DangerousPatterns::from_sources(["(unclosed"]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidPattern);
    }

    #[test]
    fn test_approval_mode_parses() {
        assert_eq!("never".parse::<ApprovalMode>().unwrap(), ApprovalMode::Never);
        assert_eq!(
            "dangerous-only".parse::<ApprovalMode>().unwrap(),
            ApprovalMode::Dangerous
        );
        assert!("sometimes".parse::<ApprovalMode>().is_err());
    }

    #[tokio::test]
    async fn test_never_mode_always_approves() {
        let deny = approval_fn(|_| async { false });
        for command in ["rm -rf /", "ls"] {
            let ctx = context_for(command);
            assert!(decide(ApprovalMode::Never, &ctx, None, None).await.unwrap());
            assert!(
                decide(ApprovalMode::Never, &ctx, Some(deny.as_ref()), None)
                    .await
                    .unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_always_and_custom_require_a_handler() {
        let ctx = context_for("ls");
        for mode in [ApprovalMode::Always, ApprovalMode::Custom] {
            let err = decide(mode, &ctx, None, None).await.unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Permission);
        }
        let allow = approval_fn(|_| async { true });
        assert!(
            decide(ApprovalMode::Always, &ctx, Some(allow.as_ref()), None)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_dangerous_mode_only_consults_handler_for_dangerous_commands() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = approval_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { false }
        });

        let safe = context_for("echo hi");
        assert!(
            decide(ApprovalMode::Dangerous, &safe, Some(handler.as_ref()), None)
                .await
                .unwrap()
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let dangerous = context_for("rm -rf /");
        assert!(
            !decide(ApprovalMode::Dangerous, &dangerous, Some(handler.as_ref()), None)
                .await
                .unwrap()
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = decide(ApprovalMode::Dangerous, &dangerous, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Permission);
    }

    #[tokio::test]
    async fn test_approval_timeout_counts_as_denial() {
        let slow = approval_fn(|_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            true
        });
        let ctx = context_for("rm -rf build");
        let approved = decide(
            ApprovalMode::Always,
            &ctx,
            Some(slow.as_ref()),
            Some(Duration::from_millis(20)),
        )
        .await
        .unwrap();
        assert!(!approved);
    }
}
