// src/core/session_manager.rs

//! Registry of named sessions that share one configuration template.

use crate::models::ShellConfig;
use crate::system::shell::{InteractiveShell, SessionOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// A compact, serializable view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub cwd: PathBuf,
    pub command_count: u64,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug)]
pub struct SessionManager {
    config: ShellConfig,
    options: SessionOptions,
    sessions: Mutex<HashMap<String, Arc<InteractiveShell>>>,
}

impl SessionManager {
    /// New sessions are built from `config` and `options`; `options.session_id` is ignored.
    pub fn new(config: ShellConfig, options: SessionOptions) -> Self {
        Self {
            config,
            options,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<InteractiveShell>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the session named `id`, creating it if needed. A closed session under that
    /// name is replaced by a fresh one.
    pub fn get_or_create(&self, id: Option<&str>) -> Arc<InteractiveShell> {
        let id = id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(&id) {
            if existing.is_active() {
                return Arc::clone(existing);
            }
            log::debug!("Replacing closed session '{}'", id);
        }
        let options = SessionOptions {
            session_id: Some(id.clone()),
            ..self.options.clone()
        };
        let shell = Arc::new(InteractiveShell::with_options(self.config.clone(), options));
        sessions.insert(id, Arc::clone(&shell));
        shell
    }

    pub fn get(&self, id: &str) -> Option<Arc<InteractiveShell>> {
        self.lock().get(id).cloned()
    }

    pub fn info(&self, id: &str) -> Option<SessionSummary> {
        self.get(id).map(|shell| summarize(&shell))
    }

    /// Summaries of every registered session, ordered by start time.
    pub fn list(&self) -> Vec<SessionSummary> {
        let shells: Vec<_> = self.lock().values().cloned().collect();
        let mut summaries: Vec<_> = shells.iter().map(|s| summarize(s)).collect();
        summaries.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Closes and forgets session `id`. Returns `false` if it was not registered.
    pub fn close(&self, id: &str) -> bool {
        let removed = self.lock().remove(id);
        match removed {
            Some(shell) => {
                shell.close();
                true
            }
            None => false,
        }
    }

    /// Drops every session that is closed or has expired. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let shells: Vec<_> = self.lock().values().cloned().collect();
        let dead: Vec<String> = shells
            .iter()
            .filter(|shell| !shell.is_active())
            .map(|shell| shell.id())
            .collect();
        let mut sessions = self.lock();
        for id in &dead {
            sessions.remove(id);
        }
        if !dead.is_empty() {
            log::debug!("Pruned {} inactive session(s)", dead.len());
        }
        dead.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn summarize(shell: &InteractiveShell) -> SessionSummary {
    let state = shell.state();
    SessionSummary {
        id: state.session_id,
        cwd: state.cwd,
        command_count: state.command_count,
        start_time: state.start_time,
        last_activity: state.last_activity,
        active: state.active,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::approval::ApprovalMode;
    use crate::models::ExecOptions;
    use std::time::Duration;

    fn manager(session_timeout: Option<Duration>) -> SessionManager {
        SessionManager::new(
            ShellConfig::default()
                .with_cwd(std::env::temp_dir())
                .with_approval_mode(ApprovalMode::Never),
            SessionOptions {
                session_timeout,
                ..SessionOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_named_sessions() {
        let manager = manager(None);
        let a = manager.get_or_create(Some("build"));
        a.exec("export STAGE=1", ExecOptions::default()).await.unwrap();
        let again = manager.get_or_create(Some("build"));
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(again.env().get("STAGE").map(String::as_str), Some("1"));

        let anonymous = manager.get_or_create(None);
        assert_ne!(anonymous.id(), "build");
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_info_list_and_close() {
        let manager = manager(None);
        let shell = manager.get_or_create(Some("one"));
        shell.exec("echo hi", ExecOptions::default()).await.unwrap();
        manager.get_or_create(Some("two"));

        let info = manager.info("one").unwrap();
        assert_eq!(info.command_count, 1);
        assert!(info.active);
        assert_eq!(manager.list().len(), 2);

        assert!(manager.close("one"));
        assert!(!shell.is_active());
        assert!(!manager.close("one"));
        assert!(manager.info("one").is_none());
    }

    #[tokio::test]
    async fn test_prune_drops_expired_and_closed_sessions() {
        let manager = manager(Some(Duration::from_millis(20)));
        manager.get_or_create(Some("idle"));
        let closed = manager.get_or_create(Some("closed"));
        closed.close();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let fresh = manager.get_or_create(Some("fresh"));

        assert_eq!(manager.prune_expired(), 2);
        assert_eq!(manager.len(), 1);
        assert!(manager.get("fresh").is_some_and(|s| Arc::ptr_eq(&s, &fresh)));
    }

    #[test]
    fn test_closed_session_is_replaced_on_lookup() {
        let manager = manager(None);
        let first = manager.get_or_create(Some("x"));
        first.close();
        let second = manager.get_or_create(Some("x"));
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_active());
    }
}
