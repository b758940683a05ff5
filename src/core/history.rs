// src/core/history.rs

//! Bounded, append-only command log.
//!
//! Entries live in a ring sized to `max_entries`: appending to a full ring evicts the oldest
//! entry in O(1) and insertion order is preserved. An entry is created by [`CommandHistory::start`]
//! and its end-of-life fields are filled exactly once by [`CommandHistory::complete`].

use crate::core::output::truncate_middle;
use crate::models::HistoryEntry;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

/// End-of-life data for a history entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionRecord {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Set when the output was already cut upstream.
    pub truncated: bool,
}

/// Wire form of a history: `{maxEntries, maxOutputSize, entries}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub max_entries: usize,
    pub max_output_size: usize,
    pub entries: Vec<HistoryEntry>,
}

/// Fixed-capacity log of command lifecycles.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
    max_output_size: usize,
}

impl CommandHistory {
    /// A capacity of zero is raised to one so the most recent command is always visible.
    pub fn new(max_entries: usize, max_output_size: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
            max_output_size,
        }
    }

    /// Appends a new in-flight entry and returns its id.
    pub fn start(&mut self, id: impl Into<String>, command: &str, cwd: PathBuf) -> String {
        let id = id.into();
        if self.entries.len() == self.max_entries {
            if let Some(evicted) = self.entries.pop_front() {
                log::trace!("History full, evicting entry {}", evicted.id);
            }
        }
        self.entries.push_back(HistoryEntry {
            id: id.clone(),
            command: command.to_string(),
            cwd,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            success: false,
            truncated: false,
        });
        id
    }

    /// Fills in the end-of-life fields of entry `id`.
    ///
    /// Returns `false` when the entry is unknown (e.g. already evicted) or was already completed;
    /// the entry is left untouched in both cases.
    pub fn complete(&mut self, id: &str, record: CompletionRecord) -> bool {
        let max_output_size = self.max_output_size;
        let Some(entry) = self.entries.iter_mut().rev().find(|e| e.id == id) else {
            log::debug!("History entry {} not found; completion dropped", id);
            return false;
        };
        if entry.is_complete() {
            log::warn!("History entry {} completed twice; keeping the first completion", id);
            return false;
        }

        let end = Utc::now();
        let (stdout, stdout_cut) = truncate_middle(&record.stdout, max_output_size);
        let (stderr, stderr_cut) = truncate_middle(&record.stderr, max_output_size);
        let elapsed = (end - entry.start_time).num_milliseconds();

        entry.end_time = Some(end);
        entry.duration_ms = Some(u64::try_from(elapsed).unwrap_or(0));
        entry.exit_code = Some(record.exit_code);
        entry.success = record.exit_code == 0;
        entry.stdout = stdout;
        entry.stderr = stderr;
        entry.truncated = record.truncated || stdout_cut || stderr_cut;
        true
    }

    /// The entry with id `id`, if it is still in the ring.
    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// The `n` most recent entries, oldest first.
    pub fn last(&self, n: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Case-insensitive substring search over command text.
    pub fn search(&self, query: &str) -> Vec<HistoryEntry> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.command.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Completed entries that did not succeed.
    pub fn failed(&self) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_complete() && !e.success)
            .cloned()
            .collect()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entry is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capacity of the ring.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// A serializable copy of the log.
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            max_entries: self.max_entries,
            max_output_size: self.max_output_size,
            entries: self.entries.iter().cloned().collect(),
        }
    }

    /// Rebuilds a history; if the snapshot holds more than `max_entries`, only the newest are kept.
    pub fn from_snapshot(snapshot: HistorySnapshot) -> Self {
        let mut history = Self::new(snapshot.max_entries, snapshot.max_output_size);
        let skip = snapshot.entries.len().saturating_sub(history.max_entries);
        history.entries.extend(snapshot.entries.into_iter().skip(skip));
        history
    }

    /// Serializes the log as a [`HistorySnapshot`].
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot())
    }

    /// Parses a log written by [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::from_snapshot)
    }
}
