//! # Per-task log ring buffer.
//!
//! Each task keeps the most recent entries of its own activity log, newest first.
//! Entries are also broadcast as `log_line` events; the ring is what a freshly
//! connected observer reads back through task details.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a task log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// One timestamped log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

/// Bounded log buffer, newest entry first.
#[derive(Clone, Debug)]
pub struct LogRing {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogRing {
    /// Creates an empty ring; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes a new entry at the front, evicting the oldest one when full.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// The `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        self.entries.iter().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> LogEntry {
        LogEntry {
            at: Utc::now(),
            severity: Severity::Info,
            message: format!("m{n}"),
        }
    }

    #[test]
    fn keeps_newest_entries_first() {
        let mut ring = LogRing::new(100);
        for n in 0..150 {
            ring.push(entry(n));
        }
        assert_eq!(ring.len(), 100);
        let recent = ring.recent(3);
        assert_eq!(recent[0].message, "m149");
        assert_eq!(recent[2].message, "m147");
        assert_eq!(ring.recent(200).last().map(|e| e.message.as_str()), Some("m50"));
    }
}
