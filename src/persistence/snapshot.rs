//! # Persisted snapshot schema.
//!
//! One [`TaskRecord`] per task, grouped by owner:
//!
//! ```json
//! {
//!   "alice": [
//!     {
//!       "taskId": "6f1c…",
//!       "ownerId": "alice",
//!       "stats": { "sent": 42, "failed": 3, "loops": 2, … },
//!       "config": { "running": false, "lastActivity": "2025-01-01T00:00:00Z" },
//!       "originalInputs": { "credentials": "…", "messages": "…", … },
//!       "createdAt": "2025-01-01T00:00:00Z"
//!     }
//!   ]
//! }
//! ```
//!
//! `running` is always written as `false`: a snapshot never resumes logins.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tasks::{OwnerId, TaskId, TaskInputs, TaskStats};

/// Run flags of a persisted task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordConfig {
    pub running: bool,
    pub last_activity: DateTime<Utc>,
}

/// One persisted task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub owner_id: OwnerId,
    pub stats: TaskStats,
    pub config: RecordConfig,
    pub original_inputs: TaskInputs,
    pub created_at: DateTime<Utc>,
}

/// Every persisted task, keyed by owner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub owners: BTreeMap<OwnerId, Vec<TaskRecord>>,
}

impl Snapshot {
    pub fn push(&mut self, record: TaskRecord) {
        self.owners
            .entry(record.owner_id.clone())
            .or_default()
            .push(record);
    }

    /// Total number of task records.
    pub fn len(&self) -> usize {
        self.owners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records, owner by owner.
    pub fn records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.owners.values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_is_keyed_by_owner() {
        let mut snap = Snapshot::default();
        snap.push(TaskRecord {
            task_id: TaskId::new(),
            owner_id: OwnerId::from("alice"),
            stats: TaskStats::new(2),
            config: RecordConfig {
                running: false,
                last_activity: Utc::now(),
            },
            original_inputs: TaskInputs::default(),
            created_at: Utc::now(),
        });

        let json = serde_json::to_value(&snap).unwrap();
        let records = json["alice"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["config"]["running"], false);
        assert!(records[0].get("originalInputs").is_some());
        assert_eq!(records[0]["stats"]["totalChannels"], 2);
    }
}
