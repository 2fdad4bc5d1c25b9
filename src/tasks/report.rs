//! Read-only views of a task, as handed to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channels::ChannelState;
use crate::tasks::{LifecycleState, LogEntry, OwnerId, TaskId, TaskStats};

/// Number of log entries carried by [`TaskDetails`].
pub const DETAILS_LOG_ENTRIES: usize = 20;

/// Per-channel line of [`TaskDetails`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelReport {
    /// 1-based channel number.
    pub number: usize,
    pub state: ChannelState,
    pub active: bool,
    /// Round-robin selections attributed to this channel.
    pub messages_sent: u64,
}

/// One line of an owner's task list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub running: bool,
    pub state: LifecycleState,
    pub stats: TaskStats,
    pub created_at: DateTime<Utc>,
}

/// Full snapshot of one task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetails {
    pub task_id: TaskId,
    pub owner_id: OwnerId,
    pub state: LifecycleState,
    pub running: bool,
    pub restored: bool,
    pub sent: u64,
    pub failed: u64,
    pub active_channels: usize,
    pub total_channels: usize,
    pub loops: u64,
    pub restarts: u32,
    pub cursor: usize,
    pub sequence_len: usize,
    pub channels: Vec<ChannelReport>,
    /// Most recent entries, newest first.
    pub logs: Vec<LogEntry>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
