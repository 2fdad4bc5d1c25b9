//! # Task counters.
//!
//! [`TaskStats`] holds the cumulative counters of one task. Counters only grow;
//! `active_channels` is the one gauge and drops to 0 when the task stops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative counters of one task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    /// Messages delivered.
    pub sent: u64,
    /// Messages abandoned after the retry budget ran out.
    pub failed: u64,
    /// Completed passes over the message sequence.
    pub loops: u64,
    /// Whole-task restarts.
    pub restarts: u32,
    /// Time of the last delivered message.
    pub last_success: Option<DateTime<Utc>>,
    /// Round-robin selections per channel, indexed by channel id.
    pub channel_usage: Vec<u64>,
    /// Channels currently `Active` (gauge).
    pub active_channels: usize,
    /// Channels the task was built with.
    pub total_channels: usize,
}

impl TaskStats {
    /// Zeroed counters for a task with `channels` channels.
    pub fn new(channels: usize) -> Self {
        Self {
            channel_usage: vec![0; channels],
            total_channels: channels,
            ..Self::default()
        }
    }

    pub(crate) fn record_usage(&mut self, channel: usize) {
        if let Some(count) = self.channel_usage.get_mut(channel) {
            *count += 1;
        }
    }
}

/// Compact stats broadcast after every resolved send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsUpdate {
    pub sent: u64,
    pub failed: u64,
    pub active_channels: usize,
    pub loops: u64,
}

impl From<&TaskStats> for StatsUpdate {
    fn from(s: &TaskStats) -> Self {
        Self {
            sent: s.sent,
            failed: s.failed,
            active_channels: s.active_channels,
            loops: s.loops,
        }
    }
}
