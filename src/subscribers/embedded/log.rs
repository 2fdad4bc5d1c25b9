//! # LogWriter: events as `tracing` records
//!
//! A subscriber that turns every engine event into one structured `tracing`
//! record under the `loopvisor::events` target. Install a `tracing`
//! subscriber (e.g. `tracing-subscriber`) to see them.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO loopvisor::events: task started owner=alice task=6f1c…
//! INFO loopvisor::events: state changed owner=alice task=6f1c… transition="starting -> running"
//! WARN loopvisor::events: log owner=alice task=6f1c… message="Channel 2 disconnected, will retry"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use crate::tasks::Severity;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let owner = e.owner.as_ref().map(|o| o.as_str()).unwrap_or("-");
        let task = e.task.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
        let message = e.message.as_deref().unwrap_or("");

        match e.kind {
            EventKind::Identified => {
                tracing::info!(target: "loopvisor::events", owner, "owner identified");
            }
            EventKind::OwnerTasksSnapshot => {
                let tasks = e.tasks.as_ref().map_or(0, |t| t.len());
                tracing::debug!(target: "loopvisor::events", owner, tasks, "owner snapshot");
            }
            EventKind::Error => {
                tracing::warn!(target: "loopvisor::events", owner, task, message, "request rejected");
            }
            EventKind::TaskStarted => {
                tracing::info!(target: "loopvisor::events", owner, task, "task started");
            }
            EventKind::TaskStopped => {
                tracing::info!(target: "loopvisor::events", owner, task, message, "task stopped");
            }
            EventKind::StateChanged => {
                tracing::info!(
                    target: "loopvisor::events",
                    owner,
                    task,
                    transition = message,
                    "state changed"
                );
            }
            EventKind::LogLine => match e.severity {
                Some(Severity::Error) => {
                    tracing::error!(target: "loopvisor::events", owner, task, message, "log")
                }
                Some(Severity::Warning) => {
                    tracing::warn!(target: "loopvisor::events", owner, task, message, "log")
                }
                _ => tracing::debug!(target: "loopvisor::events", owner, task, message, "log"),
            },
            EventKind::StatsUpdate => {
                if let Some(s) = e.stats {
                    tracing::trace!(
                        target: "loopvisor::events",
                        owner,
                        task,
                        sent = s.sent,
                        failed = s.failed,
                        active = s.active_channels,
                        loops = s.loops,
                        "stats"
                    );
                }
            }
            EventKind::TaskDetails => {
                tracing::trace!(target: "loopvisor::events", owner, task, "details served");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
