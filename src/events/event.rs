//! # Events emitted by the engine and its task actors.
//!
//! The [`EventKind`] enum classifies events into:
//! - **Owner events**: identification, task list snapshots, control errors
//! - **Task events**: started/stopped, log lines, stats, details, state changes
//!
//! The [`Event`] struct carries the routing scope (`owner`, `task`) plus the
//! optional payload matching its kind.
//!
//! ## Ordering guarantees
//! Each event has a process-wide sequence number (`seq`) that increases
//! monotonically. Events of one task are published from that task's actor in
//! order, so per-task `seq` order is causal order.
//!
//! ## Example
//! ```rust
//! use loopvisor::{Event, EventKind, OwnerId, Severity, TaskId};
//!
//! let task = TaskId::new();
//! let ev = Event::new(EventKind::LogLine)
//!     .with_owner(OwnerId::from("alice"))
//!     .with_task(task)
//!     .with_message("channel 1 logged in")
//!     .with_severity(Severity::Success);
//!
//! assert_eq!(ev.kind, EventKind::LogLine);
//! assert_eq!(ev.task, Some(task));
//! assert_eq!(ev.message.as_deref(), Some("channel 1 logged in"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::tasks::{
    LifecycleState, OwnerId, Severity, StatsUpdate, TaskDetails, TaskId, TaskSummary,
};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // === Owner events ===
    /// The owner identified.
    ///
    /// Sets: `owner`
    Identified,

    /// Full task list of an owner, sent whenever membership changes.
    ///
    /// Sets: `owner`, `tasks`
    OwnerTasksSnapshot,

    /// A control request was rejected.
    ///
    /// Sets: `owner`, `message`, optionally `task`
    Error,

    // === Task events ===
    /// A task was created and its actor spawned.
    ///
    /// Sets: `owner`, `task`
    TaskStarted,

    /// A task stopped. Without `task`, every task of the owner was stopped.
    ///
    /// Sets: `owner`, optionally `task`, `message`, `severity`
    TaskStopped,

    /// Lifecycle transition.
    ///
    /// Sets: `owner`, `task`, `state`, `message` (`"<from> -> <to>"`)
    StateChanged,

    /// One entry of the task's log ring.
    ///
    /// Sets: `owner`, `task`, `message`, `severity`
    LogLine,

    /// Counters after a resolved send.
    ///
    /// Sets: `owner`, `task`, `stats`
    StatsUpdate,

    /// Full task snapshot (answer to a details request).
    ///
    /// Sets: `owner`, `task`, `details`
    TaskDetails,
}

/// Engine event with routing scope and optional payload.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Process-wide, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: DateTime<Utc>,
    /// Event classification.
    #[serde(rename = "type")]
    pub kind: EventKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Arc<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<LifecycleState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Arc<[TaskSummary]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Arc<TaskDetails>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: Utc::now(),
            kind,
            owner: None,
            task: None,
            message: None,
            severity: None,
            state: None,
            stats: None,
            tasks: None,
            details: None,
        }
    }

    /// Creates an event already scoped to `(owner, task)`.
    pub fn for_task(kind: EventKind, owner: &OwnerId, task: TaskId) -> Self {
        Self::new(kind).with_owner(owner.clone()).with_task(task)
    }

    #[inline]
    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    #[inline]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    #[inline]
    pub fn with_message(mut self, message: impl Into<Arc<str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[inline]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    #[inline]
    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = Some(state);
        self
    }

    #[inline]
    pub fn with_stats(mut self, stats: StatsUpdate) -> Self {
        self.stats = Some(stats);
        self
    }

    #[inline]
    pub fn with_tasks(mut self, tasks: Vec<TaskSummary>) -> Self {
        self.tasks = Some(tasks.into());
        self
    }

    #[inline]
    pub fn with_details(mut self, details: TaskDetails) -> Self {
        self.details = Some(Arc::new(details));
        self
    }

    /// Creates an owner-scoped `error` event.
    pub fn error(owner: &OwnerId, message: impl Into<Arc<str>>) -> Self {
        Event::new(EventKind::Error)
            .with_owner(owner.clone())
            .with_message(message)
            .with_severity(Severity::Error)
    }

    /// `true` when the event addresses a whole owner rather than one task.
    #[inline]
    pub fn is_owner_scoped(&self) -> bool {
        self.task.is_none()
    }

    /// JSON wire form for transports.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
