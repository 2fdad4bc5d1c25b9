//! # Per-task shared state and its single writer path.
//!
//! Everything observers can read about a task lives in [`TaskShared`] behind one
//! `tokio::sync::Mutex`. The task actor and the `stop`/`restart` entry points
//! all go through the same lock, so a send completion can never interleave with
//! a concurrent stop.
//!
//! [`Journal`] is the write side: it appends to the log ring, mirrors channel
//! health, applies lifecycle transitions and publishes the matching events.
//!
//! ## Rules
//! - Results of a run are committed only while that run's token is live
//!   ([`Journal::commit`]); a send resolving after `stop()` is discarded.
//! - Every transition is logged to the ring and published as `state_changed`.
//! - `active_channels` is recomputed only while the lifecycle is running; stop
//!   pins it to 0.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::channels::ChannelState;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{
    Lifecycle, LifecycleState, LogEntry, LogRing, OwnerId, Severity, StatsUpdate, StopCause,
    TaskId, TaskStats, Transition,
};

/// Observable state of one task.
pub(crate) struct TaskShared {
    pub lifecycle: Lifecycle,
    pub stats: TaskStats,
    /// Mirror of the pool's channel health, indexed by channel id.
    pub channels: Vec<ChannelState>,
    pub logs: LogRing,
    /// Index of the next message to send.
    pub cursor: usize,
    pub last_activity: DateTime<Utc>,
    /// Token of the current run; `None` before the first start.
    pub run: Option<CancellationToken>,
}

impl TaskShared {
    pub fn new(lifecycle: Lifecycle, stats: TaskStats, log_capacity: usize) -> Self {
        let channels = vec![ChannelState::LoggingIn; stats.total_channels];
        Self {
            lifecycle,
            stats,
            channels,
            logs: LogRing::new(log_capacity),
            cursor: 0,
            last_activity: Utc::now(),
            run: None,
        }
    }

    fn count_active(&self) -> usize {
        self.channels
            .iter()
            .filter(|s| **s == ChannelState::Active)
            .count()
    }
}

/// Write side of a task's shared state.
#[derive(Clone)]
pub(crate) struct Journal {
    owner: OwnerId,
    task: TaskId,
    bus: Bus,
    shared: Arc<Mutex<TaskShared>>,
}

impl Journal {
    pub fn new(owner: OwnerId, task: TaskId, bus: Bus, shared: Arc<Mutex<TaskShared>>) -> Self {
        Self {
            owner,
            task,
            bus,
            shared,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn shared(&self) -> &Arc<Mutex<TaskShared>> {
        &self.shared
    }

    /// Event already scoped to this task.
    pub fn event(&self, kind: EventKind) -> Event {
        Event::for_task(kind, &self.owner, self.task)
    }

    pub fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }

    /// Appends to the ring, publishes a `log_line` and traces it.
    pub fn log_locked(&self, shared: &mut TaskShared, severity: Severity, message: String) {
        match severity {
            Severity::Info | Severity::Success => {
                tracing::info!(owner = %self.owner, task = %self.task, "{message}")
            }
            Severity::Warning => {
                tracing::warn!(owner = %self.owner, task = %self.task, "{message}")
            }
            Severity::Error => {
                tracing::error!(owner = %self.owner, task = %self.task, "{message}")
            }
        }

        self.bus.publish(
            self.event(EventKind::LogLine)
                .with_message(message.as_str())
                .with_severity(severity),
        );
        shared.logs.push(LogEntry {
            at: Utc::now(),
            severity,
            message,
        });
    }

    pub async fn log(&self, severity: Severity, message: impl Into<String>) {
        let mut shared = self.shared.lock().await;
        self.log_locked(&mut shared, severity, message.into());
    }

    /// Logs and publishes a transition that was already applied.
    pub fn announce_locked(&self, shared: &mut TaskShared, t: Transition) {
        if !t.to.is_running() {
            shared.stats.active_channels = 0;
        }
        shared.stats.restarts = shared.lifecycle.restart_count();
        shared.last_activity = Utc::now();

        let line = format!("{} -> {}", t.from.as_label(), t.to.as_label());
        let severity = match t.to {
            LifecycleState::Stopped(StopCause::AllChannelsAuthFailed)
            | LifecycleState::Failed(_) => Severity::Error,
            LifecycleState::Restarting => Severity::Warning,
            _ => Severity::Info,
        };
        self.log_locked(shared, severity, format!("state: {line}"));
        self.bus.publish(
            self.event(EventKind::StateChanged)
                .with_state(t.to)
                .with_message(line),
        );
    }

    /// Applies `f` to the lifecycle and announces the transition it returns.
    pub async fn transition<F>(&self, f: F) -> Option<Transition>
    where
        F: FnOnce(&mut Lifecycle) -> Option<Transition>,
    {
        let mut shared = self.shared.lock().await;
        let t = f(&mut shared.lifecycle)?;
        self.announce_locked(&mut shared, t);
        Some(t)
    }

    /// Mirrors one channel's health.
    pub async fn set_channel(&self, id: usize, state: ChannelState) {
        let mut shared = self.shared.lock().await;
        if let Some(slot) = shared.channels.get_mut(id) {
            *slot = state;
        }
        if shared.lifecycle.state().is_running() {
            shared.stats.active_channels = shared.count_active();
        }
    }

    /// Resets every mirrored channel to `state`.
    pub async fn set_all_channels(&self, state: ChannelState) {
        let mut shared = self.shared.lock().await;
        shared.channels.iter_mut().for_each(|s| *s = state);
        if shared.lifecycle.state().is_running() {
            shared.stats.active_channels = shared.count_active();
        }
    }

    /// Applies `f` only while `token` is live. Returns `false` when the run was
    /// cancelled and the result discarded.
    pub async fn commit<F>(&self, token: &CancellationToken, f: F) -> bool
    where
        F: FnOnce(&mut TaskShared),
    {
        let mut shared = self.shared.lock().await;
        if token.is_cancelled() {
            return false;
        }
        f(&mut shared);
        shared.last_activity = Utc::now();
        true
    }

    /// Publishes the compact counters.
    pub fn stats_locked(&self, shared: &TaskShared) {
        self.bus.publish(
            self.event(EventKind::StatsUpdate)
                .with_stats(StatsUpdate::from(&shared.stats)),
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::policies::RestartPolicy;

    /// A journal over a fresh task with `channels` channels, plus the bus.
    pub(crate) fn journal(channels: usize) -> (Journal, Bus) {
        let bus = Bus::new(4096);
        let shared = TaskShared::new(
            Lifecycle::new(RestartPolicy::default()),
            TaskStats::new(channels),
            100,
        );
        let journal = Journal::new(
            OwnerId::from("tester"),
            TaskId::new(),
            bus.clone(),
            Arc::new(Mutex::new(shared)),
        );
        (journal, bus)
    }
}
