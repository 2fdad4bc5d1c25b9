//! # DispatchTask: one owner's looping dispatch job.
//!
//! A task is built from [`TaskInputs`] (or from a persisted [`TaskRecord`]) and
//! lives in the registry until it is removed. Its run is performed by a
//! `TaskActor` returned from [`DispatchTask::start`]; the task itself only holds
//! the shared state and the two control entry points:
//!
//! - [`stop`](DispatchTask::stop): cancels the run token under the state lock
//! - [`restart`](DispatchTask::restart): asks a running actor to tear down and
//!   start over (used by the stall watchdog)
//!
//! Both serialize with the actor through the same lock (see `Journal`).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::channels::{ChannelFactory, ChannelState};
use crate::core::{EngineConfig, TaskActor};
use crate::error::ControlError;
use crate::events::{Bus, EventKind};
use crate::persistence::{RecordConfig, TaskRecord};
use crate::tasks::journal::{Journal, TaskShared};
use crate::tasks::report::{ChannelReport, DETAILS_LOG_ENTRIES, TaskDetails, TaskSummary};
use crate::tasks::{
    Credential, Lifecycle, LifecycleState, OwnerId, Severity, TaskId, TaskInputs, TaskStats,
};

/// A looping dispatch job owned by one owner.
pub struct DispatchTask {
    id: TaskId,
    owner: OwnerId,
    inputs: TaskInputs,
    credentials: Arc<[Credential]>,
    messages: Arc<[String]>,
    created_at: DateTime<Utc>,
    restored: bool,
    kick: Arc<Notify>,
    journal: Journal,
}

impl DispatchTask {
    /// A fresh `Idle` task. Inputs are parsed here, once.
    pub(crate) fn new(owner: OwnerId, inputs: TaskInputs, bus: Bus, cfg: &EngineConfig) -> Self {
        let id = TaskId::new();
        let credentials: Arc<[Credential]> = inputs.parse_credentials().into();
        let messages: Arc<[String]> = inputs.format_messages().into();
        let shared = TaskShared::new(
            Lifecycle::new(cfg.restart),
            TaskStats::new(credentials.len()),
            cfg.log_capacity,
        );
        Self::assemble(id, owner, inputs, credentials, messages, Utc::now(), false, bus, shared)
    }

    /// A `Stopped(Restored)` task rebuilt from a snapshot record.
    pub(crate) fn restore(record: TaskRecord, bus: Bus, cfg: &EngineConfig) -> Self {
        let credentials: Arc<[Credential]> = record.original_inputs.parse_credentials().into();
        let messages: Arc<[String]> = record.original_inputs.format_messages().into();

        let mut stats = record.stats;
        stats.active_channels = 0;
        stats.total_channels = credentials.len();
        stats.channel_usage.resize(credentials.len(), 0);

        let mut shared = TaskShared::new(
            Lifecycle::restored(cfg.restart, stats.restarts),
            stats,
            cfg.log_capacity,
        );
        shared.last_activity = record.config.last_activity;
        shared.channels.fill(ChannelState::Failed);

        Self::assemble(
            record.task_id,
            record.owner_id,
            record.original_inputs,
            credentials,
            messages,
            record.created_at,
            true,
            bus,
            shared,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        id: TaskId,
        owner: OwnerId,
        inputs: TaskInputs,
        credentials: Arc<[Credential]>,
        messages: Arc<[String]>,
        created_at: DateTime<Utc>,
        restored: bool,
        bus: Bus,
        shared: TaskShared,
    ) -> Self {
        let journal = Journal::new(
            owner.clone(),
            id,
            bus,
            Arc::new(tokio::sync::Mutex::new(shared)),
        );
        Self {
            id,
            owner,
            inputs,
            credentials,
            messages,
            created_at,
            restored,
            kick: Arc::new(Notify::new()),
            journal,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn inputs(&self) -> &TaskInputs {
        &self.inputs
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    pub(crate) fn journal(&self) -> &Journal {
        &self.journal
    }

    pub(crate) fn credentials(&self) -> &Arc<[Credential]> {
        &self.credentials
    }

    pub(crate) fn messages(&self) -> &Arc<[String]> {
        &self.messages
    }

    pub(crate) fn kick(&self) -> &Arc<Notify> {
        &self.kick
    }

    /// `Idle → Starting` and the actor that performs the run.
    ///
    /// The caller spawns the actor. Fails without any state change when the
    /// message sequence is empty, no credential was supplied or the
    /// destination is blank.
    pub(crate) async fn start(
        &self,
        factory: Arc<dyn ChannelFactory>,
        cfg: &EngineConfig,
    ) -> Result<TaskActor, ControlError> {
        if self.messages.is_empty() {
            return Err(ControlError::EmptySequence);
        }
        if self.credentials.is_empty() {
            return Err(ControlError::InvalidInput {
                reason: "no credentials supplied".into(),
            });
        }
        if self.inputs.destination.trim().is_empty() {
            return Err(ControlError::InvalidInput {
                reason: "destination is empty".into(),
            });
        }

        let token = CancellationToken::new();
        {
            let mut shared = self.journal.shared().lock().await;
            let Some(t) = shared.lifecycle.start(self.messages.len()) else {
                return Err(ControlError::InvalidInput {
                    reason: format!("task is {}", shared.lifecycle.state().as_label()),
                });
            };
            shared.run = Some(token.clone());
            self.journal.announce_locked(&mut shared, t);
            self.journal.log_locked(
                &mut shared,
                Severity::Info,
                format!(
                    "Task started with {} channels and {} messages",
                    self.credentials.len(),
                    self.messages.len()
                ),
            );
        }

        Ok(TaskActor::new(self, factory, cfg, token))
    }

    /// Stops the task. Always succeeds; a second call is a no-op.
    ///
    /// Pending sends are abandoned and their results discarded. Channel
    /// sessions are not logged out.
    pub async fn stop(&self) -> bool {
        let mut shared = self.journal.shared().lock().await;
        if let Some(token) = &shared.run {
            token.cancel();
        }
        let Some(t) = shared.lifecycle.stop() else {
            return true;
        };

        self.journal.announce_locked(&mut shared, t);
        self.journal.log_locked(
            &mut shared,
            Severity::Info,
            "Task stopped by user - channel sessions remain valid".into(),
        );
        let total = shared.stats.total_channels;
        self.journal.log_locked(
            &mut shared,
            Severity::Info,
            format!("Total channels used: {total}"),
        );
        self.journal.publish(
            self.journal
                .event(EventKind::TaskStopped)
                .with_state(shared.lifecycle.state())
                .with_severity(Severity::Info),
        );
        true
    }

    /// Asks a `Running` actor to tear down and restart. `false` in any other
    /// state.
    pub async fn restart(&self) -> bool {
        let shared = self.journal.shared().lock().await;
        if shared.lifecycle.state() != LifecycleState::Running {
            return false;
        }
        self.kick.notify_one();
        true
    }

    pub async fn state(&self) -> LifecycleState {
        self.journal.shared().lock().await.lifecycle.state()
    }

    pub async fn is_running(&self) -> bool {
        self.state().await.is_running()
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        self.journal.shared().lock().await.last_activity
    }

    pub async fn stats(&self) -> TaskStats {
        self.journal.shared().lock().await.stats.clone()
    }

    pub async fn summary(&self) -> TaskSummary {
        let shared = self.journal.shared().lock().await;
        TaskSummary {
            task_id: self.id,
            running: shared.lifecycle.state().is_running(),
            state: shared.lifecycle.state(),
            stats: shared.stats.clone(),
            created_at: self.created_at,
        }
    }

    pub async fn details(&self) -> TaskDetails {
        let shared = self.journal.shared().lock().await;
        let state = shared.lifecycle.state();
        let running = state.is_running();
        let channels = shared
            .channels
            .iter()
            .enumerate()
            .map(|(id, s)| ChannelReport {
                number: id + 1,
                state: *s,
                active: running && *s == ChannelState::Active,
                messages_sent: shared.stats.channel_usage.get(id).copied().unwrap_or(0),
            })
            .collect();

        TaskDetails {
            task_id: self.id,
            owner_id: self.owner.clone(),
            state,
            running,
            restored: self.restored,
            sent: shared.stats.sent,
            failed: shared.stats.failed,
            active_channels: shared.stats.active_channels,
            total_channels: shared.stats.total_channels,
            loops: shared.stats.loops,
            restarts: shared.stats.restarts,
            cursor: shared.cursor,
            sequence_len: self.messages.len(),
            channels,
            logs: shared.logs.recent(DETAILS_LOG_ENTRIES),
            last_activity: shared.last_activity,
            created_at: self.created_at,
        }
    }

    /// Snapshot record; `running` is always `false`.
    pub async fn record(&self) -> TaskRecord {
        let shared = self.journal.shared().lock().await;
        TaskRecord {
            task_id: self.id,
            owner_id: self.owner.clone(),
            stats: TaskStats {
                active_channels: 0,
                ..shared.stats.clone()
            },
            config: RecordConfig {
                running: false,
                last_activity: shared.last_activity,
            },
            original_inputs: self.inputs.clone(),
            created_at: self.created_at,
        }
    }
}
