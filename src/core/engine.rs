//! # Engine: the control surface of the dispatch engine.
//!
//! The [`Engine`] owns the registry, the event bus, the observer broadcaster,
//! the global subscribers, the optional snapshot store and the background
//! loops. Transports translate their requests into the control operations
//! below and forward [`Observer`] streams back to their clients.
//!
//! ## Control operations
//! | operation                     | effect                                                        |
//! |-------------------------------|---------------------------------------------------------------|
//! | [`identify`](Engine::identify)             | registers the owner, publishes `identified` + task list |
//! | [`list_tasks`](Engine::list_tasks)         | task summaries, publishes the task list                 |
//! | [`start_task`](Engine::start_task)         | builds a task, spawns its actor, publishes `task_started` |
//! | [`stop_task`](Engine::stop_task)           | stops and unlinks one task                               |
//! | [`stop_all_tasks`](Engine::stop_all_tasks) | stops and unlinks every task of the owner                |
//! | [`get_task_details`](Engine::get_task_details) | full snapshot, publishes `task_details`              |
//! | [`logout`](Engine::logout)                 | removes the owner, its tasks and its observers           |
//!
//! A rejected request returns a [`ControlError`] and publishes it as an `error`
//! event to the owner's observers. Every membership change republishes the
//! owner's task list and persists a snapshot.
//!
//! ## Background loops
//! ```text
//! router       Bus ──► Broadcaster (observers) + SubscriberSet (global subscribers)
//! sweeper      every sweep_interval:    owners idle > owner_ttl are removed
//! snapshotter  every snapshot_interval: registry ──► SnapshotStore
//! watchdog     every watchdog_interval: running tasks idle > stall_timeout are restarted
//! ```
//!
//! ## Shutdown
//! [`Engine::shutdown`] stops every task, waits up to `grace` for the actors,
//! saves a final snapshot and ends the background loops.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::channels::ChannelFactory;
use crate::core::{EngineBuilder, EngineConfig, Registry, shutdown};
use crate::error::{ControlError, PersistenceError};
use crate::events::{Bus, Event, EventKind};
use crate::persistence::{Snapshot, SnapshotStore};
use crate::subscribers::{Broadcaster, Observer, SubscriberSet};
use crate::tasks::{
    DispatchTask, LifecycleState, OwnerId, Severity, TaskDetails, TaskId, TaskInputs,
    TaskSummary,
};

/// Multi-owner dispatch engine.
///
/// Built with [`EngineBuilder`]; shared as `Arc<Engine>` by transports.
pub struct Engine {
    cfg: EngineConfig,
    bus: Bus,
    registry: Arc<Registry>,
    broadcaster: Arc<Broadcaster>,
    factory: Arc<dyn ChannelFactory>,
    store: Option<Arc<dyn SnapshotStore>>,
    /// Held from building a snapshot until it is saved.
    persisting: Arc<Mutex<()>>,
    actors: TaskTracker,
    background: TaskTracker,
    token: CancellationToken,
    closed: AtomicBool,
}

impl Engine {
    /// Returns a builder for an engine using `factory` for channel logins.
    pub fn builder(cfg: EngineConfig, factory: Arc<dyn ChannelFactory>) -> EngineBuilder {
        EngineBuilder::new(cfg, factory)
    }

    pub(crate) fn new_internal(
        cfg: EngineConfig,
        factory: Arc<dyn ChannelFactory>,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let broadcaster = Arc::new(Broadcaster::new(cfg.observer_queue));
        Self {
            cfg,
            bus,
            registry: Arc::new(Registry::new()),
            broadcaster,
            factory,
            store,
            persisting: Arc::new(Mutex::new(())),
            actors: TaskTracker::new(),
            background: TaskTracker::new(),
            token: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    // ---- control operations ----

    /// Registers `owner` (or refreshes it) and publishes `identified` followed
    /// by the owner's task list.
    pub async fn identify(&self, owner: &OwnerId) -> Result<Vec<TaskSummary>, ControlError> {
        if let Err(e) = self.ensure_open() {
            return Err(self.reject(owner, e));
        }
        let created = self.registry.create_or_get_owner(owner).await;
        tracing::info!(%owner, created, "owner identified");

        self.bus
            .publish(Event::new(EventKind::Identified).with_owner(owner.clone()));
        Ok(self.publish_owner_snapshot(owner).await)
    }

    /// Summaries of the owner's tasks, oldest first.
    pub async fn list_tasks(&self, owner: &OwnerId) -> Result<Vec<TaskSummary>, ControlError> {
        if let Err(e) = self.registry.touch(owner).await {
            return Err(self.reject(owner, e));
        }
        Ok(self.publish_owner_snapshot(owner).await)
    }

    /// Creates a task from `inputs` and spawns its actor.
    ///
    /// Validation failures leave no trace in the registry. A task whose
    /// channels all fail to log in is still created and ends stopped with an
    /// error; that outcome arrives through events.
    pub async fn start_task(
        &self,
        owner: &OwnerId,
        inputs: TaskInputs,
    ) -> Result<TaskId, ControlError> {
        match self.try_start(owner, inputs).await {
            Ok(id) => Ok(id),
            Err(e) => Err(self.reject(owner, e)),
        }
    }

    async fn try_start(&self, owner: &OwnerId, inputs: TaskInputs) -> Result<TaskId, ControlError> {
        self.ensure_open()?;
        self.registry.touch(owner).await?;

        let task = Arc::new(DispatchTask::new(
            owner.clone(),
            inputs,
            self.bus.clone(),
            &self.cfg,
        ));
        let actor = task.start(Arc::clone(&self.factory), &self.cfg).await?;
        let id = task.id();
        self.registry.add_task(Arc::clone(&task)).await?;

        tracing::info!(
            %owner,
            task = %id,
            channels = task.credentials().len(),
            messages = task.messages().len(),
            "task started"
        );
        self.bus
            .publish(Event::for_task(EventKind::TaskStarted, owner, id));
        self.actors.spawn(actor.run());

        self.membership_changed(owner).await;
        Ok(id)
    }

    /// Stops one task and removes it from the owner's list.
    pub async fn stop_task(&self, owner: &OwnerId, task: TaskId) -> Result<bool, ControlError> {
        match self.try_stop(owner, task).await {
            Ok(stopped) => Ok(stopped),
            Err(e) => Err(self.reject(owner, e)),
        }
    }

    async fn try_stop(&self, owner: &OwnerId, task: TaskId) -> Result<bool, ControlError> {
        self.registry.touch(owner).await?;
        let prior = self.registry.get_task(owner, task).await?.state().await;
        let removed = self.registry.remove_task(owner, task).await?;
        let state = removed.state().await;
        tracing::info!(%owner, task = %task, state = state.as_label(), "task removed");

        // A task that had already ended announced nothing on this stop.
        if matches!(prior, LifecycleState::Stopped(_) | LifecycleState::Failed(_)) {
            self.bus.publish(
                Event::for_task(EventKind::TaskStopped, owner, task)
                    .with_state(state)
                    .with_severity(Severity::Info),
            );
        }
        self.membership_changed(owner).await;
        Ok(true)
    }

    /// Stops and removes every task of the owner. Returns how many there were.
    pub async fn stop_all_tasks(&self, owner: &OwnerId) -> Result<usize, ControlError> {
        if let Err(e) = self.registry.touch(owner).await {
            return Err(self.reject(owner, e));
        }
        let stopped = self.registry.stop_all_tasks_for_owner(owner).await;
        tracing::info!(%owner, stopped, "all tasks stopped");

        self.bus.publish(
            Event::new(EventKind::TaskStopped)
                .with_owner(owner.clone())
                .with_message("all")
                .with_severity(Severity::Info),
        );
        self.membership_changed(owner).await;
        Ok(stopped)
    }

    /// Full snapshot of one task; also published as `task_details`.
    pub async fn get_task_details(
        &self,
        owner: &OwnerId,
        task: TaskId,
    ) -> Result<TaskDetails, ControlError> {
        let lookup = async {
            self.registry.touch(owner).await?;
            self.registry.get_task(owner, task).await
        };
        let handle = match lookup.await {
            Ok(h) => h,
            Err(e) => return Err(self.reject(owner, e)),
        };

        let details = handle.details().await;
        self.bus.publish(
            Event::for_task(EventKind::TaskDetails, owner, task).with_details(details.clone()),
        );
        Ok(details)
    }

    /// Removes the owner, stops its tasks and ends its observers.
    ///
    /// Unknown owners are not an error. Returns how many tasks were stopped.
    pub async fn logout(&self, owner: &OwnerId) -> usize {
        let stopped = self.registry.remove_owner(owner).await;
        let observers = self.broadcaster.drop_owner(owner).await;
        tracing::info!(%owner, stopped, observers, "owner logged out");
        self.persist_quietly().await;
        stopped
    }

    // ---- observers ----

    /// Opens an event stream for `owner`, optionally focused on one task.
    ///
    /// The stream receives owner-wide events (task list, start/stop, errors)
    /// and, while focused, the log lines, stats and state changes of that
    /// task.
    pub async fn subscribe(&self, owner: &OwnerId, task: Option<TaskId>) -> Observer {
        self.broadcaster.subscribe(owner.clone(), task).await
    }

    /// Moves an observer to another task (or to owner-wide events only).
    pub async fn focus(&self, observer: &Observer, task: Option<TaskId>) -> bool {
        self.broadcaster.focus(observer.id(), task).await
    }

    /// Looks a task up without touching the owner or publishing anything.
    pub async fn task(
        &self,
        owner: &OwnerId,
        task: TaskId,
    ) -> Result<Arc<DispatchTask>, ControlError> {
        self.registry.get_task(owner, task).await
    }

    // ---- persistence ----

    /// Saves the registry to the snapshot store. Returns the number of task
    /// records written (0 without a store).
    pub async fn persist(&self) -> Result<usize, PersistenceError> {
        match &self.store {
            Some(store) => {
                persist_registry(&self.registry, store.as_ref(), &self.persisting).await
            }
            None => Ok(0),
        }
    }

    /// Recreates tasks from `snapshot` as stopped records.
    ///
    /// Channels are never logged in again; an owner must start a new task.
    /// Records whose task id is already known are skipped.
    pub async fn restore(&self, snapshot: Snapshot) -> usize {
        let mut restored = 0;
        for record in snapshot.owners.into_values().flatten() {
            let owner = record.owner_id.clone();
            let id = record.task_id;
            if !matches!(
                self.registry.get_task(&owner, id).await,
                Err(ControlError::TaskNotFound { .. })
            ) {
                tracing::debug!(%owner, task = %id, "snapshot record skipped: task exists");
                continue;
            }

            let task = Arc::new(DispatchTask::restore(record, self.bus.clone(), &self.cfg));
            match self.registry.add_task(task).await {
                Ok(()) => restored += 1,
                Err(e) => {
                    tracing::warn!(%owner, task = %id, error = %e, "snapshot record rejected")
                }
            }
        }
        if restored > 0 {
            tracing::info!(tasks = restored, "tasks restored from snapshot");
        }
        restored
    }

    // ---- lifecycle ----

    /// Stops every task, waits up to `grace` for the actors, saves a final
    /// snapshot and ends the background loops.
    ///
    /// Later control requests fail with [`ControlError::ShutDown`]. A second
    /// call returns immediately.
    pub async fn shutdown(&self) -> Result<(), PersistenceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("engine shutting down");

        for task in self.registry.all_tasks().await {
            task.stop().await;
        }
        self.actors.close();
        if !self.cfg.grace.is_zero()
            && tokio::time::timeout(self.cfg.grace, self.actors.wait())
                .await
                .is_err()
        {
            tracing::warn!(
                grace = ?self.cfg.grace,
                stuck = self.actors.len(),
                "task actors still running after grace"
            );
        }

        let persisted = self.persist().await;

        self.token.cancel();
        self.background.close();
        self.background.wait().await;

        let saved = persisted?;
        tracing::info!(tasks = saved, "engine stopped");
        Ok(())
    }

    /// Waits for a termination signal, then shuts down.
    ///
    /// Fails only when signal handlers cannot be installed; a failing final
    /// snapshot is logged.
    pub async fn run_until_signal(&self) -> std::io::Result<()> {
        shutdown::wait_for_shutdown_signal().await?;
        tracing::info!("shutdown signal received");
        if let Err(e) = self.shutdown().await {
            tracing::error!(error = %e, label = e.as_label(), "final snapshot failed");
        }
        Ok(())
    }

    /// `true` once [`shutdown`](Engine::shutdown) has begun.
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ---- internals ----

    fn ensure_open(&self) -> Result<(), ControlError> {
        if self.is_shut_down() {
            Err(ControlError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Logs and publishes a rejected request, handing the error back.
    fn reject(&self, owner: &OwnerId, err: ControlError) -> ControlError {
        tracing::warn!(%owner, error = %err, label = err.as_label(), "control request rejected");
        let ev = Event::error(owner, err.to_string());
        let ev = match &err {
            ControlError::Unauthorized { task, .. } | ControlError::TaskNotFound { task } => {
                ev.with_task(*task)
            }
            _ => ev,
        };
        self.bus.publish(ev);
        err
    }

    async fn summaries(&self, owner: &OwnerId) -> Vec<TaskSummary> {
        let mut out = Vec::new();
        for task in self.registry.tasks_of(owner).await {
            out.push(task.summary().await);
        }
        out.sort_by_key(|s| s.created_at);
        out
    }

    async fn publish_owner_snapshot(&self, owner: &OwnerId) -> Vec<TaskSummary> {
        let tasks = self.summaries(owner).await;
        self.bus.publish(
            Event::new(EventKind::OwnerTasksSnapshot)
                .with_owner(owner.clone())
                .with_tasks(tasks.clone()),
        );
        tasks
    }

    async fn membership_changed(&self, owner: &OwnerId) {
        self.publish_owner_snapshot(owner).await;
        self.persist_quietly().await;
    }

    async fn persist_quietly(&self) {
        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, label = e.as_label(), "snapshot failed");
        }
    }

    /// Starts the router and the periodic loops. Called once by the builder.
    pub(crate) fn spawn_background(&self, subs: SubscriberSet) {
        let mut rx = self.bus.subscribe();
        let broadcaster = Arc::clone(&self.broadcaster);
        let token = self.token.clone();
        self.background.spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = token.cancelled() => break,
                    r = rx.recv() => r,
                };
                match received {
                    Ok(ev) => route(&broadcaster, &subs, &ev).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event router lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(ev) => route(&broadcaster, &subs, &ev).await,
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            subs.shutdown().await;
        });

        if let Some(period) = self.cfg.sweep_every() {
            let registry = Arc::clone(&self.registry);
            let broadcaster = Arc::clone(&self.broadcaster);
            let store = self.store.clone();
            let persisting = Arc::clone(&self.persisting);
            let ttl = self.cfg.owner_ttl;
            self.background
                .spawn(every(self.token.clone(), period, move || {
                    let registry = Arc::clone(&registry);
                    let broadcaster = Arc::clone(&broadcaster);
                    let store = store.clone();
                    let persisting = Arc::clone(&persisting);
                    async move {
                        let swept = registry.sweep_inactive(Utc::now(), ttl).await;
                        if swept.is_empty() {
                            return;
                        }
                        for owner in &swept {
                            broadcaster.drop_owner(owner).await;
                        }
                        if let Some(store) = store {
                            let saved =
                                persist_registry(&registry, store.as_ref(), &persisting).await;
                            if let Err(e) = saved {
                                tracing::warn!(error = %e, label = e.as_label(), "snapshot failed");
                            }
                        }
                    }
                }));
        }

        if let (Some(period), Some(store)) = (self.cfg.snapshot_every(), self.store.clone()) {
            let registry = Arc::clone(&self.registry);
            let persisting = Arc::clone(&self.persisting);
            self.background
                .spawn(every(self.token.clone(), period, move || {
                    let registry = Arc::clone(&registry);
                    let store = Arc::clone(&store);
                    let persisting = Arc::clone(&persisting);
                    async move {
                        let saved = persist_registry(&registry, store.as_ref(), &persisting).await;
                        if let Err(e) = saved {
                            tracing::warn!(error = %e, label = e.as_label(), "periodic snapshot failed");
                        }
                    }
                }));
        }

        if let Some(period) = self.cfg.watchdog_every() {
            let registry = Arc::clone(&self.registry);
            let cfg = Arc::new(self.cfg.clone());
            self.background
                .spawn(every(self.token.clone(), period, move || {
                    let registry = Arc::clone(&registry);
                    let cfg = Arc::clone(&cfg);
                    async move {
                        restart_stalled(&registry, &cfg, Utc::now()).await;
                    }
                }));
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn route(broadcaster: &Broadcaster, subs: &SubscriberSet, ev: &Event) {
    broadcaster.deliver(ev).await;
    subs.emit(ev);
}

/// Runs `f` every `period` (first run after one period) until cancelled.
async fn every<F, Fut>(token: CancellationToken, period: Duration, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut tick = tokio::time::interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => f().await,
        }
    }
}

async fn persist_registry(
    registry: &Registry,
    store: &dyn SnapshotStore,
    persisting: &Mutex<()>,
) -> Result<usize, PersistenceError> {
    let _saving = persisting.lock().await;
    let mut snapshot = Snapshot::default();
    for task in registry.all_tasks().await {
        snapshot.push(task.record().await);
    }
    store.save(&snapshot).await?;
    Ok(snapshot.len())
}

/// Restarts running tasks idle for longer than their stall limit. Returns how
/// many.
async fn restart_stalled(registry: &Registry, cfg: &EngineConfig, now: DateTime<Utc>) -> usize {
    let mut restarted = 0;
    for task in registry.all_tasks().await {
        let stall = cfg.stall_limit_for(task.inputs().delay_seconds);
        let limit = chrono::Duration::from_std(stall).unwrap_or(chrono::Duration::MAX);
        let idle = now.signed_duration_since(task.last_activity().await);
        if idle <= limit || !task.restart().await {
            continue;
        }
        restarted += 1;
        tracing::warn!(
            owner = %task.owner(),
            task = %task.id(),
            idle_secs = idle.num_seconds(),
            "stalled task restarted"
        );
        task.journal()
            .log(
                Severity::Warning,
                format!("No activity for {}s - restarting task", idle.num_seconds()),
            )
            .await;
    }
    restarted
}
