//! # ChannelPool: logins, failure marking and reconnection.
//!
//! A pool owns the fixed-length list of channels of one task run. It is driven
//! by the task actor and never shared; background work (disconnect watchers,
//! reconnect timers, reconnect logins) reports back through an internal queue
//! of [`PoolEvent`]s that the actor feeds into [`ChannelPool::handle`].
//!
//! ```text
//!  initialize():  t0        t0+1·stagger   t0+2·stagger  ...
//!                 login #1  login #2       login #3           (serial, never overlapping)
//!
//!  mark_failed(i) ──► Failed ──(reconnect_delay)──► ReconnectDue ──► LoggingIn
//!                                                                     │ spawned login
//!                                                                     ▼
//!                                                   LoginFinished ──► Active | Failed
//! ```
//!
//! ## Rules
//! - A failed login never aborts the other logins.
//! - Every entry into `Active` or `Failed` bumps the channel generation; events
//!   carrying an older generation are ignored.
//! - [`ChannelPool::clear`] cancels all background work of the current epoch
//!   (used when the whole task restarts).
//! - A failed reconnect login leaves the channel `Failed`; it is not rescheduled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::channels::channel::{Channel, Slot};
use crate::channels::{ChannelFactory, ChannelRef, ChannelState};
use crate::error::ChannelError;
use crate::tasks::{Credential, Journal, Severity};

/// Background notification for the actor that drives the pool.
pub(crate) enum PoolEvent {
    /// The handle's disconnect future resolved.
    Disconnected { id: usize, generation: u64 },
    /// The reconnect delay of a failed channel elapsed.
    ReconnectDue { id: usize, generation: u64 },
    /// A reconnect login finished.
    LoginFinished {
        id: usize,
        generation: u64,
        result: Result<ChannelRef, ChannelError>,
    },
}

/// Outcome of [`ChannelPool::initialize`].
#[derive(Debug)]
pub(crate) struct LoginReport {
    /// Channels that ended `Active`.
    pub active: usize,
    /// Per-channel login result, indexed by channel id.
    pub results: Vec<Result<(), ChannelError>>,
}

/// Timing knobs of a pool.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PoolTimings {
    pub login_stagger: Duration,
    pub reconnect_delay: Duration,
}

pub(crate) struct ChannelPool {
    channels: Vec<Channel>,
    factory: Arc<dyn ChannelFactory>,
    destination: Arc<str>,
    timings: PoolTimings,
    tx: mpsc::UnboundedSender<PoolEvent>,
    rx: mpsc::UnboundedReceiver<PoolEvent>,
    /// Token of the task run.
    run: CancellationToken,
    /// Child of `run`; replaced on every `clear()`.
    epoch: CancellationToken,
    journal: Journal,
}

impl ChannelPool {
    pub fn new(
        factory: Arc<dyn ChannelFactory>,
        credentials: &[Credential],
        destination: Arc<str>,
        timings: PoolTimings,
        run: CancellationToken,
        journal: Journal,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let channels = credentials
            .iter()
            .enumerate()
            .map(|(id, c)| Channel::new(id, c.clone()))
            .collect();
        let epoch = run.child_token();
        Self {
            channels,
            factory,
            destination,
            timings,
            tx,
            rx,
            run,
            epoch,
            journal,
        }
    }

    /// Logs in every channel, serially, channel `i` not before `t0 + i·stagger`.
    ///
    /// Returns early (with the results so far) when the run is cancelled.
    pub async fn initialize(&mut self) -> LoginReport {
        let t0 = Instant::now();
        let mut results = Vec::with_capacity(self.channels.len());

        for id in 0..self.channels.len() {
            let offset = self.timings.login_stagger * id as u32;
            tokio::select! {
                _ = self.epoch.cancelled() => break,
                _ = sleep_until(t0 + offset) => {}
            }

            let number = self.channels[id].number();
            self.journal
                .log(Severity::Info, format!("Attempting login for channel {number}..."))
                .await;

            let credential = self.channels[id].credential.clone();
            let result = tokio::select! {
                _ = self.epoch.cancelled() => break,
                r = self.factory.login(&credential) => r,
            };

            match result {
                Ok(handle) => {
                    self.activate(id, handle).await;
                    results.push(Ok(()));
                }
                Err(e) => {
                    self.set_failed(id).await;
                    self.journal
                        .log(Severity::Error, format!("Channel {number} login failed: {e}"))
                        .await;
                    results.push(Err(e));
                }
            }
        }

        LoginReport {
            active: self.active_count(),
            results,
        }
    }

    /// Marks a channel `Failed` and schedules its reconnection.
    ///
    /// No-op when the channel is already `Failed`.
    pub async fn mark_failed(&mut self, id: usize) {
        let Some(channel) = self.channels.get(id) else {
            return;
        };
        if matches!(channel.slot, Slot::Failed) {
            return;
        }
        self.set_failed(id).await;
        self.schedule_reconnect(id);
    }

    /// Next background notification. Pending forever while there is none.
    pub async fn next_event(&mut self) -> PoolEvent {
        match self.rx.recv().await {
            Some(ev) => ev,
            // The pool holds a sender, so the queue never closes.
            None => futures::future::pending().await,
        }
    }

    /// Applies one background notification.
    pub async fn handle(&mut self, ev: PoolEvent) {
        match ev {
            PoolEvent::Disconnected { id, generation } => {
                if !self.is_current(id, generation) || !self.channels[id].is_active() {
                    return;
                }
                let number = self.channels[id].number();
                self.journal
                    .log(
                        Severity::Warning,
                        format!("Channel {number} disconnected, will retry"),
                    )
                    .await;
                self.mark_failed(id).await;
            }
            PoolEvent::ReconnectDue { id, generation } => {
                if !self.is_current(id, generation) || self.run.is_cancelled() {
                    return;
                }
                let number = self.channels[id].number();
                self.journal
                    .log(Severity::Info, format!("Reconnecting channel {number}..."))
                    .await;
                self.channels[id].slot = Slot::LoggingIn;
                self.journal.set_channel(id, ChannelState::LoggingIn).await;
                self.spawn_login(id);
            }
            PoolEvent::LoginFinished {
                id,
                generation,
                result,
            } => {
                if !self.is_current(id, generation)
                    || !matches!(self.channels[id].slot, Slot::LoggingIn)
                {
                    return;
                }
                self.channels[id].reconnect_pending = false;
                let number = self.channels[id].number();
                match result {
                    Ok(handle) => self.activate(id, handle).await,
                    Err(e) => {
                        self.set_failed(id).await;
                        self.journal
                            .log(
                                Severity::Error,
                                format!("Channel {number} reconnect failed: {e}"),
                            )
                            .await;
                    }
                }
            }
        }
    }

    /// Drops every session and cancels background work, leaving all channels
    /// `LoggingIn` for a fresh [`initialize`](Self::initialize).
    pub async fn clear(&mut self) {
        self.epoch.cancel();
        self.epoch = self.run.child_token();
        while self.rx.try_recv().is_ok() {}

        for channel in &mut self.channels {
            channel.slot = Slot::LoggingIn;
            channel.generation += 1;
            channel.reconnect_pending = false;
        }
        self.journal.set_all_channels(ChannelState::LoggingIn).await;
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn handle_of(&self, id: usize) -> Option<&ChannelRef> {
        self.channels.get(id).and_then(Channel::handle)
    }

    pub fn active_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_active()).count()
    }

    /// Ids of the currently `Active` channels.
    pub fn active_ids(&self) -> Vec<usize> {
        self.channels
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.id)
            .collect()
    }

    /// `true` when nothing can bring a channel back: none is `Active`, logging
    /// in, or waiting for a reconnect.
    pub fn is_exhausted(&self) -> bool {
        self.channels
            .iter()
            .all(|c| matches!(c.slot, Slot::Failed) && !c.reconnect_pending)
    }

    pub fn record_usage(&mut self, id: usize) {
        if let Some(channel) = self.channels.get_mut(id) {
            channel.usage += 1;
        }
    }

    #[cfg(test)]
    pub fn usage(&self, id: usize) -> u64 {
        self.channels.get(id).map_or(0, |c| c.usage)
    }

    #[cfg(test)]
    pub fn states(&self) -> Vec<ChannelState> {
        self.channels.iter().map(|c| c.slot.state()).collect()
    }

    fn is_current(&self, id: usize, generation: u64) -> bool {
        self.channels
            .get(id)
            .is_some_and(|c| c.generation == generation)
    }

    async fn set_failed(&mut self, id: usize) {
        let channel = &mut self.channels[id];
        channel.slot = Slot::Failed;
        channel.generation += 1;
        self.journal.set_channel(id, ChannelState::Failed).await;
    }

    async fn activate(&mut self, id: usize, handle: ChannelRef) {
        let channel = &mut self.channels[id];
        channel.slot = Slot::Active(Arc::clone(&handle));
        channel.generation += 1;
        let generation = channel.generation;
        let number = channel.number();

        self.journal.set_channel(id, ChannelState::Active).await;
        self.journal
            .log(
                Severity::Success,
                format!("Channel {number} logged in successfully"),
            )
            .await;

        // Disconnect watch.
        let epoch = self.epoch.clone();
        let tx = self.tx.clone();
        let watched = Arc::clone(&handle);
        tokio::spawn(async move {
            tokio::select! {
                _ = epoch.cancelled() => {}
                _ = watched.disconnected() => {
                    let _ = tx.send(PoolEvent::Disconnected { id, generation });
                }
            }
        });

        // Best-effort target lookup.
        let epoch = self.epoch.clone();
        let journal = self.journal.clone();
        let destination = Arc::clone(&self.destination);
        tokio::spawn(async move {
            let info = tokio::select! {
                _ = epoch.cancelled() => return,
                info = handle.describe_target(&destination) => info,
            };
            if let Some(info) = info {
                let name = info.name.as_deref().unwrap_or("Unknown");
                journal
                    .log(
                        Severity::Info,
                        format!("Channel {number}: target - {name} (id: {destination})"),
                    )
                    .await;
            }
        });
    }

    fn schedule_reconnect(&mut self, id: usize) {
        if self.run.is_cancelled() {
            return;
        }
        let channel = &mut self.channels[id];
        channel.reconnect_pending = true;
        let generation = channel.generation;

        let epoch = self.epoch.clone();
        let tx = self.tx.clone();
        let delay = self.timings.reconnect_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = epoch.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(PoolEvent::ReconnectDue { id, generation });
                }
            }
        });
    }

    fn spawn_login(&self, id: usize) {
        let channel = &self.channels[id];
        let generation = channel.generation;
        let credential = channel.credential.clone();

        let epoch = self.epoch.clone();
        let tx = self.tx.clone();
        let factory = Arc::clone(&self.factory);
        tokio::spawn(async move {
            tokio::select! {
                _ = epoch.cancelled() => {}
                result = factory.login(&credential) => {
                    let _ = tx.send(PoolEvent::LoginFinished { id, generation, result });
                }
            }
        });
    }
}

impl Drop for ChannelPool {
    fn drop(&mut self) {
        self.epoch.cancel();
    }
}
