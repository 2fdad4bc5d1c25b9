//! # TaskActor: the run loop of one dispatch task.
//!
//! The actor owns everything a run mutates (channel pool, dispatcher, loop
//! cursor) and is the only writer of run results. It stops at safe points when
//! the run token is cancelled.
//!
//! ## Architecture
//! ```text
//! DispatchTask::start() ──► TaskActor::run()
//!
//! loop {
//!   ├─► pool.initialize()            (staggered logins)
//!   │     └─► logged_in(active)      0 active ──► Stopped(AllChannelsAuthFailed), exit
//!   ├─► dispatch loop (Running)
//!   │     ├─► select_next()          none ──► idle wait, exhausted? ──► restart
//!   │     ├─► send_with_retry()      panic / stall kick ──► restart
//!   │     ├─► commit sent|failed, advance cursor, stats_update
//!   │     └─► pause(send_delay)      (pool events handled while waiting)
//!   └─► restart
//!         ├─► pool.clear(), fault()  restart_count += 1
//!         ├─► sleep(restart delay)
//!         └─► resume()               over the ceiling ──► Failed, exit
//! }
//! ```
//!
//! ## Rules
//! - Sends are strictly sequential; the cursor advances once per resolved send.
//! - Results are committed only while the run token is live.
//! - The loop cursor survives restarts; the channel pool does not.
//! - A restart kick that was not consumed by the run it targeted is discarded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::channels::{ChannelFactory, ChannelPool, PoolTimings};
use crate::core::EngineConfig;
use crate::dispatch::{Delivery, Dispatcher, Interrupts, LoopScheduler, SendOutcome};
use crate::events::EventKind;
use crate::policies::RestartPolicy;
use crate::tasks::{DispatchTask, Journal, LifecycleState, Severity, StopCause};

/// Why the dispatch loop returned.
enum Exit {
    Cancelled,
    Fault(String),
    Exhausted,
}

/// How a pause ended.
enum Pause {
    Elapsed,
    Cancelled,
    Kicked,
}

/// Runs one dispatch task until it is stopped, fails to log in or exceeds
/// its restart ceiling.
pub struct TaskActor {
    pool: ChannelPool,
    dispatcher: Dispatcher,
    scheduler: LoopScheduler,
    messages: Arc<[String]>,
    destination: Arc<str>,
    send_delay: Duration,
    idle_wait: Duration,
    restart: RestartPolicy,
    token: CancellationToken,
    kick: Arc<Notify>,
    journal: Journal,
}

impl TaskActor {
    pub(crate) fn new(
        task: &DispatchTask,
        factory: Arc<dyn ChannelFactory>,
        cfg: &EngineConfig,
        token: CancellationToken,
    ) -> Self {
        let destination: Arc<str> = Arc::from(task.inputs().destination.trim());
        let journal = task.journal().clone();
        let pool = ChannelPool::new(
            factory,
            task.credentials(),
            Arc::clone(&destination),
            PoolTimings {
                login_stagger: cfg.login_stagger,
                reconnect_delay: cfg.reconnect_delay,
            },
            token.clone(),
            journal.clone(),
        );

        Self {
            pool,
            dispatcher: Dispatcher::new(cfg.max_send_retries, cfg.send_retry),
            scheduler: LoopScheduler::new(task.messages().len()),
            messages: Arc::clone(task.messages()),
            destination,
            send_delay: cfg.send_delay_for(task.inputs().delay_seconds),
            idle_wait: cfg.idle_wait,
            restart: cfg.restart,
            token,
            kick: Arc::clone(task.kick()),
            journal,
        }
    }

    /// Runs the actor to completion.
    pub async fn run(mut self) {
        let owner = self.journal.owner().clone();
        let task = self.journal.task();
        tracing::debug!(%owner, %task, "actor started");

        loop {
            if !self.start_run().await {
                break;
            }

            match self.dispatch().await {
                Exit::Cancelled => break,
                Exit::Fault(reason) => {
                    self.journal
                        .log(Severity::Error, format!("Error in message scheduler: {reason}"))
                        .await;
                }
                Exit::Exhausted => {
                    self.journal
                        .log(Severity::Error, "All channels failed")
                        .await;
                }
            }

            if !self.restart().await {
                break;
            }
        }

        tracing::debug!(%owner, %task, "actor exited");
    }

    /// Logs the pool in and moves `Starting` to `Running` or `Stopped`.
    async fn start_run(&mut self) -> bool {
        let report = self.pool.initialize().await;
        if self.token.is_cancelled() {
            return false;
        }

        match self.journal.transition(|lc| lc.logged_in(report.active)).await {
            Some(t) if t.to == LifecycleState::Running => {
                self.journal
                    .log(
                        Severity::Info,
                        format!(
                            "Starting message sending with {} active channels ({} rejected)",
                            self.pool.active_ids().len(),
                            report.results.iter().filter(|r| r.is_err()).count()
                        ),
                    )
                    .await;
                true
            }
            Some(_) => {
                self.journal
                    .log(Severity::Error, "No channel could log in")
                    .await;
                self.journal.publish(
                    self.journal
                        .event(EventKind::TaskStopped)
                        .with_state(LifecycleState::Stopped(StopCause::AllChannelsAuthFailed))
                        .with_message("all channels failed to authenticate")
                        .with_severity(Severity::Error),
                );
                false
            }
            None => false,
        }
    }

    async fn dispatch(&mut self) -> Exit {
        let total = self.messages.len();

        loop {
            let Some((channel, handle)) = self.dispatcher.select_next(&mut self.pool) else {
                self.journal
                    .log(
                        Severity::Warning,
                        format!(
                            "No active channel available, retrying in {}s...",
                            self.idle_wait.as_secs()
                        ),
                    )
                    .await;
                match self.pause(self.idle_wait).await {
                    Pause::Cancelled => return Exit::Cancelled,
                    Pause::Kicked => return Exit::Fault("stalled while idle".into()),
                    Pause::Elapsed => {}
                }
                if self.pool.is_exhausted() {
                    return Exit::Exhausted;
                }
                continue;
            };

            let position = self.scheduler.current();
            let outcome = self
                .dispatcher
                .send_with_retry(
                    Delivery {
                        channel,
                        handle,
                        destination: &self.destination,
                        message: &self.messages[position],
                        position,
                        total,
                    },
                    Interrupts {
                        token: &self.token,
                        kick: &self.kick,
                    },
                    &self.journal,
                )
                .await;

            let sent = match outcome {
                SendOutcome::Cancelled => return Exit::Cancelled,
                SendOutcome::Fault(reason) => return Exit::Fault(reason),
                SendOutcome::Sent { .. } => true,
                SendOutcome::Abandoned { .. } => {
                    self.pool.mark_failed(channel).await;
                    false
                }
            };

            let advance = self.scheduler.advance();
            let loops = self.scheduler.loops();
            let journal = &self.journal;
            let committed = journal
                .commit(&self.token, |shared| {
                    shared.stats.record_usage(channel);
                    if sent {
                        shared.stats.sent += 1;
                        shared.stats.last_success = Some(Utc::now());
                    } else {
                        shared.stats.failed += 1;
                    }
                    shared.cursor = advance.next;
                    shared.stats.loops = loops;

                    if sent {
                        let current_loop = if advance.wrapped { loops } else { loops + 1 };
                        journal.log_locked(
                            shared,
                            Severity::Success,
                            format!(
                                "Channel {} | SENT | Message {}/{total} | Loop {current_loop}",
                                channel + 1,
                                position + 1,
                            ),
                        );
                    }
                    if advance.wrapped {
                        journal.log_locked(
                            shared,
                            Severity::Info,
                            format!("Loop #{loops} completed. Restarting."),
                        );
                    }
                    journal.stats_locked(shared);
                })
                .await;
            if !committed {
                return Exit::Cancelled;
            }

            match self.pause(self.send_delay).await {
                Pause::Cancelled => return Exit::Cancelled,
                Pause::Kicked => return Exit::Fault("stalled between sends".into()),
                Pause::Elapsed => {}
            }
        }
    }

    /// Tears the run down and decides whether to start over.
    async fn restart(&mut self) -> bool {
        self.pool.clear().await;
        if self.journal.transition(|lc| lc.fault()).await.is_none() {
            return false;
        }
        self.journal
            .log(Severity::Warning, "Restarting task with all channels...")
            .await;

        let (exhausted, count) = {
            let shared = self.journal.shared().lock().await;
            (
                shared.lifecycle.restart_exhausted(),
                shared.lifecycle.restart_count(),
            )
        };
        if !exhausted {
            let delay = self.restart.delay.next(count.saturating_sub(1));
            tokio::select! {
                _ = self.token.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        // A kick aimed at the torn-down run must not fault the next one.
        let _ = self.kick.notified().now_or_never();

        match self.journal.transition(|lc| lc.resume()).await {
            Some(t) if t.to == LifecycleState::Starting => true,
            Some(t) => {
                self.token.cancel();
                self.journal
                    .log(Severity::Error, "Max restarts reached - task stopped")
                    .await;
                self.journal.publish(
                    self.journal
                        .event(EventKind::TaskStopped)
                        .with_state(t.to)
                        .with_message("max restarts exceeded")
                        .with_severity(Severity::Error),
                );
                false
            }
            None => false,
        }
    }

    /// Waits `d` while applying pool events. A `d` past the clock's range
    /// waits until stopped or kicked.
    async fn pause(&mut self, d: Duration) -> Pause {
        let elapsed = tokio::time::sleep(d);
        tokio::pin!(elapsed);
        loop {
            tokio::select! {
                _ = self.token.cancelled() => return Pause::Cancelled,
                _ = self.kick.notified() => return Pause::Kicked,
                _ = &mut elapsed => return Pause::Elapsed,
                ev = self.pool.next_event() => self.pool.handle(ev).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channels::ChannelState;
    use crate::channels::testing::{FakeFactory, SendPlan};
    use crate::events::Bus;
    use crate::tasks::{FailureReason, OwnerId, TaskInputs};

    fn cfg() -> EngineConfig {
        EngineConfig {
            send_delay: Duration::from_secs(1),
            ..EngineConfig::default()
        }
    }

    fn inputs(credentials: &str, messages: &str) -> TaskInputs {
        TaskInputs {
            credentials: credentials.into(),
            messages: messages.into(),
            destination: "room".into(),
            ..TaskInputs::default()
        }
    }

    async fn spawn(
        factory: &Arc<FakeFactory>,
        credentials: &str,
        messages: &str,
        cfg: EngineConfig,
    ) -> (Arc<DispatchTask>, Bus) {
        spawn_with(factory, inputs(credentials, messages), cfg).await
    }

    async fn spawn_with(
        factory: &Arc<FakeFactory>,
        inputs: TaskInputs,
        cfg: EngineConfig,
    ) -> (Arc<DispatchTask>, Bus) {
        let bus = Bus::new(1 << 16);
        let task = Arc::new(DispatchTask::new(
            OwnerId::from("owner"),
            inputs,
            bus.clone(),
            &cfg,
        ));
        let actor = task
            .start(Arc::clone(factory) as Arc<dyn ChannelFactory>, &cfg)
            .await
            .unwrap();
        tokio::spawn(actor.run());
        (task, bus)
    }

    async fn sleep_secs(s: f64) {
        tokio::time::sleep(Duration::from_secs_f64(s)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_and_loops_follow_sends() {
        let factory = Arc::new(FakeFactory::new());
        let (task, _bus) = spawn(&factory, "a", "a\nb\nc", cfg()).await;

        // Sends at t = 0, 1, 2, 3, 4.
        sleep_secs(4.5).await;
        let d = task.details().await;
        assert_eq!((d.sent, d.cursor, d.loops), (5, 2, 1));

        sleep_secs(1.0).await;
        let d = task.details().await;
        assert_eq!((d.sent, d.cursor, d.loops), (6, 0, 2));

        let sent: Vec<String> = factory
            .deliveries()
            .into_iter()
            .map(|d| d.message.trim().to_owned())
            .collect();
        assert_eq!(sent, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn all_bad_credentials_never_run() {
        let factory = Arc::new(
            FakeFactory::new()
                .fail_login("a")
                .fail_login("b")
                .fail_login("c"),
        );
        let bus = Bus::new(1024);
        let mut rx = bus.subscribe();
        let cfg = cfg();
        let task = Arc::new(DispatchTask::new(
            OwnerId::from("owner"),
            TaskInputs {
                credentials: "a\nb\nc".into(),
                messages: "x".into(),
                destination: "room".into(),
                ..TaskInputs::default()
            },
            bus,
            &cfg,
        ));
        let actor = task
            .start(Arc::clone(&factory) as Arc<dyn ChannelFactory>, &cfg)
            .await
            .unwrap();
        tokio::spawn(actor.run());
        sleep_secs(10.0).await;

        assert_eq!(factory.logins().len(), 3);
        let d = task.details().await;
        assert_eq!(
            d.state,
            LifecycleState::Stopped(StopCause::AllChannelsAuthFailed)
        );
        assert_eq!(d.active_channels, 0);

        let mut saw_running = false;
        let mut saw_error_stop = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.state == Some(LifecycleState::Running) {
                saw_running = true;
            }
            if ev.kind == EventKind::TaskStopped && ev.severity == Some(Severity::Error) {
                saw_error_stop = true;
            }
        }
        assert!(!saw_running);
        assert!(saw_error_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_abandon_one_message() {
        let factory = Arc::new(FakeFactory::new().plan("a", SendPlan::Fail));
        let (task, _bus) = spawn(&factory, "a", "x\ny", cfg()).await;

        // Attempts at t = 0, 5, ..., 50; reconnect not before t = 80.
        sleep_secs(60.0).await;

        assert_eq!(factory.attempts("a"), 11);
        let d = task.details().await;
        assert_eq!((d.sent, d.failed), (0, 1));
        assert_eq!(d.cursor, 1);
        assert_eq!(d.channels[0].state, ChannelState::Failed);
        let abandoned = d
            .logs
            .iter()
            .filter(|l| l.message.contains("FAILED after 10 retries"))
            .count();
        assert_eq!(abandoned, 1);
        assert_eq!(d.state, LifecycleState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_sending() {
        let factory = Arc::new(FakeFactory::new());
        let (task, _bus) = spawn(&factory, "a\nb", "x", cfg()).await;

        sleep_secs(2.5).await;
        assert!(task.stop().await);
        assert!(task.stop().await);
        let sent = task.stats().await.sent;
        let delivered = factory.deliveries().len();

        sleep_secs(30.0).await;
        assert_eq!(factory.deliveries().len(), delivered);
        assert_eq!(task.stats().await.sent, sent);
        assert_eq!(task.stats().await.active_channels, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_channel_rejoins_rotation() {
        let factory = Arc::new(FakeFactory::new());
        let (task, _bus) = spawn(&factory, "a\nb", "x", cfg()).await;

        sleep_secs(2.5).await;
        factory.handle("a").unwrap().drop_session();
        sleep_secs(5.0).await;
        assert_eq!(task.stats().await.active_channels, 1);

        sleep_secs(30.0).await;
        assert_eq!(task.stats().await.active_channels, 2);
        assert_eq!(task.state().await, LifecycleState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_ceiling_ends_in_failed() {
        let factory = Arc::new(FakeFactory::new().plan("a", SendPlan::Panic));
        let (task, _bus) = spawn(&factory, "a", "x", cfg()).await;

        // Fault n happens at t = 10·(n-1); the 1001st is over the ceiling.
        sleep_secs(10_100.0).await;

        let d = task.details().await;
        assert_eq!(
            d.state,
            LifecycleState::Failed(FailureReason::MaxRestartsExceeded)
        );
        assert_eq!(d.restarts, 1001);
        assert!(!task.restart().await);
        assert!(task.stop().await);
        assert_eq!(task.details().await.restarts, 1001);
    }

    #[tokio::test(start_paused = true)]
    async fn kicked_stall_restarts_task() {
        let factory = Arc::new(FakeFactory::new().plan("a", SendPlan::Hang));
        let (task, _bus) = spawn(&factory, "a", "x", cfg()).await;

        sleep_secs(1.0).await;
        assert!(task.restart().await);
        sleep_secs(11.0).await;

        let d = task.details().await;
        assert_eq!(d.restarts, 1);
        assert_eq!(d.state, LifecycleState::Running);
        assert_eq!(factory.logins().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_exhaustion_restarts_task() {
        let factory = Arc::new(FakeFactory::new().plan("a", SendPlan::Fail));
        let (task, _bus) = spawn(&factory, "a", "x", cfg()).await;

        // Abandoned at t = 50; the reconnect at t = 80 is rejected, so the idle
        // check at t = 81 finds nothing that could come back.
        sleep_secs(20.0).await;
        factory.set_login_ok("a", false);
        sleep_secs(65.0).await;

        let d = task.details().await;
        assert_eq!(d.state, LifecycleState::Restarting);
        assert_eq!(d.restarts, 1);
        assert!(d.logs.iter().any(|l| l.message.contains("All channels failed")));
        assert_eq!(factory.logins().len(), 2);

        // The restart logs every channel in again at t = 91.
        factory.set_login_ok("a", true);
        sleep_secs(10.0).await;
        assert_eq!(factory.logins().len(), 3);
        assert_eq!(task.state().await, LifecycleState::Running);
        assert_eq!(task.details().await.restarts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_delay_keeps_actor_alive() {
        let factory = Arc::new(FakeFactory::new());
        let (task, _bus) = spawn_with(
            &factory,
            TaskInputs {
                delay_seconds: u64::MAX,
                ..inputs("a", "x\ny")
            },
            cfg(),
        )
        .await;

        sleep_secs(5.0).await;
        assert_eq!(task.stats().await.sent, 1);
        assert_eq!(task.state().await, LifecycleState::Running);

        // The actor is still there to answer a kick.
        assert!(task.restart().await);
        sleep_secs(11.0).await;
        let d = task.details().await;
        assert_eq!((d.restarts, d.sent), (1, 2));
        assert_eq!(d.state, LifecycleState::Running);
        assert_eq!(factory.logins().len(), 2);

        assert!(task.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn late_kick_does_not_fault_the_next_run() {
        let factory = Arc::new(FakeFactory::new().plan("a", SendPlan::Hang));
        let (task, _bus) = spawn(&factory, "a", "x", cfg()).await;

        sleep_secs(1.0).await;
        assert!(task.restart().await);

        // Lands while the actor sits in the restart delay.
        sleep_secs(4.0).await;
        task.kick().notify_one();

        sleep_secs(20.0).await;
        let d = task.details().await;
        assert_eq!(d.restarts, 1);
        assert_eq!(d.state, LifecycleState::Running);
        assert_eq!(factory.logins().len(), 2);
    }
}
