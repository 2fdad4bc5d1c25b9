//! # Engine configuration.
//!
//! Provides [`EngineConfig`], the centralized timing and capacity settings of the
//! dispatch engine. Every task started by an engine copies the values it needs
//! at start time; changing the config later does not affect running tasks.
//!
//! ## Sentinel values
//! - `snapshot_interval = 0s` → no periodic snapshots (membership changes still persist)
//! - `watchdog_interval = 0s` → stall watchdog disabled
//! - `sweep_interval = 0s` → inactivity sweeper disabled
//! - `grace = 0s` → shutdown does not wait for actors

use std::time::Duration;

use crate::policies::{BackoffPolicy, RestartPolicy};

/// Configuration of an [`Engine`](crate::Engine).
///
/// ## Field semantics
/// - `send_delay`: pause between resolved sends; a task's `delay_seconds`
///   overrides it when non-zero
/// - `max_send_retries`: retries per message after the first attempt
/// - `send_retry`: delay between retries of one message
/// - `login_stagger`: channel `i` logs in no earlier than `i × login_stagger`
/// - `reconnect_delay`: wait before re-login of a failed channel
/// - `idle_wait`: wait when no channel is `Active`
/// - `restart`: whole-task restart ceiling and delay
/// - `log_capacity`: per-task log ring size
/// - `bus_capacity`: internal event bus size (min 1)
/// - `observer_queue`: per-observer queue size (min 1)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub send_delay: Duration,
    pub max_send_retries: u32,
    pub send_retry: BackoffPolicy,
    pub login_stagger: Duration,
    pub reconnect_delay: Duration,
    pub idle_wait: Duration,
    pub restart: RestartPolicy,
    pub log_capacity: usize,
    pub bus_capacity: usize,
    pub observer_queue: usize,

    /// Owners idle longer than this are swept with all their tasks.
    pub owner_ttl: Duration,
    pub sweep_interval: Duration,

    /// Period of the background snapshot.
    pub snapshot_interval: Duration,

    /// A running task with no recorded activity for this long is restarted.
    pub stall_timeout: Duration,
    pub watchdog_interval: Duration,

    /// Maximum time [`Engine::shutdown`](crate::Engine::shutdown) waits for
    /// task actors to exit.
    pub grace: Duration,
}

impl EngineConfig {
    /// Send delay of a task requesting `delay_seconds` (0 = engine default).
    #[inline]
    pub fn send_delay_for(&self, delay_seconds: u64) -> Duration {
        if delay_seconds == 0 {
            self.send_delay
        } else {
            Duration::from_secs(delay_seconds)
        }
    }

    /// How long a running task with `delay_seconds` may go without activity
    /// before the watchdog restarts it.
    ///
    /// At least `stall_timeout`, and never shorter than one pause plus a full
    /// retry cycle plus one idle wait.
    pub fn stall_limit_for(&self, delay_seconds: u64) -> Duration {
        let retries = self.send_retry.max.saturating_mul(self.max_send_retries);
        self.send_delay_for(delay_seconds)
            .saturating_add(retries)
            .saturating_add(self.idle_wait)
            .max(self.stall_timeout)
    }

    #[inline]
    pub fn snapshot_every(&self) -> Option<Duration> {
        non_zero(self.snapshot_interval)
    }

    #[inline]
    pub fn watchdog_every(&self) -> Option<Duration> {
        non_zero(self.watchdog_interval)
    }

    #[inline]
    pub fn sweep_every(&self) -> Option<Duration> {
        non_zero(self.sweep_interval)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d.is_zero() { None } else { Some(d) }
}

impl Default for EngineConfig {
    /// Default configuration:
    ///
    /// - sends every 5s, 10 retries 5s apart
    /// - logins staggered by 2s, reconnect after 30s, idle wait 10s
    /// - at most 1000 restarts, 10s apart
    /// - 100 log entries per task, bus of 1024 events
    /// - owners swept after 1h of inactivity (checked every 5min)
    /// - snapshots every 60s
    /// - stalled tasks (10min without activity) restarted, checked every 60s
    /// - 10s shutdown grace
    fn default() -> Self {
        Self {
            send_delay: Duration::from_secs(5),
            max_send_retries: 10,
            send_retry: BackoffPolicy::fixed(Duration::from_secs(5)),
            login_stagger: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(30),
            idle_wait: Duration::from_secs(10),
            restart: RestartPolicy::default(),
            log_capacity: 100,
            bus_capacity: 1024,
            observer_queue: 256,
            owner_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            snapshot_interval: Duration::from_secs(60),
            stall_timeout: Duration::from_secs(10 * 60),
            watchdog_interval: Duration::from_secs(60),
            grace: Duration::from_secs(10),
        }
    }
}
