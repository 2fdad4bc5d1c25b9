//! # Task lifecycle state machine.
//!
//! Pure bookkeeping: no timers, no I/O. The task actor drives it and turns every
//! returned [`Transition`] into a log entry plus a `state_changed` event.
//!
//! ```text
//!            start()             logged_in(n>0)
//!   Idle ───────────► Starting ─────────────────► Running ◄──────────┐
//!    │ empty seq        │ logged_in(0)              │ fault()         │
//!    ▼                  ▼                           ▼                 │
//!   (stays Idle)     Stopped(AllChannelsAuthFailed) Restarting ───────┘
//!                                                   │  resume()   (via Starting)
//!                                                   ▼  count > max
//!                                                 Failed(MaxRestartsExceeded)
//!
//!   stop(): any non-terminal state ──► Stopped(Requested); Stopped/Failed ──► no-op
//! ```
//!
//! ## Rules
//! - `restart_count` increments once per `fault()` and never resets.
//! - `Failed` is terminal: every input is a no-op.
//! - `stop()` is idempotent.

use serde::{Deserialize, Serialize};

use crate::policies::RestartPolicy;

/// Why a task ended up `Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// The owner (or a sweep/logout on their behalf) stopped it.
    Requested,
    /// No channel authenticated during start.
    AllChannelsAuthFailed,
    /// Recreated from a snapshot; never started in this process.
    Restored,
}

/// Why a task ended up `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MaxRestartsExceeded,
}

/// Lifecycle state of one task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "cause")]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Restarting,
    Stopped(StopCause),
    Failed(FailureReason),
}

impl LifecycleState {
    /// `true` for the states in which the task owns live channel sessions.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            LifecycleState::Starting | LifecycleState::Running | LifecycleState::Restarting
        )
    }

    /// `true` once no further transition can happen without a new task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Failed(_))
    }

    /// Short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Restarting => "restarting",
            LifecycleState::Stopped(StopCause::AllChannelsAuthFailed) => "stopped_with_error",
            LifecycleState::Stopped(_) => "stopped",
            LifecycleState::Failed(_) => "failed",
        }
    }
}

/// A state change, as reported to logs and observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// State machine for one task.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    state: LifecycleState,
    restart_count: u32,
    policy: RestartPolicy,
}

impl Lifecycle {
    /// A new machine in `Idle`.
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            state: LifecycleState::Idle,
            restart_count: 0,
            policy,
        }
    }

    /// A machine recreated from a snapshot: `Stopped(Restored)` with the saved
    /// restart count.
    pub fn restored(policy: RestartPolicy, restart_count: u32) -> Self {
        Self {
            state: LifecycleState::Stopped(StopCause::Restored),
            restart_count,
            policy,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// `Idle → Starting`. Refuses an empty sequence and leaves the state alone.
    pub fn start(&mut self, sequence_len: usize) -> Option<Transition> {
        if sequence_len == 0 || self.state != LifecycleState::Idle {
            return None;
        }
        Some(self.go(LifecycleState::Starting))
    }

    /// Result of the channel pool initialization: `Starting → Running` when at
    /// least one channel is active, `Starting → Stopped` otherwise.
    pub fn logged_in(&mut self, active: usize) -> Option<Transition> {
        if self.state != LifecycleState::Starting {
            return None;
        }
        if active > 0 {
            Some(self.go(LifecycleState::Running))
        } else {
            Some(self.go(LifecycleState::Stopped(StopCause::AllChannelsAuthFailed)))
        }
    }

    /// A scheduler fault or total channel exhaustion: `Running → Restarting`.
    ///
    /// Increments the restart counter. No-op outside `Running`.
    pub fn fault(&mut self) -> Option<Transition> {
        if self.state != LifecycleState::Running {
            return None;
        }
        self.restart_count = self.restart_count.saturating_add(1);
        Some(self.go(LifecycleState::Restarting))
    }

    /// `true` when the pending restart would exceed the ceiling.
    pub fn restart_exhausted(&self) -> bool {
        self.state == LifecycleState::Restarting && !self.policy.allows(self.restart_count)
    }

    /// End of the restart delay: `Restarting → Starting`, or
    /// `Restarting → Failed` once the ceiling is exceeded.
    pub fn resume(&mut self) -> Option<Transition> {
        if self.state != LifecycleState::Restarting {
            return None;
        }
        if self.policy.allows(self.restart_count) {
            Some(self.go(LifecycleState::Starting))
        } else {
            Some(self.go(LifecycleState::Failed(FailureReason::MaxRestartsExceeded)))
        }
    }

    /// Explicit stop. `None` when already `Stopped` or `Failed` (idempotent).
    pub fn stop(&mut self) -> Option<Transition> {
        match self.state {
            LifecycleState::Stopped(_) | LifecycleState::Failed(_) => None,
            _ => Some(self.go(LifecycleState::Stopped(StopCause::Requested))),
        }
    }

    fn go(&mut self, to: LifecycleState) -> Transition {
        let from = std::mem::replace(&mut self.state, to);
        Transition { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(max_restarts: u32) -> Lifecycle {
        let mut lc = Lifecycle::new(RestartPolicy {
            max_restarts,
            ..RestartPolicy::default()
        });
        lc.start(3).unwrap();
        lc.logged_in(1).unwrap();
        lc
    }

    #[test]
    fn empty_sequence_stays_idle() {
        let mut lc = Lifecycle::new(RestartPolicy::default());
        assert!(lc.start(0).is_none());
        assert_eq!(lc.state(), LifecycleState::Idle);
    }

    #[test]
    fn no_active_channel_stops_with_error() {
        let mut lc = Lifecycle::new(RestartPolicy::default());
        lc.start(1).unwrap();
        let t = lc.logged_in(0).unwrap();
        assert_eq!(t.to, LifecycleState::Stopped(StopCause::AllChannelsAuthFailed));
        assert_eq!(t.to.as_label(), "stopped_with_error");
    }

    #[test]
    fn restart_ceiling_reaches_terminal_failed() {
        let mut lc = running(1000);

        for n in 1..=1001u32 {
            let t = lc.fault().expect("fault while running");
            assert_eq!(t.to, LifecycleState::Restarting);
            assert_eq!(lc.restart_count(), n);

            assert_eq!(lc.restart_exhausted(), n > 1000);
            let t = lc.resume().unwrap();
            if n <= 1000 {
                assert_eq!(t.to, LifecycleState::Starting);
                lc.logged_in(1).unwrap();
            } else {
                assert_eq!(
                    t.to,
                    LifecycleState::Failed(FailureReason::MaxRestartsExceeded)
                );
            }
        }

        // 1002nd fault: already terminal.
        assert!(lc.fault().is_none());
        assert!(lc.stop().is_none());
        assert_eq!(lc.restart_count(), 1001);
        assert!(lc.state().is_terminal());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut lc = running(10);
        let t = lc.stop().unwrap();
        assert_eq!(t.from, LifecycleState::Running);
        assert!(lc.stop().is_none());
        assert_eq!(lc.state(), LifecycleState::Stopped(StopCause::Requested));
        assert!(lc.fault().is_none());
    }

    #[test]
    fn stop_during_restart_delay_wins() {
        let mut lc = running(10);
        lc.fault().unwrap();
        lc.stop().unwrap();
        assert!(lc.resume().is_none());
    }

    #[test]
    fn state_serializes_with_cause() {
        let json = serde_json::to_string(&LifecycleState::Stopped(StopCause::Restored)).unwrap();
        assert_eq!(json, r#"{"state":"stopped","cause":"restored"}"#);
    }
}
