//! # Restart policy for dispatch tasks.
//!
//! A task whose dispatch loop faults (or whose whole channel pool is exhausted)
//! is torn down and started again after [`RestartPolicy::delay`]. Every restart
//! increments the task's restart counter; once the counter exceeds
//! [`RestartPolicy::max_restarts`] the task enters the terminal `Failed` state.
//!
//! ```text
//! restarts:  1    2   ...  max   max+1
//!            ok   ok       ok    ──► Failed(MaxRestartsExceeded)
//! ```

use std::time::Duration;

use super::BackoffPolicy;

/// Restart ceiling and delay for whole-task restarts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestartPolicy {
    /// Number of restarts a task may perform before it is terminal.
    pub max_restarts: u32,
    /// Delay between teardown and the next start.
    pub delay: BackoffPolicy,
}

impl Default for RestartPolicy {
    /// 1000 restarts, fixed 10s delay.
    fn default() -> Self {
        Self {
            max_restarts: 1000,
            delay: BackoffPolicy::fixed(Duration::from_secs(10)),
        }
    }
}

impl RestartPolicy {
    /// Returns `true` while `restart_count` is within the ceiling.
    #[inline]
    pub fn allows(&self, restart_count: u32) -> bool {
        restart_count <= self.max_restarts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_is_inclusive() {
        let policy = RestartPolicy::default();
        assert!(policy.allows(1000));
        assert!(!policy.allows(1001));
    }
}
