//! # Backoff policy for retries and restarts.
//!
//! [`BackoffPolicy`] computes the delay for the `n`-th consecutive attempt as
//! `first × factor^n`, clamped to `max`, then jittered. The engine uses it with
//! `factor = 1.0`, which yields the fixed delays the dispatch loop runs on; the
//! exponential form stays available for deployments that want it.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use loopvisor::BackoffPolicy;
//!
//! let retry = BackoffPolicy::fixed(Duration::from_secs(5));
//! assert_eq!(retry.next(0), Duration::from_secs(5));
//! assert_eq!(retry.next(9), Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Delay policy for repeated attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first repeat.
    pub first: Duration,
    /// Upper bound for any computed delay.
    pub max: Duration,
    /// Multiplicative growth factor (`1.0` = fixed delay).
    pub factor: f64,
    /// Randomization applied after clamping.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Fixed 5s delay, no jitter.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl BackoffPolicy {
    /// A constant delay with no growth and no jitter.
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Returns a copy with a different jitter policy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay for the given 0-indexed attempt.
    ///
    /// Non-finite or negative intermediate values clamp to `max`; jitter is
    /// applied to the clamped base and never fed back into later attempts.
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}
