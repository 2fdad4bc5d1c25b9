//! Delay and restart policies.
//!
//! This module groups the knobs that decide **how long** the engine waits
//! between attempts and **how often** a task may be restarted.
//!
//! ## Contents
//! - [`BackoffPolicy`] delay before the next attempt (first / factor / max + jitter)
//! - [`JitterPolicy`]  optional randomization of a computed delay
//! - [`RestartPolicy`] restart ceiling and delay for whole-task restarts
//!
//! ## Quick wiring
//! ```text
//! EngineConfig {
//!     send_retry: BackoffPolicy  ──► Dispatcher (retry of one message)
//!     restart:    RestartPolicy  ──► task actor (Running → Restarting → Starting)
//! }
//! ```
//!
//! ## Defaults
//! Every default is a **fixed** delay (`factor = 1.0`, `JitterPolicy::None`), so the
//! documented timings (5s retry, 10s restart) hold exactly.

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
