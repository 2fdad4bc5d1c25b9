//! # Built-in subscribers
//!
//! - [`LogWriter`]: forwards every event to `tracing` (feature `logging`).

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
