//! Engine events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish events emitted by the engine facade and the task actors.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] classification, routing scope and payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Engine` (control requests), `TaskActor` through the task
//!   `Journal` (log lines, stats, state changes).
//! - **Consumer**: the engine router, which hands every event to the scoped
//!   `Broadcaster` and to the global `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
