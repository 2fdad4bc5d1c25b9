//! # loopvisor
//!
//! **Loopvisor** is a multi-owner engine that runs looping message-dispatch
//! tasks over pools of authenticated channels.
//!
//! Each task logs a set of credentials into channels (serially, staggered),
//! then walks its message sequence forever: every message goes to the next
//! healthy channel in round-robin order, failed sends are retried on the same
//! channel, broken channels are reconnected in the background and the whole
//! task restarts (up to a ceiling) when it cannot make progress. Owners
//! control their tasks through the [`Engine`] and watch them through
//! [`Observer`] event streams.
//!
//! ## Architecture
//! ```text
//!  owner requests ──► Engine ──► Registry (owners → tasks, one lock)
//!                       │
//!                       └──► DispatchTask::start ──► TaskActor (one per task)
//!                                                     ├─ ChannelPool    (logins, reconnects)
//!                                                     ├─ Dispatcher     (round-robin, retries)
//!                                                     └─ LoopScheduler  (cursor, loops)
//!
//!  TaskActor / Engine ── publish ──► Bus ──► router ──┬──► Broadcaster ──► Observer (owner, task)
//!                                                     └──► SubscriberSet ──► Subscribe impls
//!
//!  Registry ──► SnapshotStore   (on membership change, periodically, on shutdown)
//! ```
//!
//! ### Task lifecycle
//! ```text
//! Idle ──► Starting ──► Running ⇄ Restarting ──► Failed        (restart ceiling exceeded)
//!             │            │
//!             │            └──► Stopped(requested)
//!             └──► Stopped(all channels failed to authenticate)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                        |
//! |-------------------|--------------------------------------------------------------|-------------------------------------------|
//! | **Control**       | Identify owners, start/stop tasks, read details.             | [`Engine`], [`EngineBuilder`]             |
//! | **Channels**      | Plug in the external system that logs in and delivers.       | [`ChannelFactory`], [`ChannelHandle`]     |
//! | **Observation**   | Owner/task-scoped event streams and global subscribers.      | [`Observer`], [`Subscribe`], [`Event`]    |
//! | **Persistence**   | Task metadata snapshots, restored as stopped records.        | [`SnapshotStore`], [`JsonFileStore`]      |
//! | **Policies**      | Retry and restart delays, restart ceiling.                   | [`BackoffPolicy`], [`RestartPolicy`]      |
//! | **Errors**        | Typed errors for channels, control requests and storage.    | [`ChannelError`], [`ControlError`]        |
//! | **Configuration** | Centralized timings and capacities.                          | [`EngineConfig`]                          |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], a subscriber forwarding every
//!   event to `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use loopvisor::{
//!     ChannelError, ChannelFactory, ChannelHandle, ChannelRef, Credential, Engine,
//!     EngineConfig, EventKind, OwnerId, TaskInputs,
//! };
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ChannelHandle for Echo {
//!     async fn send(&self, destination: &str, message: &str) -> Result<(), ChannelError> {
//!         println!("{destination} <- {message}");
//!         Ok(())
//!     }
//! }
//!
//! struct EchoFactory;
//!
//! #[async_trait]
//! impl ChannelFactory for EchoFactory {
//!     async fn login(&self, _credential: &Credential) -> Result<ChannelRef, ChannelError> {
//!         Ok(Arc::new(Echo))
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder(EngineConfig::default(), Arc::new(EchoFactory))
//!         .build()
//!         .await?;
//!
//!     let owner = OwnerId::from("alice");
//!     let mut events = engine.subscribe(&owner, None).await;
//!     engine.identify(&owner).await?;
//!
//!     let task = engine
//!         .start_task(
//!             &owner,
//!             TaskInputs {
//!                 credentials: "token-1\ntoken-2".into(),
//!                 messages: "hello\nworld".into(),
//!                 destination: "room-42".into(),
//!                 ..TaskInputs::default()
//!             },
//!         )
//!         .await?;
//!
//!     while let Some(ev) = events.recv().await {
//!         if ev.kind == EventKind::TaskStarted {
//!             assert_eq!(ev.task, Some(task));
//!             break;
//!         }
//!     }
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod channels;
mod core;
mod dispatch;
mod error;
mod events;
mod persistence;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use channels::{ChannelFactory, ChannelHandle, ChannelRef, ChannelState, TargetInfo};
pub use core::{Engine, EngineBuilder, EngineConfig};
pub use dispatch::{Advance, LoopScheduler};
pub use error::{ChannelError, ControlError, PersistenceError};
pub use events::{Bus, Event, EventKind};
pub use persistence::{
    JsonFileStore, MemoryStore, RecordConfig, Snapshot, SnapshotStore, TaskRecord,
};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use subscribers::{Observer, Subscribe, SubscriberSet};
pub use tasks::{
    ChannelReport, Credential, DETAILS_LOG_ENTRIES, DispatchTask, FailureReason, Lifecycle,
    LifecycleState, LogEntry, LogRing, OwnerId, Severity, StatsUpdate, StopCause, TaskDetails,
    TaskId, TaskInputs, TaskStats, TaskSummary, Transition,
};

// Optional: a built-in subscriber forwarding events to `tracing`.
// Enabled by default; disable with `default-features = false`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
