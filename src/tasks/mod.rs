//! # Dispatch tasks and their state.
//!
//! - [`DispatchTask`]: one owner's looping job; control entry points and readers
//! - [`TaskInputs`], [`Credential`]: what the owner submitted
//! - [`Lifecycle`], [`LifecycleState`]: the state machine with the restart ceiling
//! - [`TaskStats`], [`LogRing`]: counters and the bounded log history
//! - [`TaskSummary`], [`TaskDetails`]: read models served to observers
//!
//! All mutable state of a task sits behind one lock shared by the task handle
//! and its actor; `Journal` is the only way to change it and publishes an event
//! for every change.

mod id;
mod inputs;
mod journal;
mod lifecycle;
mod log;
mod report;
mod stats;
mod task;

pub use id::{OwnerId, TaskId};
pub use inputs::{Credential, TaskInputs};
pub use lifecycle::{FailureReason, Lifecycle, LifecycleState, StopCause, Transition};
pub use log::{LogEntry, LogRing, Severity};
pub use report::{ChannelReport, DETAILS_LOG_ENTRIES, TaskDetails, TaskSummary};
pub use stats::{StatsUpdate, TaskStats};
pub use task::DispatchTask;

pub(crate) use journal::{Journal, TaskShared};

#[cfg(test)]
pub(crate) use journal::testing;
