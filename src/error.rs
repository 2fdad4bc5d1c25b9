//! Error types used by the dispatch engine.
//!
//! This module defines three enums:
//!
//! - [`ChannelError`] failures reported by the external channel capability
//!   (login, send, disconnect).
//! - [`ControlError`] rejections of owner control requests.
//! - [`PersistenceError`] snapshot store failures.
//!
//! Every enum provides `as_label` (stable snake_case label for logs) in the same
//! style; [`ControlError`] additionally renders into an `error` broadcast event.

use std::io;
use thiserror::Error;

use crate::tasks::{OwnerId, TaskId};

/// # Errors produced by the external channel capability.
///
/// Returned by [`ChannelFactory::login`](crate::ChannelFactory::login) and
/// [`ChannelHandle::send`](crate::ChannelHandle::send). None of them is fatal for
/// the task: login failures exclude the channel, send failures are retried and
/// eventually quarantine the channel.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The credential was rejected or the login could not complete.
    #[error("login failed: {reason}")]
    Auth {
        /// Message from the external system.
        reason: String,
    },

    /// A single delivery attempt failed.
    #[error("send failed: {reason}")]
    Send {
        /// Message from the external system.
        reason: String,
    },

    /// The external session dropped.
    #[error("channel disconnected")]
    Disconnected,
}

impl ChannelError {
    /// Shorthand for [`ChannelError::Auth`].
    pub fn auth(reason: impl Into<String>) -> Self {
        ChannelError::Auth {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ChannelError::Send`].
    pub fn send(reason: impl Into<String>) -> Self {
        ChannelError::Send {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use loopvisor::ChannelError;
    ///
    /// assert_eq!(ChannelError::auth("expired").as_label(), "channel_auth");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::Auth { .. } => "channel_auth",
            ChannelError::Send { .. } => "channel_send",
            ChannelError::Disconnected => "channel_disconnected",
        }
    }
}

/// # Errors returned by owner control requests.
///
/// A rejected request never changes engine state. The engine also publishes the
/// error as an `error` event to the requesting owner's observers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The task exists but belongs to a different owner.
    #[error("task {task} is not owned by {owner}")]
    Unauthorized {
        /// Requesting owner.
        owner: OwnerId,
        /// Task that was addressed.
        task: TaskId,
    },

    /// No owner holds a task with this id.
    #[error("task not found: {task}")]
    TaskNotFound {
        /// Task that was addressed.
        task: TaskId,
    },

    /// The owner never identified (or was swept / logged out).
    #[error("owner not identified: {owner}")]
    OwnerNotIdentified {
        /// Requesting owner.
        owner: OwnerId,
    },

    /// The message list is empty after formatting; the task stays `Idle`.
    #[error("no messages found in the input")]
    EmptySequence,

    /// The request payload is unusable.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What is wrong with the payload.
        reason: String,
    },

    /// The engine is shutting down and accepts no more work.
    #[error("engine is shutting down")]
    ShutDown,
}

impl ControlError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlError::Unauthorized { .. } => "control_unauthorized",
            ControlError::TaskNotFound { .. } => "control_task_not_found",
            ControlError::OwnerNotIdentified { .. } => "control_owner_not_identified",
            ControlError::EmptySequence => "control_empty_sequence",
            ControlError::InvalidInput { .. } => "control_invalid_input",
            ControlError::ShutDown => "control_shut_down",
        }
    }
}

/// # Errors produced by snapshot stores.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Reading or writing the backing file failed.
    #[error("snapshot io: {0}")]
    Io(#[from] io::Error),

    /// The snapshot could not be encoded or decoded.
    #[error("snapshot encoding: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PersistenceError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PersistenceError::Io(_) => "persistence_io",
            PersistenceError::Serialize(_) => "persistence_serialize",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_errors_render_for_owners() {
        let task = TaskId::new();
        let err = ControlError::TaskNotFound { task };
        assert_eq!(err.to_string(), format!("task not found: {task}"));
        assert_eq!(err.as_label(), "control_task_not_found");
    }

    #[test]
    fn persistence_wraps_serde() {
        let bad = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = PersistenceError::from(bad);
        assert_eq!(err.as_label(), "persistence_serialize");
    }
}
