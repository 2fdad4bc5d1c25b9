//! One channel of a pool: credential, health and usage.

use serde::{Deserialize, Serialize};

use crate::channels::ChannelRef;
use crate::tasks::Credential;

/// Health of a channel, as reported to observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    LoggingIn,
    Active,
    Failed,
}

/// Session slot. Only `Active` carries a handle, so the dispatcher never sees a
/// missing one.
#[derive(Clone, Default)]
pub(crate) enum Slot {
    #[default]
    LoggingIn,
    Active(ChannelRef),
    Failed,
}

impl Slot {
    pub(crate) fn state(&self) -> ChannelState {
        match self {
            Slot::LoggingIn => ChannelState::LoggingIn,
            Slot::Active(_) => ChannelState::Active,
            Slot::Failed => ChannelState::Failed,
        }
    }
}

/// A channel owned by a [`ChannelPool`](super::ChannelPool).
pub(crate) struct Channel {
    /// Index within the task's channel list.
    pub id: usize,
    pub credential: Credential,
    pub slot: Slot,
    /// Round-robin selections attributed to this channel.
    pub usage: u64,
    /// Bumped on every entry into `Active` or `Failed`; stale pool events carry
    /// an older value and are ignored.
    pub generation: u64,
    /// A reconnection is scheduled or in flight.
    pub reconnect_pending: bool,
}

impl Channel {
    pub fn new(id: usize, credential: Credential) -> Self {
        Self {
            id,
            credential,
            slot: Slot::LoggingIn,
            usage: 0,
            generation: 0,
            reconnect_pending: false,
        }
    }

    /// 1-based number used in log lines.
    pub fn number(&self) -> usize {
        self.id + 1
    }

    pub fn is_active(&self) -> bool {
        matches!(self.slot, Slot::Active(_))
    }

    pub fn handle(&self) -> Option<&ChannelRef> {
        match &self.slot {
            Slot::Active(handle) => Some(handle),
            _ => None,
        }
    }
}
