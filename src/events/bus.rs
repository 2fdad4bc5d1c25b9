//! # Event bus for engine events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that lets many
//! publishers (task actors, the engine facade) emit events without blocking.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                  Consumer (one):
//!   TaskActor 1 ──┐
//!   TaskActor 2 ──┼──────► Bus ───────► router ──┬──► Broadcaster   (scoped observers)
//!   TaskActor N ──┤  (broadcast chan)            └──► SubscriberSet (global subscribers)
//!   Engine      ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: a slow receiver gets `RecvError::Lagged(n)` and skips `n` events.
//! - **No persistence**: events published with no receiver are lost.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for engine events.
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers; dropped when there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
