//! # Broadcaster: owner/task-scoped fan-out to observers.
//!
//! Observers attach to one owner and optionally focus one task. Routing:
//!
//! | event                                             | delivered to                         |
//! |---------------------------------------------------|--------------------------------------|
//! | owner-scoped (`identified`, `owner_tasks_snapshot`, `error`, ...) | every observer of the owner |
//! | `task_started`, `task_stopped`, task `error`      | every observer of the owner          |
//! | other task events (`log_line`, `stats_update`, ...) | observers focused on that exact task |
//! | events without owner                              | nobody (global subscribers only)     |
//!
//! Delivery is best effort: a full observer queue drops the event, a closed
//! observer is pruned. Observers pull authoritative state (task details) after
//! reconnecting instead of relying on buffered events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};

use crate::events::{Event, EventKind};
use crate::tasks::{OwnerId, TaskId};

static OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Receiving end of a subscription, returned by
/// [`Engine::subscribe`](crate::Engine::subscribe).
///
/// Dropping it ends the subscription.
#[derive(Debug)]
pub struct Observer {
    id: u64,
    owner: OwnerId,
    rx: mpsc::Receiver<Arc<Event>>,
}

impl Observer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Next event; `None` once the engine is gone.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }
}

struct Subscription {
    id: u64,
    owner: OwnerId,
    task: Option<TaskId>,
    tx: mpsc::Sender<Arc<Event>>,
}

impl Subscription {
    fn wants(&self, ev: &Event) -> bool {
        if ev.owner.as_ref() != Some(&self.owner) {
            return false;
        }
        if ev.is_owner_scoped() || owner_wide(ev.kind) {
            return true;
        }
        self.task == ev.task
    }
}

fn owner_wide(kind: EventKind) -> bool {
    matches!(
        kind,
        EventKind::TaskStarted | EventKind::TaskStopped | EventKind::Error
    )
}

/// Registry of live observers.
pub(crate) struct Broadcaster {
    subs: RwLock<Vec<Subscription>>,
    queue: usize,
}

impl Broadcaster {
    pub fn new(queue: usize) -> Self {
        Self {
            subs: RwLock::new(Vec::new()),
            queue: queue.max(1),
        }
    }

    pub async fn subscribe(&self, owner: OwnerId, task: Option<TaskId>) -> Observer {
        let id = OBSERVER_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue);
        self.subs.write().await.push(Subscription {
            id,
            owner: owner.clone(),
            task,
            tx,
        });
        Observer { id, owner, rx }
    }

    /// Changes the task an observer follows. `false` for unknown observers.
    pub async fn focus(&self, observer: u64, task: Option<TaskId>) -> bool {
        let mut subs = self.subs.write().await;
        match subs.iter_mut().find(|s| s.id == observer) {
            Some(s) => {
                s.task = task;
                true
            }
            None => false,
        }
    }

    /// Ends every subscription of `owner`; their `recv` returns `None` once
    /// drained. Returns how many were dropped.
    pub async fn drop_owner(&self, owner: &OwnerId) -> usize {
        let mut subs = self.subs.write().await;
        let before = subs.len();
        subs.retain(|s| &s.owner != owner);
        before - subs.len()
    }

    /// Routes one event to the observers that want it.
    pub async fn deliver(&self, ev: &Event) {
        if ev.owner.is_none() {
            return;
        }
        let mut closed = Vec::new();
        {
            let subs = self.subs.read().await;
            let mut shared: Option<Arc<Event>> = None;
            for s in subs.iter().filter(|s| s.wants(ev)) {
                let ev = shared.get_or_insert_with(|| Arc::new(ev.clone()));
                match s.tx.try_send(Arc::clone(ev)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!(observer = s.id, seq = ev.seq, "observer lagging, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(s.id),
                }
            }
        }
        if !closed.is_empty() {
            self.subs.write().await.retain(|s| !closed.contains(&s.id));
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.subs.read().await.len()
    }
}
