//! # Registry: owners and their tasks.
//!
//! The owner → task map is the only structure shared across task control
//! paths. It lives behind one `tokio::sync::RwLock`; every add, remove and
//! iteration goes through it.
//!
//! ## Rules
//! - A task id belongs to exactly one owner; a lookup from another owner is
//!   rejected as `Unauthorized`.
//! - Tasks are stopped **outside** the lock: a slow stop never blocks other
//!   owners.
//! - [`Registry::sweep_inactive`] stops swept tasks fire-and-forget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::ControlError;
use crate::tasks::{DispatchTask, OwnerId, TaskId};

/// One identified owner.
struct Owner {
    tasks: HashMap<TaskId, Arc<DispatchTask>>,
    last_activity: DateTime<Utc>,
}

impl Owner {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            tasks: HashMap::new(),
            last_activity: now,
        }
    }
}

/// Owners and their tasks.
#[derive(Default)]
pub struct Registry {
    owners: RwLock<HashMap<OwnerId, Owner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `owner` if unknown and refreshes its activity.
    ///
    /// Returns `true` when the owner was created.
    pub async fn create_or_get_owner(&self, owner: &OwnerId) -> bool {
        let now = Utc::now();
        let mut owners = self.owners.write().await;
        match owners.get_mut(owner) {
            Some(o) => {
                o.last_activity = now;
                false
            }
            None => {
                owners.insert(owner.clone(), Owner::new(now));
                true
            }
        }
    }

    /// Refreshes an owner's activity. Fails for unknown owners.
    pub async fn touch(&self, owner: &OwnerId) -> Result<(), ControlError> {
        let mut owners = self.owners.write().await;
        let o = owners
            .get_mut(owner)
            .ok_or_else(|| ControlError::OwnerNotIdentified {
                owner: owner.clone(),
            })?;
        o.last_activity = Utc::now();
        Ok(())
    }

    #[cfg(test)]
    pub async fn contains_owner(&self, owner: &OwnerId) -> bool {
        self.owners.read().await.contains_key(owner)
    }

    /// Links `task` to its owner, creating the owner when needed.
    pub async fn add_task(&self, task: Arc<DispatchTask>) -> Result<(), ControlError> {
        let mut owners = self.owners.write().await;
        let id = task.id();
        if let Some((holder, _)) = owners.iter().find(|(_, o)| o.tasks.contains_key(&id)) {
            if holder != task.owner() {
                return Err(ControlError::Unauthorized {
                    owner: task.owner().clone(),
                    task: id,
                });
            }
        }
        let owner = owners
            .entry(task.owner().clone())
            .or_insert_with(|| Owner::new(Utc::now()));
        owner.last_activity = Utc::now();
        owner.tasks.insert(id, task);
        Ok(())
    }

    /// Looks a task up on behalf of `owner`.
    pub async fn get_task(
        &self,
        owner: &OwnerId,
        task: TaskId,
    ) -> Result<Arc<DispatchTask>, ControlError> {
        let owners = self.owners.read().await;
        if let Some(t) = owners.get(owner).and_then(|o| o.tasks.get(&task)) {
            return Ok(Arc::clone(t));
        }
        if owners.values().any(|o| o.tasks.contains_key(&task)) {
            return Err(ControlError::Unauthorized {
                owner: owner.clone(),
                task,
            });
        }
        Err(ControlError::TaskNotFound { task })
    }

    /// Stops the task, then unlinks it.
    pub async fn remove_task(
        &self,
        owner: &OwnerId,
        task: TaskId,
    ) -> Result<Arc<DispatchTask>, ControlError> {
        let handle = self.get_task(owner, task).await?;
        handle.stop().await;

        let mut owners = self.owners.write().await;
        if let Some(o) = owners.get_mut(owner) {
            o.tasks.remove(&task);
        }
        Ok(handle)
    }

    /// Unlinks and stops every task of `owner`. Returns how many were stopped.
    pub async fn stop_all_tasks_for_owner(&self, owner: &OwnerId) -> usize {
        let drained: Vec<Arc<DispatchTask>> = {
            let mut owners = self.owners.write().await;
            match owners.get_mut(owner) {
                Some(o) => o.tasks.drain().map(|(_, t)| t).collect(),
                None => Vec::new(),
            }
        };
        for task in &drained {
            task.stop().await;
        }
        drained.len()
    }

    /// Removes `owner` and stops all of its tasks.
    pub async fn remove_owner(&self, owner: &OwnerId) -> usize {
        let removed = self.owners.write().await.remove(owner);
        let Some(o) = removed else {
            return 0;
        };
        let n = o.tasks.len();
        for task in o.tasks.into_values() {
            task.stop().await;
        }
        n
    }

    /// Removes owners idle for longer than `ttl`; their tasks are stopped in
    /// the background. Returns the swept owners.
    pub async fn sweep_inactive(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<OwnerId> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let swept: Vec<(OwnerId, Owner)> = {
            let mut owners = self.owners.write().await;
            let stale: Vec<OwnerId> = owners
                .iter()
                .filter(|(_, o)| now.signed_duration_since(o.last_activity) > ttl)
                .map(|(id, _)| id.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|id| owners.remove(&id).map(|o| (id, o)))
                .collect()
        };

        let mut ids = Vec::with_capacity(swept.len());
        for (id, owner) in swept {
            tracing::info!(owner = %id, tasks = owner.tasks.len(), "sweeping inactive owner");
            for task in owner.tasks.into_values() {
                tokio::spawn(async move {
                    task.stop().await;
                });
            }
            ids.push(id);
        }
        ids
    }

    /// Tasks of one owner, in no particular order.
    pub async fn tasks_of(&self, owner: &OwnerId) -> Vec<Arc<DispatchTask>> {
        self.owners
            .read()
            .await
            .get(owner)
            .map(|o| o.tasks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every task of every owner.
    pub async fn all_tasks(&self) -> Vec<Arc<DispatchTask>> {
        self.owners
            .read()
            .await
            .values()
            .flat_map(|o| o.tasks.values().cloned())
            .collect()
    }

    #[cfg(test)]
    pub async fn owner_count(&self) -> usize {
        self.owners.read().await.len()
    }

    #[cfg(test)]
    async fn backdate(&self, owner: &OwnerId, by: Duration) {
        if let Some(o) = self.owners.write().await.get_mut(owner) {
            o.last_activity -= chrono::Duration::from_std(by).unwrap();
        }
    }
}
