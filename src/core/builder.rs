use std::sync::Arc;

use crate::{
    channels::ChannelFactory,
    core::{Engine, EngineConfig},
    error::PersistenceError,
    persistence::SnapshotStore,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for an [`Engine`] with optional subscribers and snapshot store.
pub struct EngineBuilder {
    cfg: EngineConfig,
    factory: Arc<dyn ChannelFactory>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl EngineBuilder {
    /// Creates a builder; `factory` performs every channel login.
    pub fn new(cfg: EngineConfig, factory: Arc<dyn ChannelFactory>) -> Self {
        Self {
            cfg,
            factory,
            subscribers: Vec::new(),
            store: None,
        }
    }

    /// Sets process-wide event subscribers.
    ///
    /// Subscribers see every event of every owner through dedicated workers
    /// with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Persists the registry to `store` and restores from it on build.
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the engine and starts its background loops.
    ///
    /// With a store configured, the stored snapshot is loaded first and its
    /// tasks are recreated as stopped records. A snapshot that cannot be read
    /// fails the build.
    pub async fn build(self) -> Result<Arc<Engine>, PersistenceError> {
        let snapshot = match &self.store {
            Some(store) => Some(store.load().await?),
            None => None,
        };

        let engine = Arc::new(Engine::new_internal(self.cfg, self.factory, self.store));
        let subs = SubscriberSet::new(self.subscribers);
        engine.spawn_background(subs);

        if let Some(snapshot) = snapshot {
            engine.restore(snapshot).await;
        }
        Ok(engine)
    }
}
