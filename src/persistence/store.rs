//! # Snapshot stores.
//!
//! [`SnapshotStore`] is the seam to durable storage. Two implementations ship
//! with the crate:
//! - [`JsonFileStore`]: one pretty-printed JSON file, replaced atomically
//! - [`MemoryStore`]: keeps the last snapshot in memory (tests, ephemeral runs)

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::persistence::Snapshot;

/// Durable storage for [`Snapshot`]s.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    /// Replaces the stored snapshot.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;

    /// Loads the stored snapshot; an empty one when nothing was saved yet.
    async fn load(&self) -> Result<Snapshot, PersistenceError>;
}

/// Snapshot kept in a single JSON file.
///
/// Writes go to a fresh `<path>.<n>.tmp` first and are renamed over the
/// target, so a crash mid-write leaves the previous snapshot intact. Saves
/// through one store (and its clones) are serialized.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    writes: Arc<tokio::sync::Mutex<()>>,
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        PathBuf::from(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let _write = self.writes.lock().await;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.tmp_path();
        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(
            tasks = snapshot.len(),
            path = %self.path.display(),
            "snapshot saved"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, PersistenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    /// Copy of the last saved snapshot.
    pub fn current(&self) -> Snapshot {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = snapshot.clone();
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, PersistenceError> {
        Ok(self.current())
    }
}
