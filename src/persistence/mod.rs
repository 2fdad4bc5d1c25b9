//! Persistence: snapshot schema and stores.
//!
//! Snapshots carry task metadata only. Restoring one recreates every task as
//! `Stopped(Restored)`; channels are never logged in again automatically.

mod snapshot;
mod store;

pub use snapshot::{RecordConfig, Snapshot, TaskRecord};
pub use store::{JsonFileStore, MemoryStore, SnapshotStore};
