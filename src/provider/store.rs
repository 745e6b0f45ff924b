//! Abstract persistence for the last-known-good snapshot.
//!
//! The backend is swappable; both operations are best-effort and never
//! raise. A store failure only costs durability, not availability.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::ConfigSnapshot;

/// Best-effort persistence of one snapshot blob.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the persisted snapshot, if one exists and decodes.
    async fn try_load(&self) -> Option<ConfigSnapshot>;

    /// Persist the snapshot; `false` on any failure.
    async fn try_store(&self, snapshot: &ConfigSnapshot) -> bool;
}

/// In-memory store for tests and hosts that opt out of persistence.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<ConfigSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        MemorySnapshotStore::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn try_load(&self) -> Option<ConfigSnapshot> {
        self.slot.lock().await.clone()
    }

    async fn try_store(&self, snapshot: &ConfigSnapshot) -> bool {
        *self.slot.lock().await = Some(snapshot.clone());
        true
    }
}

/// Single-file JSON store. The blob is small enough that synchronous I/O
/// inside the async call is fine.
#[derive(Debug)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSnapshotStore { path: path.into() }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn try_load(&self) -> Option<ConfigSnapshot> {
        let bytes = std::fs::read(&self.path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn try_store(&self, snapshot: &ConfigSnapshot) -> bool {
        let Ok(bytes) = serde_json::to_vec(snapshot) else {
            return false;
        };
        std::fs::write(&self.path, bytes).is_ok()
    }
}
