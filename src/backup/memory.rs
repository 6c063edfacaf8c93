use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};

use crate::backup::{BackupStore, Snapshot};
use crate::errors::BackupError;
use crate::material::Material;

/// A backup store held in memory.
pub struct MemoryBackupStore {
    snapshots: RwLock<BTreeMap<i64, Vec<Material>>>,
    enabled: AtomicBool,
}

impl Default for MemoryBackupStore {
    fn default() -> Self {
        MemoryBackupStore {
            snapshots: RwLock::new(BTreeMap::new()),
            enabled: AtomicBool::new(true),
        }
    }
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Switches the store on or off. A disabled store fails every call.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Returns the stored timestamps, oldest first.
    pub fn timestamps(&self) -> Vec<i64> {
        self.snapshots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .copied()
            .collect()
    }

    fn check_enabled(&self) -> Result<(), BackupError> {
        if self.enabled.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackupError::Unavailable)
        }
    }
}

impl BackupStore for MemoryBackupStore {
    fn put(&self, snapshot: Snapshot) -> BoxFuture<'_, Result<(), BackupError>> {
        async move {
            self.check_enabled()?;

            self.snapshots
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(snapshot.timestamp, snapshot.materials);

            Ok(())
        }
        .boxed()
    }

    fn all(&self) -> BoxFuture<'_, Result<Vec<Snapshot>, BackupError>> {
        async move {
            self.check_enabled()?;

            let snapshots = self
                .snapshots
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .iter()
                .rev()
                .map(|(timestamp, materials)| Snapshot::new(*timestamp, materials.clone()))
                .collect();

            Ok(snapshots)
        }
        .boxed()
    }

    fn snapshot_times(&self) -> BoxFuture<'_, Result<Vec<i64>, BackupError>> {
        async move {
            self.check_enabled()?;

            let mut timestamps = self.timestamps();
            timestamps.reverse();

            Ok(timestamps)
        }
        .boxed()
    }

    fn delete(&self, timestamp: i64) -> BoxFuture<'_, Result<(), BackupError>> {
        async move {
            self.check_enabled()?;

            self.snapshots
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&timestamp);

            Ok(())
        }
        .boxed()
    }
}
