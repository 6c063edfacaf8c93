use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::errors::BackupError;
use crate::material::Material;

mod memory;

pub use self::memory::MemoryBackupStore;
pub use self::sqlite::*;

/// A copy of the whole material list taken at one point in time.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Snapshot {
    /// When the snapshot was taken, in milliseconds since the epoch.
    /// Identifies the snapshot within its store.
    pub timestamp: i64,

    pub materials: Vec<Material>,
}

impl Snapshot {
    pub fn new(timestamp: i64, materials: Vec<Material>) -> Self {
        Snapshot {
            timestamp,
            materials,
        }
    }
}

/// A durable store of snapshots that outlives the key-value tiers.
pub trait BackupStore: Send + Sync {
    /// Stores `snapshot`, replacing any snapshot with the same timestamp.
    fn put(&self, snapshot: Snapshot) -> BoxFuture<'_, Result<(), BackupError>>;

    /// Returns every snapshot, newest first.
    fn all(&self) -> BoxFuture<'_, Result<Vec<Snapshot>, BackupError>>;

    /// Returns the timestamps of every snapshot, newest first, without
    /// decoding the snapshots.
    fn snapshot_times(&self) -> BoxFuture<'_, Result<Vec<i64>, BackupError>>;

    /// Deletes the snapshot taken at `timestamp`, if any.
    fn delete(&self, timestamp: i64) -> BoxFuture<'_, Result<(), BackupError>>;

    /// Returns the newest snapshot.
    fn latest(&self) -> BoxFuture<'_, Result<Option<Snapshot>, BackupError>> {
        async move {
            let snapshots = self.all().await?;

            Ok(snapshots.into_iter().max_by_key(|s| s.timestamp))
        }
        .boxed()
    }
}

/// Deletes all but the `retain` newest snapshots and returns how many
/// were deleted.
pub async fn prune(store: &dyn BackupStore, retain: usize) -> Result<usize, BackupError> {
    let mut timestamps = store.snapshot_times().await?;
    timestamps.sort_by(|a, b| b.cmp(a));

    let mut deleted = 0;

    for timestamp in timestamps.into_iter().skip(retain) {
        store.delete(timestamp).await?;
        deleted += 1;
    }

    Ok(deleted)
}

mod sqlite {
    use std::path::Path;

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

    use super::Snapshot;
    use crate::errors::BackupError;
    use crate::material::parse_list;

    /// A backup store kept in a SQLite database.
    pub struct SqliteBackupStore {
        pool: SqlitePool,
    }

    impl SqliteBackupStore {
        pub fn new(pool: SqlitePool) -> Self {
            SqliteBackupStore { pool }
        }

        /// Opens (creating if needed) the database at `path` and makes
        /// sure the snapshot table exists.
        pub async fn open(path: impl AsRef<Path>) -> Result<Self, BackupError> {
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await?;

            let store = SqliteBackupStore::new(pool);
            store.initialize().await?;

            Ok(store)
        }

        pub async fn initialize(&self) -> Result<(), BackupError> {
            sqlx::query(include_str!("queries/create_snapshots.sql"))
                .execute(&self.pool)
                .await?;

            Ok(())
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::BackupStore for SqliteBackupStore {
        fn put(&self, snapshot: Snapshot) -> BoxFuture<'_, Result<(), BackupError>> {
            async move {
                let timestamp = snapshot.timestamp;
                let materials = serde_json::to_string(&snapshot.materials)
                    .map_err(|source| BackupError::Serialization { timestamp, source })?;

                sqlx::query(include_str!("queries/insert_snapshot.sql"))
                    .bind(timestamp)
                    .bind(materials)
                    .execute(&self.pool)
                    .await?;

                Ok(())
            }
            .boxed()
        }

        fn all(&self) -> BoxFuture<'_, Result<Vec<Snapshot>, BackupError>> {
            async move {
                let rows: Vec<(i64, String)> =
                    sqlx::query_as(include_str!("queries/retrieve_snapshots.sql"))
                        .fetch_all(&self.pool)
                        .await?;

                rows.into_iter()
                    .map(|(timestamp, materials)| -> Result<Snapshot, BackupError> {
                        let materials = parse_list(&materials)
                            .map_err(|source| BackupError::CorruptSnapshot { timestamp, source })?;

                        Ok(Snapshot::new(timestamp, materials))
                    })
                    .collect()
            }
            .boxed()
        }

        fn snapshot_times(&self) -> BoxFuture<'_, Result<Vec<i64>, BackupError>> {
            async move {
                let rows: Vec<(i64,)> =
                    sqlx::query_as(include_str!("queries/retrieve_snapshot_times.sql"))
                        .fetch_all(&self.pool)
                        .await?;

                Ok(rows.into_iter().map(|(timestamp,)| timestamp).collect())
            }
            .boxed()
        }

        // only the newest row is decoded, so older corrupt rows cannot
        // block a restore
        fn latest(&self) -> BoxFuture<'_, Result<Option<Snapshot>, BackupError>> {
            async move {
                let row: Option<(i64, String)> =
                    sqlx::query_as(include_str!("queries/retrieve_latest_snapshot.sql"))
                        .fetch_optional(&self.pool)
                        .await?;

                match row {
                    Some((timestamp, materials)) => {
                        let materials = parse_list(&materials)
                            .map_err(|source| BackupError::CorruptSnapshot { timestamp, source })?;

                        Ok(Some(Snapshot::new(timestamp, materials)))
                    }
                    None => Ok(None),
                }
            }
            .boxed()
        }

        fn delete(&self, timestamp: i64) -> BoxFuture<'_, Result<(), BackupError>> {
            async move {
                sqlx::query(include_str!("queries/delete_snapshot.sql"))
                    .bind(timestamp)
                    .execute(&self.pool)
                    .await?;

                Ok(())
            }
            .boxed()
        }
    }
}
