//! The material store synchronizer.
//!
//! Reads prefer the remote API and fall back through the primary tier,
//! the secondary tier and finally the durable backup store. Writes go to
//! both key-value tiers and are mirrored into the backup store by a
//! background worker, which runs its jobs in the order they were queued.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn, Logger};
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::sync::{mpsc, oneshot};

use crate::backup::{self, Snapshot};
use crate::environment::Environment;
use crate::errors::RemoteError;
use crate::material::{dedup_by_id, parse_list, Material, MaterialDraft};
use crate::normalization::normalize_key;
use crate::notify::{ChangeNotification, ChangeSource, RefetchObserver};
use crate::tier::{KeyValueTier, MATERIALS_KEY, TIMESTAMP_KEY};

/// How many backup snapshots to keep unless configured otherwise.
pub const DEFAULT_RETAINED_SNAPSHOTS: usize = 3;

enum BackupJob {
    Store(Snapshot),
    Restore,
    Flush(oneshot::Sender<()>),
}

/// A single read/write interface over the cached material guides.
///
/// Cloning is cheap; clones share tiers, clock and background worker.
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
    jobs: mpsc::UnboundedSender<BackupJob>,

    /// The job queue until a worker has been started inside a runtime.
    idle_jobs: Arc<Mutex<Option<mpsc::UnboundedReceiver<BackupJob>>>>,
}

struct Inner {
    environment: Environment,
    retained_snapshots: usize,

    /// The last timestamp handed out. Timestamps never repeat, so backup
    /// snapshots written within the same millisecond stay distinct.
    last_timestamp: AtomicI64,
}

impl Synchronizer {
    /// Creates a synchronizer over `environment`. Backup jobs run on the
    /// Tokio runtime the first job is queued from; jobs queued before any
    /// runtime is available are dropped with a warning.
    pub fn new(environment: Environment, retained_snapshots: usize) -> Self {
        let (jobs, receiver) = mpsc::unbounded_channel();

        Synchronizer {
            inner: Arc::new(Inner {
                environment,
                retained_snapshots,
                last_timestamp: AtomicI64::new(0),
            }),
            jobs,
            idle_jobs: Arc::new(Mutex::new(Some(receiver))),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.inner.environment
    }

    /// Returns every material, preferring the remote API. Never fails:
    /// when nothing can be read, the result is empty, and a restore from
    /// the backup store may already be on its way.
    pub async fn list_materials(&self) -> Vec<Material> {
        let logger = self.inner.logger();

        match self.inner.environment.remote.list().await {
            Ok(materials) if !materials.is_empty() => {
                let materials = dedup_by_id(materials);
                debug!(logger, "Caching remote materials"; "count" => materials.len());

                let (_, written) = self.inner.write_tiers(&materials);

                if !written {
                    warn!(logger, "No tier accepted the remote materials");
                }

                return materials;
            }
            Ok(_) => {
                info!(logger, "Remote API returned no materials, reading local tiers");
            }
            Err(e) => {
                info!(logger, "Remote API unavailable, reading local tiers"; "error" => %e);
            }
        }

        self.list_local()
    }

    /// Returns every material from the local tiers alone.
    pub fn list_local(&self) -> Vec<Material> {
        let inner = &self.inner;
        let logger = inner.logger();
        let primary = &*inner.environment.primary;
        let secondary = &*inner.environment.secondary;

        if let Some(materials) = inner.read_tier(primary).filter(|m| !m.is_empty()) {
            if let Some(payload) = inner.serialize(&materials) {
                inner.write_tier(secondary, &payload, inner.next_timestamp());
            }

            return materials;
        }

        if let Some(materials) = inner.read_tier(secondary).filter(|m| !m.is_empty()) {
            info!(logger, "Serving materials from the secondary tier"; "count" => materials.len());

            if let Some(payload) = inner.serialize(&materials) {
                let timestamp = inner.next_timestamp();

                if inner.write_tier(primary, &payload, timestamp) {
                    inner.publish(timestamp, materials.len(), ChangeSource::Fallback);
                }
            }

            return materials;
        }

        if inner.environment.backup.is_some() {
            debug!(logger, "Local tiers empty, scheduling restore from backup");
            self.enqueue(BackupJob::Restore);
        }

        Vec::new()
    }

    /// Returns the material with the given ID, if any.
    pub async fn get_material_by_id(&self, id: &str) -> Option<Material> {
        let id = normalize_key(id);

        self.list_materials()
            .await
            .into_iter()
            .find(|material| material.id == id)
    }

    /// Merges `draft` into the cached list and writes the result to every
    /// tier. Returns `false` if the draft has no ID or no tier accepted
    /// the write.
    pub fn save_material(&self, draft: MaterialDraft) -> bool {
        let logger = self.inner.logger();

        let id = match draft.id() {
            Some(id) => id.to_owned(),
            None => {
                warn!(logger, "Rejecting material without an ID");
                return false;
            }
        };

        let mut materials = self.inner.read_local().unwrap_or_default();
        let position = materials.iter().position(|material| material.id == id);

        let material = match draft.into_material(position.map(|i| &materials[i])) {
            Ok(material) => material,
            Err(e) => {
                warn!(logger, "Rejecting material"; "error" => %e);
                return false;
            }
        };

        match position {
            Some(i) => materials[i] = material,
            None => materials.push(material),
        }

        self.commit(materials, ChangeSource::Save)
    }

    /// Removes the material with the given ID from every tier. Removing
    /// an ID that is not cached still rewrites the list unchanged.
    pub fn delete_material(&self, id: &str) -> bool {
        let id = normalize_key(id);

        let materials = self.inner.read_local().unwrap_or_default();
        let before = materials.len();

        let remaining: Vec<_> = materials
            .into_iter()
            .filter(|material| material.id != id)
            .collect();

        if remaining.len() == before {
            debug!(self.inner.logger(), "Material to delete is not cached"; "id" => &id);
        }

        self.commit(remaining, ChangeSource::Delete)
    }

    /// Replaces the cached list with `materials`, dropping repeated IDs.
    pub fn mirror_materials(&self, materials: Vec<Material>, source: ChangeSource) -> bool {
        self.commit(materials, source)
    }

    /// Fetches the remote list and caches it. Unlike `list_materials`,
    /// remote failures are returned.
    pub async fn refresh(&self) -> Result<Vec<Material>, RemoteError> {
        let materials = self.inner.environment.remote.list().await?;

        if materials.is_empty() {
            info!(self.inner.logger(), "Remote API returned no materials, keeping local tiers");
            return Ok(materials);
        }

        let materials = dedup_by_id(materials);
        self.commit(materials.clone(), ChangeSource::Sync);

        Ok(materials)
    }

    /// Saves `draft` through the remote API and caches what the API
    /// stored. Partial drafts are completed from the cached entry first.
    pub async fn push_material(&self, draft: MaterialDraft) -> Result<bool, RemoteError> {
        let id = match draft.id() {
            Some(id) => id.to_owned(),
            None => {
                warn!(self.inner.logger(), "Rejecting material without an ID");
                return Ok(false);
            }
        };

        let existing = self
            .inner
            .read_local()
            .unwrap_or_default()
            .into_iter()
            .find(|material| material.id == id);

        let material = match draft.into_material(existing.as_ref()) {
            Ok(material) => material,
            Err(_) => return Ok(false),
        };

        let stored = self.inner.environment.remote.save(material).await?;

        Ok(self.save_material(stored.into()))
    }

    /// Deletes a material through the remote API, then locally.
    pub async fn remove_material(&self, id: &str) -> Result<bool, RemoteError> {
        let id = normalize_key(id);

        self.inner.environment.remote.delete(&id).await?;

        Ok(self.delete_material(&id))
    }

    /// Returns when the cached list was last written.
    pub fn last_written_at(&self) -> Option<i64> {
        let read = |tier: &dyn KeyValueTier| {
            tier.get(TIMESTAMP_KEY)
                .ok()
                .flatten()
                .and_then(|raw| raw.trim().parse().ok())
        };

        read(&*self.inner.environment.primary).or_else(|| read(&*self.inner.environment.secondary))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.inner.environment.notifier.subscribe()
    }

    pub fn observer(&self) -> RefetchObserver {
        RefetchObserver::new(self.subscribe())
    }

    /// Waits until every backup job queued so far has finished.
    pub async fn settle(&self) {
        if self.inner.environment.backup.is_none() {
            return;
        }

        let (done, finished) = oneshot::channel();

        if self.enqueue(BackupJob::Flush(done)) {
            let _ = finished.await;
        }
    }

    fn commit(&self, materials: Vec<Material>, source: ChangeSource) -> bool {
        let materials = dedup_by_id(materials);
        let count = materials.len();
        let (timestamp, written) = self.inner.write_tiers(&materials);

        if self.inner.environment.backup.is_some() {
            self.enqueue(BackupJob::Store(Snapshot::new(timestamp, materials)));
        }

        if written {
            self.inner.publish(timestamp, count, source);
        } else {
            warn!(self.inner.logger(), "No tier accepted the write"; "source" => source.as_str());
        }

        written
    }

    fn enqueue(&self, job: BackupJob) -> bool {
        if !self.start_worker() {
            warn!(self.inner.logger(), "No runtime for the backup worker, dropping job");
            return false;
        }

        if self.jobs.send(job).is_err() {
            warn!(self.inner.logger(), "Backup worker is gone, dropping job");
            return false;
        }

        true
    }

    /// Starts the backup worker on the current runtime, once. Returns
    /// whether a worker is running.
    fn start_worker(&self) -> bool {
        let mut idle_jobs = self
            .idle_jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let receiver = match idle_jobs.take() {
            Some(receiver) => receiver,
            None => return true,
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_backup_jobs(self.inner.clone(), receiver));
                true
            }
            Err(_) => {
                *idle_jobs = Some(receiver);
                false
            }
        }
    }
}

async fn run_backup_jobs(inner: Arc<Inner>, mut jobs: mpsc::UnboundedReceiver<BackupJob>) {
    while let Some(job) = jobs.recv().await {
        match job {
            BackupJob::Store(snapshot) => inner.store_snapshot(snapshot).await,
            BackupJob::Restore => inner.restore_from_backup().await,
            BackupJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

impl Inner {
    fn logger(&self) -> &Logger {
        &self.environment.logger
    }

    fn next_timestamp(&self) -> i64 {
        let now = now_millis();
        let mut last = self.last_timestamp.load(Ordering::SeqCst);

        loop {
            let next = if now > last { now } else { last + 1 };

            match self
                .last_timestamp
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    fn serialize(&self, materials: &[Material]) -> Option<String> {
        match serde_json::to_string(materials) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(self.logger(), "Unable to serialize materials"; "error" => %e);
                None
            }
        }
    }

    /// Reads the list stored in `tier`. Faults and malformed payloads
    /// count as no list.
    fn read_tier(&self, tier: &dyn KeyValueTier) -> Option<Vec<Material>> {
        let raw = match tier.get(MATERIALS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(self.logger(), "Unable to read tier"; "tier" => tier.name(), "error" => %e);
                return None;
            }
        };

        match parse_list(&raw) {
            Ok(materials) => Some(materials),
            Err(e) => {
                warn!(self.logger(), "Ignoring malformed cached list"; "tier" => tier.name(), "error" => %e);
                None
            }
        }
    }

    fn read_local(&self) -> Option<Vec<Material>> {
        self.read_tier(&*self.environment.primary)
            .or_else(|| self.read_tier(&*self.environment.secondary))
    }

    fn has_local_materials(&self) -> bool {
        let non_empty = |tier: &dyn KeyValueTier| {
            self.read_tier(tier)
                .map(|materials| !materials.is_empty())
                .unwrap_or(false)
        };

        non_empty(&*self.environment.primary) || non_empty(&*self.environment.secondary)
    }

    fn write_tier(&self, tier: &dyn KeyValueTier, payload: &str, timestamp: i64) -> bool {
        let result = tier
            .set(MATERIALS_KEY, payload)
            .and_then(|_| tier.set(TIMESTAMP_KEY, &timestamp.to_string()));

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(self.logger(), "Unable to write tier"; "tier" => tier.name(), "error" => %e);
                false
            }
        }
    }

    /// Writes `materials` to both tiers. Returns the write's timestamp and
    /// whether either tier accepted it.
    fn write_tiers(&self, materials: &[Material]) -> (i64, bool) {
        let timestamp = self.next_timestamp();

        let payload = match self.serialize(materials) {
            Some(payload) => payload,
            None => return (timestamp, false),
        };

        let primary = self.write_tier(&*self.environment.primary, &payload, timestamp);
        let secondary = self.write_tier(&*self.environment.secondary, &payload, timestamp);

        (timestamp, primary || secondary)
    }

    fn publish(&self, timestamp: i64, count: usize, source: ChangeSource) {
        let reached = self.environment.notifier.publish(ChangeNotification {
            timestamp,
            count,
            source,
        });

        debug!(self.logger(), "Published change"; "source" => source.as_str(), "count" => count, "subscribers" => reached);
    }

    async fn store_snapshot(&self, snapshot: Snapshot) {
        let backup = match &self.environment.backup {
            Some(backup) => backup,
            None => return,
        };

        let timestamp = snapshot.timestamp;

        if let Err(e) = backup.put(snapshot).await {
            warn!(self.logger(), "Unable to store backup snapshot"; "timestamp" => timestamp, "error" => %e);
            return;
        }

        match backup::prune(&**backup, self.retained_snapshots).await {
            Ok(deleted) => {
                debug!(self.logger(), "Stored backup snapshot"; "timestamp" => timestamp, "pruned" => deleted);
            }
            Err(e) => {
                warn!(self.logger(), "Unable to prune backup snapshots"; "error" => %e);
            }
        }
    }

    async fn restore_from_backup(&self) {
        let backup = match &self.environment.backup {
            Some(backup) => backup,
            None => return,
        };

        if self.has_local_materials() {
            debug!(self.logger(), "Local tiers repopulated, skipping restore");
            return;
        }

        let snapshot = match backup.latest().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(self.logger(), "No backup snapshot to restore");
                return;
            }
            Err(e) => {
                warn!(self.logger(), "Unable to read backup snapshots"; "error" => %e);
                return;
            }
        };

        if snapshot.materials.is_empty() {
            debug!(self.logger(), "Newest backup snapshot is empty"; "timestamp" => snapshot.timestamp);
            return;
        }

        // a write may have landed while the backup store was queried
        if self.has_local_materials() {
            return;
        }

        let count = snapshot.materials.len();
        let (timestamp, written) = self.write_tiers(&snapshot.materials);

        if written {
            info!(self.logger(), "Restored materials from backup"; "snapshot" => snapshot.timestamp, "count" => count);
            self.publish(timestamp, count, ChangeSource::RestoreFromBackup);
        } else {
            warn!(self.logger(), "No tier accepted the restored materials");
        }
    }
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
