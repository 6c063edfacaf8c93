#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{self, BoxFuture, FutureExt};
use lazy_static::lazy_static;

use materials_sync::backup::{BackupStore, MemoryBackupStore};
use materials_sync::environment::Environment;
use materials_sync::errors::RemoteError;
use materials_sync::material::{HandlingGuide, Material};
use materials_sync::notify::Notifier;
use materials_sync::remote::MaterialsApi;
use materials_sync::tier::{KeyValueTier, MemoryTier};
use materials_sync::Synchronizer;

lazy_static! {
    pub static ref LOGGER: Arc<log::Logger> = Arc::new(log::discard());
}

/// An in-process stand-in for the materials API.
pub struct FakeApi {
    materials: Mutex<Vec<Material>>,
    online: AtomicBool,
    calls: AtomicUsize,
}

impl FakeApi {
    pub fn new(materials: Vec<Material>) -> Self {
        FakeApi {
            materials: Mutex::new(materials),
            online: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn offline() -> Self {
        let api = FakeApi::new(vec![]);
        api.set_online(false);
        api
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_materials(&self, materials: Vec<Material>) {
        *self.materials.lock().unwrap() = materials;
    }

    pub fn materials(&self) -> Vec<Material> {
        self.materials.lock().unwrap().clone()
    }

    /// How many requests reached the API, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Status(503))
        }
    }
}

impl MaterialsApi for FakeApi {
    fn list(&self) -> BoxFuture<'_, Result<Vec<Material>, RemoteError>> {
        let result = self.check_online().map(|_| self.materials());
        future::ready(result).boxed()
    }

    fn save(&self, material: Material) -> BoxFuture<'_, Result<Material, RemoteError>> {
        let result = self.check_online().map(|_| {
            let mut materials = self.materials.lock().unwrap();

            match materials.iter().position(|m| m.id == material.id) {
                Some(i) => materials[i] = material.clone(),
                None => materials.push(material.clone()),
            }

            material
        });

        future::ready(result).boxed()
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, Result<(), RemoteError>> {
        let result = self.check_online().and_then(|_| {
            let mut materials = self.materials.lock().unwrap();
            let before = materials.len();
            materials.retain(|m| m.id != id);

            if materials.len() == before {
                Err(RemoteError::Status(404))
            } else {
                Ok(())
            }
        });

        future::ready(result).boxed()
    }
}

/// A synchronizer wired to in-memory tiers, with handles on all of them.
pub struct Harness {
    pub synchronizer: Synchronizer,
    pub remote: Arc<FakeApi>,
    pub primary: Arc<MemoryTier>,
    pub secondary: Arc<MemoryTier>,
    pub backup: Option<Arc<MemoryBackupStore>>,
    pub notifier: Arc<Notifier>,
}

impl Harness {
    pub fn new(remote: FakeApi) -> Self {
        Harness::build(remote, Some(Arc::new(MemoryBackupStore::new())))
    }

    pub fn without_backup(remote: FakeApi) -> Self {
        Harness::build(remote, None)
    }

    fn build(remote: FakeApi, backup: Option<Arc<MemoryBackupStore>>) -> Self {
        let remote = Arc::new(remote);
        let primary = Arc::new(MemoryTier::new("primary"));
        let secondary = Arc::new(MemoryTier::new("secondary"));
        let notifier = Arc::new(Notifier::default());

        let store = backup.clone().map(|b| b as Arc<dyn BackupStore>);
        let environment = Environment::new(
            LOGGER.clone(),
            remote.clone(),
            primary.clone(),
            secondary.clone(),
            store,
            notifier.clone(),
        );

        Harness {
            synchronizer: Synchronizer::new(environment, 3),
            remote,
            primary,
            secondary,
            backup,
            notifier,
        }
    }

    /// A second synchronizer over the same tiers, like another tab of the
    /// same app. `primary` replaces the shared primary tier when given.
    pub fn sibling(&self, primary: Option<Arc<dyn KeyValueTier>>) -> Synchronizer {
        let environment = Environment::new(
            LOGGER.clone(),
            self.remote.clone(),
            primary.unwrap_or_else(|| self.primary.clone() as Arc<dyn KeyValueTier>),
            self.secondary.clone(),
            self.backup.clone().map(|b| b as Arc<dyn BackupStore>),
            self.notifier.clone(),
        );

        Synchronizer::new(environment, 3)
    }

    pub fn backup(&self) -> &MemoryBackupStore {
        self.backup.as_ref().expect("harness has a backup store")
    }
}

pub fn material(id: &str, name: &str) -> Material {
    Material {
        id: id.to_owned(),
        name: name.to_owned(),
        description: format!("Como reciclar {}", name.to_lowercase()),
        video_url: None,
        color: "#000000".to_owned(),
        items: HandlingGuide::default(),
    }
}

pub fn ids(materials: &[Material]) -> Vec<&str> {
    materials.iter().map(|m| m.id.as_str()).collect()
}
