use std::sync::Arc;

use log::Logger;

use crate::backup::{BackupStore, SqliteBackupStore};
use crate::config::Config;
use crate::errors::{RemoteError, SetupError};
use crate::notify::Notifier;
use crate::remote::{HttpMaterialsApi, MaterialsApi};
use crate::tier::{FileTier, KeyValueTier, MemoryTier};
use crate::urls::Urls;

/// Everything a synchronizer talks to.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub remote: Arc<dyn MaterialsApi>,
    pub primary: Arc<dyn KeyValueTier>,
    pub secondary: Arc<dyn KeyValueTier>,
    pub backup: Option<Arc<dyn BackupStore>>,
    pub notifier: Arc<Notifier>,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        remote: Arc<dyn MaterialsApi>,
        primary: Arc<dyn KeyValueTier>,
        secondary: Arc<dyn KeyValueTier>,
        backup: Option<Arc<dyn BackupStore>>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            logger,
            remote,
            primary,
            secondary,
            backup,
            notifier,
        }
    }

    /// Builds the production environment: the HTTP API, a file tier in
    /// the data directory, an in-memory session tier and, if configured,
    /// a SQLite backup store.
    pub async fn from_config(config: &Config, logger: Arc<Logger>) -> Result<Self, SetupError> {
        let urls = Urls::new(&config.api_base_url, &config.materials_path).map_err(RemoteError::from)?;
        let remote = Arc::new(HttpMaterialsApi::new(reqwest::Client::new(), urls));

        let primary = FileTier::open(&config.data_dir)
            .map_err(|source| SetupError::DataDirectory { source })?;

        let backup: Option<Arc<dyn BackupStore>> = match &config.backup_path {
            Some(path) => {
                let store: Arc<dyn BackupStore> = Arc::new(SqliteBackupStore::open(path).await?);
                Some(store)
            }
            None => None,
        };

        Ok(Environment::new(
            logger,
            remote,
            Arc::new(primary),
            Arc::new(MemoryTier::new("session")),
            backup,
            Arc::new(Notifier::new(config.notify_capacity)),
        ))
    }
}
