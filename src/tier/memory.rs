use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::errors::TierError;
use crate::tier::KeyValueTier;

/// A tier that lives only as long as the process, like a browser's
/// session storage.
pub struct MemoryTier {
    name: &'static str,
    map: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
    enabled: AtomicBool,
}

impl MemoryTier {
    pub fn new(name: &'static str) -> Self {
        MemoryTier {
            name,
            map: RwLock::new(HashMap::new()),
            quota: None,
            enabled: AtomicBool::new(true),
        }
    }

    /// Creates a tier that rejects writes whose keys and values would
    /// take more than `quota` bytes in total.
    pub fn with_quota(name: &'static str, quota: usize) -> Self {
        MemoryTier {
            quota: Some(quota),
            ..MemoryTier::new(name)
        }
    }

    /// Switches the tier on or off. A disabled tier fails every call.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Drops every stored value, as when a session ends.
    pub fn clear(&self) {
        self.map
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn check_enabled(&self) -> Result<(), TierError> {
        if self.enabled.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TierError::Disabled { tier: self.name })
        }
    }
}

impl KeyValueTier for MemoryTier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn get(&self, key: &str) -> Result<Option<String>, TierError> {
        self.check_enabled()?;

        let map = self.map.read().unwrap_or_else(|poisoned| poisoned.into_inner());

        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TierError> {
        self.check_enabled()?;

        let mut map = self
            .map
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(quota) = self.quota {
            let others: usize = map
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let size = key.len() + value.len();

            if others + size > quota {
                return Err(TierError::QuotaExceeded {
                    tier: self.name,
                    quota,
                    size,
                });
            }
        }

        map.insert(key.to_owned(), value.to_owned());

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), TierError> {
        self.check_enabled()?;

        self.map
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);

        Ok(())
    }
}
