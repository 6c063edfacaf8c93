use crate::errors::TierError;

mod file;
mod memory;

pub use self::file::FileTier;
pub use self::memory::MemoryTier;

/// The key holding the serialized material list.
pub const MATERIALS_KEY: &str = "recycleMaterials";

/// The key holding the time of the last write, in milliseconds since the
/// epoch, as a decimal string.
pub const TIMESTAMP_KEY: &str = "recycleMaterialsTimestamp";

/// A local string key-value store.
pub trait KeyValueTier: Send + Sync {
    /// A short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, TierError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), TierError>;

    /// Removes `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<(), TierError>;
}
