use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::errors::TierError;
use crate::tier::KeyValueTier;

const NAME: &str = "file";

/// A tier that persists across sessions by keeping one file per key in
/// a directory, like a browser's local storage.
pub struct FileTier {
    directory: PathBuf,
}

impl FileTier {
    /// Creates a tier rooted at `directory`, creating it if needed.
    pub fn open(directory: impl Into<PathBuf>) -> io::Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;

        Ok(FileTier { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, TierError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');

        if valid {
            Ok(self.directory.join(key))
        } else {
            Err(TierError::InvalidKey {
                tier: NAME,
                key: key.to_owned(),
            })
        }
    }
}

fn unavailable(source: io::Error) -> TierError {
    TierError::Unavailable { tier: NAME, source }
}

impl KeyValueTier for FileTier {
    fn name(&self) -> &'static str {
        NAME
    }

    fn get(&self, key: &str) -> Result<Option<String>, TierError> {
        let path = self.path_for(key)?;

        match fs::read_to_string(path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TierError> {
        let path = self.path_for(key)?;

        // write beside the target so the rename stays on one filesystem
        let mut file = NamedTempFile::new_in(&self.directory).map_err(unavailable)?;
        file.write_all(value.as_bytes()).map_err(unavailable)?;
        file.persist(path).map_err(|e| unavailable(e.error))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), TierError> {
        let path = self.path_for(key)?;

        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopening() {
        let directory = tempfile::tempdir().unwrap();

        {
            let tier = FileTier::open(directory.path()).unwrap();
            tier.set("recycleMaterials", "[]").unwrap();
            tier.set("recycleMaterials", "[1]").unwrap();
        }

        let tier = FileTier::open(directory.path()).unwrap();
        assert_eq!(tier.get("recycleMaterials").unwrap().as_deref(), Some("[1]"));
        assert_eq!(tier.get("missing").unwrap(), None);

        tier.remove("recycleMaterials").unwrap();
        tier.remove("recycleMaterials").unwrap();
        assert_eq!(tier.get("recycleMaterials").unwrap(), None);
    }

    #[test]
    fn rejects_keys_that_escape_the_directory() {
        let directory = tempfile::tempdir().unwrap();
        let tier = FileTier::open(directory.path().join("nested")).unwrap();

        for key in &["../outside", "", ".hidden", "a/b"] {
            assert!(
                matches!(tier.set(key, "x"), Err(TierError::InvalidKey { .. })),
                "{:?} must be rejected",
                key
            );
        }
    }

    #[test]
    fn unreadable_directory_is_unavailable() {
        let directory = tempfile::tempdir().unwrap();
        let tier = FileTier::open(directory.path().join("gone")).unwrap();
        fs::remove_dir(tier.directory()).unwrap();

        assert_eq!(tier.get("recycleMaterials").unwrap(), None);
        assert!(matches!(
            tier.set("recycleMaterials", "[]"),
            Err(TierError::Unavailable { .. })
        ));
    }
}
