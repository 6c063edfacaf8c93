use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::ConfigError;
use crate::synchronizer::DEFAULT_RETAINED_SNAPSHOTS;

/// Settings for wiring up a synchronizer.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// The API root, e.g. `https://api.example.com/v1/`.
    pub api_base_url: String,

    /// The path of the materials collection below the API root.
    pub materials_path: String,

    /// Where the persistent key-value tier keeps its files.
    pub data_dir: PathBuf,

    /// The SQLite database for backup snapshots. No backups when unset.
    pub backup_path: Option<PathBuf>,

    /// How many backup snapshots to keep.
    pub retained_snapshots: usize,

    /// How many unread notifications a subscriber may fall behind by.
    pub notify_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings through `lookup`, which maps a variable name to
    /// its value. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &str| get(name).ok_or_else(|| ConfigError::Missing(name.to_owned()));

        Ok(Config {
            api_base_url: require("MATERIALS_API_BASE_URL")?,
            materials_path: get("MATERIALS_API_PATH").unwrap_or_else(|| "materials".to_owned()),
            data_dir: PathBuf::from(require("MATERIALS_DATA_DIR")?),
            backup_path: get("MATERIALS_BACKUP_DB").map(PathBuf::from),
            retained_snapshots: parse(
                "MATERIALS_BACKUP_RETENTION",
                get("MATERIALS_BACKUP_RETENTION"),
                DEFAULT_RETAINED_SNAPSHOTS,
            )?,
            notify_capacity: parse("MATERIALS_NOTIFY_CAPACITY", get("MATERIALS_NOTIFY_CAPACITY"), 64)?,
        })
    }
}

fn parse<T: FromStr>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name: name.to_owned(),
            value,
        }),
        None => Ok(default),
    }
}
