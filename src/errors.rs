use thiserror::Error;

/// Enumerates errors returned by a local key-value tier.
#[derive(Debug, Error)]
pub enum TierError {
    /// Represents a failure of the underlying storage.
    #[error("{tier} tier unavailable")]
    Unavailable {
        tier: &'static str,
        source: std::io::Error,
    },

    /// Represents a write that would exceed the tier's quota.
    #[error("{tier} tier quota of {quota} bytes exceeded by a {size}-byte value")]
    QuotaExceeded {
        tier: &'static str,
        quota: usize,
        size: usize,
    },

    /// Represents a tier that has been switched off.
    #[error("{tier} tier disabled")]
    Disabled { tier: &'static str },

    /// Represents a key the tier cannot store.
    #[error("invalid key {key:?} for {tier} tier")]
    InvalidKey { tier: &'static str, key: String },
}

/// Enumerates errors returned by the durable backup store.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx {
        #[from]
        source: sqlx::Error,
    },

    /// Represents a store that cannot be reached at all.
    #[error("backup store unavailable")]
    Unavailable,

    /// Represents a snapshot whose payload cannot be decoded.
    #[error("corrupt snapshot {timestamp}")]
    CorruptSnapshot {
        timestamp: i64,
        source: serde_json::Error,
    },

    /// Represents a snapshot whose payload cannot be encoded.
    #[error("unable to serialize snapshot {timestamp}")]
    Serialization {
        timestamp: i64,
        source: serde_json::Error,
    },
}

/// Enumerates errors returned when talking to the remote materials API.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Represents a transport or decoding failure.
    #[error("HTTP error")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// Represents a non-success status code.
    #[error("unexpected status {0}")]
    Status(u16),

    /// Represents a URL that could not be built.
    #[error("unable to build URL")]
    Url {
        #[from]
        source: url::ParseError,
    },
}

/// Enumerates errors in user-supplied material values.
#[derive(Debug, Error, PartialEq)]
pub enum MaterialError {
    /// Represents a material without an identity key.
    #[error("material has no ID")]
    MissingId,
}

/// Enumerates errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Represents a required variable that is not set.
    #[error("must define {0} environment variable")]
    Missing(String),

    /// Represents a variable that cannot be parsed.
    #[error("unable to parse {name}={value:?}")]
    Invalid { name: String, value: String },
}

/// Enumerates errors raised while wiring the synchronizer together.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("configuration error")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("backup store error")]
    Backup {
        #[from]
        source: BackupError,
    },

    #[error("remote API error")]
    Remote {
        #[from]
        source: RemoteError,
    },

    #[error("unable to prepare data directory")]
    DataDirectory { source: std::io::Error },
}
