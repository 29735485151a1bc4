use thiserror::Error;

/// Failures raised by the object store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Engine(#[from] rusqlite::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("Record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record lacks a field the schema requires, or holds a value
    /// of the wrong shape. Only an out-of-band schema change can cause this.
    #[error("Schema integrity error: store '{store}' has no valid value for field '{field}'")]
    SchemaIntegrity { store: &'static str, field: String },

    #[error("Invalid schema for store '{store}': {reason}")]
    InvalidSchema { store: String, reason: String },

    #[error("Record for store '{0}' has no primary key")]
    MissingKey(&'static str),

    #[error("Unknown object store: {0}")]
    UnknownStore(String),

    #[error("Object store '{0}' is not part of this transaction")]
    StoreNotInScope(String),

    #[error("Unknown index '{index}' on store '{store}'")]
    UnknownIndex { store: String, index: String },

    #[error("Write attempted on store '{0}' inside a read-only transaction")]
    ReadOnly(&'static str),

    #[error("Cursor has no current record")]
    CursorExhausted,

    #[error("Database version {requested} is lower than stored version {stored}")]
    VersionDowngrade { stored: u32, requested: u32 },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("The active tab has no usable url")]
    UnsupportedTab,

    #[error("Invalid bookmark: {0}")]
    InvalidBookmark(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
