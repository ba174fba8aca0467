//! Core error types for bakeroom-core.
//!
//! The countdown itself cannot fail; these errors belong to its
//! collaborators (storage, configuration, alert delivery).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for bakeroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Alert delivery errors
    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(#[source] std::io::Error),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Stored value could not be decoded
    #[error("Corrupt value for key '{key}': {message}")]
    CorruptValue { key: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The stored countdown was changed by another writer
    #[error("Countdown was changed by another command (revision {found}, expected {expected})")]
    Conflict { expected: u64, found: u64 },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Unknown countdown preset
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

/// Alert delivery errors.
#[derive(Error, Debug)]
pub enum AlertError {
    /// The platform refused or failed to schedule the alert
    #[error("Failed to schedule alert in {after_secs}s: {message}")]
    ScheduleFailed { after_secs: u64, message: String },

    /// Alerts are not available on this host
    #[error("Alerts unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy
                ) =>
            {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}
