//! Error types for the tally facade.

use std::path::PathBuf;

use tally_core::CoreError;
use tally_sync::{PayloadError, SyncError};
use thiserror::Error;

/// Errors surfaced by the facade.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Key handling failed. Entropy exhaustion lands here and is fatal at startup.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The stored client id is not 64 hex characters.
    #[error("invalid client id: {0}")]
    ClientId(#[from] PayloadError),

    /// Reading or writing the settings file failed.
    #[error("settings file {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON of the expected shape.
    #[error("settings file {path}: {source}")]
    SettingsFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The engine task has exited.
    #[error("sync engine is not running")]
    EngineStopped,
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, TallyError>;
