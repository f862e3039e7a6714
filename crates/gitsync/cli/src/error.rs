//! CLI error types

use gitsync_engine::SyncError;
use gitsync_lock::LockError;
use gitsync_store::StorageError;
use gitsync_types::ManifestError;
use thiserror::Error;

/// CLI errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("storage backend '{0}' is not compiled in; rebuild with the postgres feature")]
    BackendUnavailable(String),

    #[error("failed to render output: {0}")]
    Output(String),
}

pub type CliResult<T> = Result<T, CliError>;
