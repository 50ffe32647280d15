use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Backup file not found: {}", .0.display())]
    BackupFileNotFound(PathBuf),

    /// An archive entry would extract outside the scratch directory.
    #[error("Invalid zip entry path: {0}")]
    UnsafeArchiveEntry(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl SyncError {
    /// Whether the remote store reported that there is nothing to download.
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, SyncError::Bridge(e) if e.is_not_found())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(error: tokio::task::JoinError) -> Self {
        SyncError::TaskFailed(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
