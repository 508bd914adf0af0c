//! Error types
//!
//! `ApiError` is what every public operation returns. `StorageError` covers disk
//! and permission failures underneath it. Both are `Clone` so one generation
//! outcome can be handed to every waiter of a shared job.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Disk-level failures
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(Arc<std::io::Error>),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(Arc::new(err))
    }
}

/// Errors surfaced by identity, hashing and thumbnail operations
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a regular file or directory: {}", .0.display())]
    NotSupportedType(PathBuf),

    #[error("Identity of {} changed since it was read", .0.display())]
    StaleIdentity(PathBuf),

    #[error("No source file indexed for content {0}")]
    SourceNotFound(String),

    #[error("Invalid thumbnail query: {0}")]
    InvalidQuery(String),

    #[error("Thumbnail generation failed: {0}")]
    GenerationFailed(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ApiError {
    /// True for the kinds a request layer reports as "not found".
    ///
    /// Everything else is a server-side failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApiError::NotFound(_) | ApiError::NotSupportedType(_) | ApiError::SourceNotFound(_)
        )
    }

    /// Classify an I/O error raised while touching `path`.
    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            ApiError::NotFound(path.to_path_buf())
        } else {
            ApiError::StorageError(StorageError::from(err))
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
