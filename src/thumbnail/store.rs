//! Thumbnail Cache Store
//!
//! Artifacts live at `<root>/<shard>/<key>.jpg`. Every key names exactly one
//! (content, transform) pair, so writers never contend for a file: a write goes
//! to a unique temp file in the shard directory and is renamed into place, and
//! a second store for a key that already exists is a no-op.

use crate::error::StorageError;
use crate::types::CacheKey;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

pub const ARTIFACT_EXTENSION: &str = "jpg";

/// A persisted thumbnail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub key: CacheKey,
    pub disk_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Content-addressed artifact directory
#[derive(Debug, Clone)]
pub struct ThumbnailStore {
    root: PathBuf,
}

impl ThumbnailStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the artifact for `key` lives, whether or not it exists yet.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(key.shard())
            .join(format!("{}.{}", key.as_str(), ARTIFACT_EXTENSION))
    }

    /// Path of the stored artifact, or `None` on a miss.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<PathBuf>, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Err(StorageError::InvalidPath(format!(
                "{} exists but is not a file",
                path.display()
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Blocking lookup returning the full artifact record.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CachedArtifact>, StorageError> {
        Self::existing(key, &self.path_for(key))
    }

    /// Persist `bytes` as the artifact for `key`.
    ///
    /// Storing an existing key keeps the first artifact and succeeds.
    pub fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<CachedArtifact, StorageError> {
        let target = self.path_for(key);
        if let Some(existing) = Self::existing(key, &target)? {
            debug!(key = %key, "Artifact already stored");
            return Ok(existing);
        }

        let shard_dir = target
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(target.display().to_string()))?;
        fs::create_dir_all(shard_dir)?;

        let temp = shard_dir.join(format!(".{}.{}.tmp", key.as_str(), Uuid::new_v4()));
        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        // another writer may have finished first; theirs stays
        if let Some(existing) = Self::existing(key, &target)? {
            let _ = fs::remove_file(&temp);
            return Ok(existing);
        }
        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        Ok(CachedArtifact {
            key: key.clone(),
            disk_path: target,
            created_at: Utc::now(),
        })
    }

    fn existing(key: &CacheKey, target: &Path) -> Result<Option<CachedArtifact>, StorageError> {
        match fs::metadata(target) {
            Ok(meta) => {
                let created_at = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                Ok(Some(CachedArtifact {
                    key: key.clone(),
                    disk_path: target.to_path_buf(),
                    created_at,
                }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
