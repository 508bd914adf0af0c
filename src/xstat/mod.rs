//! File Identity
//!
//! Every regular file and directory gets a stable identity record kept in an
//! extended attribute. The attribute is the durable truth; the stat mtime is the
//! cheap trust check. When the stored mtime no longer matches, the record is
//! stale and a fresh uuid is minted, dropping any hash that described the old
//! content.
//!
//! Two concurrent regenerations of one path each return their own fresh uuid and
//! the last attribute write wins. Callers that care must serialize reads of a
//! path themselves.

pub mod codec;

use crate::error::ApiError;
use crate::types::ContentHash;
use codec::{AttributeStore, IdentityCodec, XattrStore, DEFAULT_ATTRIBUTE};
use serde::{Deserialize, Serialize};
use std::fs::{FileType, Metadata};
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use uuid::Uuid;

/// Entry kinds that can carry an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

impl EntryType {
    fn from_file_type(file_type: FileType) -> Option<Self> {
        if file_type.is_file() {
            Some(EntryType::File)
        } else if file_type.is_dir() {
            Some(EntryType::Directory)
        } else {
            None
        }
    }
}

/// Identity record mirrored in the path's attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIdentity {
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub name: String,
    /// Modification time in epoch milliseconds at the time the record was made
    pub mtime: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic: Option<String>,
}

impl FileIdentity {
    fn fresh(entry_type: EntryType, name: String, mtime: i64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            entry_type,
            name,
            mtime,
            hash: None,
            magic: None,
        }
    }
}

fn mtime_millis(metadata: &Metadata) -> std::io::Result<i64> {
    let modified = metadata.modified()?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    })
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Resolves trustworthy identities for paths
#[derive(Clone)]
pub struct IdentityResolver {
    codec: IdentityCodec,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ATTRIBUTE)
    }
}

impl IdentityResolver {
    /// Resolver backed by real extended attributes under `attribute`.
    pub fn new(attribute: impl Into<String>) -> Self {
        Self::with_store(Arc::new(XattrStore), attribute)
    }

    pub fn with_store(store: Arc<dyn AttributeStore>, attribute: impl Into<String>) -> Self {
        Self {
            codec: IdentityCodec::new(store, attribute),
        }
    }

    pub fn codec(&self) -> &IdentityCodec {
        &self.codec
    }

    fn stat(path: &Path) -> Result<(EntryType, i64), ApiError> {
        let metadata = std::fs::symlink_metadata(path).map_err(|e| ApiError::from_io(path, e))?;
        let entry_type = EntryType::from_file_type(metadata.file_type())
            .ok_or_else(|| ApiError::NotSupportedType(path.to_path_buf()))?;
        let mtime = mtime_millis(&metadata).map_err(|e| ApiError::from_io(path, e))?;
        Ok((entry_type, mtime))
    }

    /// Read the identity of `path`, regenerating it when missing or stale.
    ///
    /// A failed attribute write does not fail the read; the fresh record is
    /// returned regardless and the next read will regenerate again.
    pub fn read_identity(&self, path: &Path) -> Result<FileIdentity, ApiError> {
        let (entry_type, mtime) = Self::stat(path)?;
        let name = basename(path);

        if let Some(mut stored) = self.codec.read(path) {
            if stored.mtime == mtime && stored.entry_type == entry_type {
                stored.name = name;
                return Ok(stored);
            }
            debug!(
                path = %path.display(),
                stored_mtime = stored.mtime,
                current_mtime = mtime,
                "Identity attribute is stale"
            );
        }

        let fresh = FileIdentity::fresh(entry_type, name, mtime);
        if let Err(e) = self.codec.write(path, &fresh) {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to persist identity attribute"
            );
        }
        Ok(fresh)
    }

    /// `read_identity` on the blocking pool.
    pub async fn read_identity_async(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<FileIdentity, ApiError> {
        let resolver = self.clone();
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || resolver.read_identity(&path))
            .await
            .map_err(|e| {
                ApiError::from(crate::error::StorageError::from(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("identity task failed: {}", e),
                )))
            })?
    }

    /// Current modification time of `path` in epoch milliseconds.
    pub fn read_timestamp(path: &Path) -> Result<i64, ApiError> {
        let metadata = std::fs::symlink_metadata(path).map_err(|e| ApiError::from_io(path, e))?;
        mtime_millis(&metadata).map_err(|e| ApiError::from_io(path, e))
    }

    /// Persist a computed content hash into the record of a regular file.
    ///
    /// Fails with `StaleIdentity` when the file was modified after `identity`
    /// was read, or a different identity has been stored since.
    pub fn update_hash(
        &self,
        path: &Path,
        identity: &FileIdentity,
        hash: ContentHash,
        magic: Option<String>,
    ) -> Result<FileIdentity, ApiError> {
        let (entry_type, mtime) = Self::stat(path)?;
        if entry_type != EntryType::File {
            return Err(ApiError::NotSupportedType(path.to_path_buf()));
        }
        if mtime != identity.mtime || identity.entry_type != EntryType::File {
            return Err(ApiError::StaleIdentity(path.to_path_buf()));
        }
        if let Some(stored) = self.codec.read(path) {
            if stored.uuid != identity.uuid {
                return Err(ApiError::StaleIdentity(path.to_path_buf()));
            }
        }

        let updated = FileIdentity {
            name: basename(path),
            hash: Some(hash),
            magic,
            ..identity.clone()
        };
        self.codec
            .write(path, &updated)
            .map_err(|e| ApiError::from_io(path, e))?;
        Ok(updated)
    }

    /// Drop the stored record; the next read mints a new identity.
    pub fn clear_identity(&self, path: &Path) -> Result<(), ApiError> {
        Self::stat(path)?;
        self.codec
            .clear(path)
            .map_err(|e| ApiError::from_io(path, e))
    }
}

/// Read the identity of `path` using real attributes under the default name.
pub fn read_identity(path: &Path) -> Result<FileIdentity, ApiError> {
    IdentityResolver::default().read_identity(path)
}
