//! Source Index
//!
//! Maps content hashes back to files on disk so the generation queue can find
//! a source to render. Indexing a file reads its identity, hashes it when the
//! record carries no hash yet, and records the hash on the identity.

use crate::error::ApiError;
use crate::hasher;
use crate::types::ContentHash;
use crate::xstat::{EntryType, FileIdentity, IdentityResolver};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Locates a source file by content hash
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, content: &ContentHash) -> Option<PathBuf>;
}

/// In-memory content hash to path index
#[derive(Clone)]
pub struct SourceIndex {
    identities: IdentityResolver,
    entries: Arc<RwLock<HashMap<ContentHash, PathBuf>>>,
}

impl SourceIndex {
    pub fn new(identities: IdentityResolver) -> Self {
        Self {
            identities,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn identities(&self) -> &IdentityResolver {
        &self.identities
    }

    /// Register `path` as a source for `content`. The latest path wins.
    pub fn insert(&self, content: ContentHash, path: PathBuf) {
        self.entries.write().insert(content, path);
    }

    pub fn remove(&self, content: &ContentHash) -> Option<PathBuf> {
        self.entries.write().remove(content)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Identify, hash if needed, and register one regular file.
    ///
    /// Failing to persist the hash is not fatal: the file is still indexed with
    /// the in-memory record.
    pub fn index_file(&self, path: &Path) -> Result<FileIdentity, ApiError> {
        let identity = self.identities.read_identity(path)?;
        if identity.entry_type != EntryType::File {
            return Err(ApiError::NotSupportedType(path.to_path_buf()));
        }

        let identity = match identity.hash {
            Some(_) => identity,
            None => {
                let hash = hasher::hash_file(path)?;
                let magic = hasher::sniff_magic(path)?;
                match self
                    .identities
                    .update_hash(path, &identity, hash, Some(magic.clone()))
                {
                    Ok(updated) => updated,
                    Err(ApiError::StorageError(e)) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to persist content hash"
                        );
                        FileIdentity {
                            hash: Some(hash),
                            magic: Some(magic),
                            ..identity
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        if let Some(hash) = identity.hash {
            debug!(path = %path.display(), content = %hash, "Indexed source");
            self.insert(hash, path.to_path_buf());
        }
        Ok(identity)
    }

    /// Index every regular file under `root`. Symlinks are not followed.
    ///
    /// Files that fail to index are logged and skipped. Returns the number of
    /// files indexed.
    pub fn index_tree(&self, root: &Path) -> Result<usize, ApiError> {
        IdentityResolver::read_timestamp(root)?;

        let mut indexed = 0;
        let mut skipped = 0;
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Failed to read directory entry");
                    skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match self.index_file(entry.path()) {
                Ok(_) => indexed += 1,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping file");
                    skipped += 1;
                }
            }
        }

        info!(
            root = %root.display(),
            indexed,
            skipped,
            "Indexed source tree"
        );
        Ok(indexed)
    }
}

impl SourceResolver for SourceIndex {
    fn resolve(&self, content: &ContentHash) -> Option<PathBuf> {
        self.entries.read().get(content).cloned()
    }
}
