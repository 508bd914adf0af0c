//! Extended-attribute codec for identity records.
//!
//! One reserved attribute per path holds the JSON record. Reads tolerate every
//! kind of bad value: absent, unreadable, unparseable or wrongly shaped
//! attributes all come back as `None` and the resolver regenerates.

use super::FileIdentity;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Default attribute name in the `user` namespace
pub const DEFAULT_ATTRIBUTE: &str = "user.mediacache";

/// Raw access to a path's extended attributes
pub trait AttributeStore: Send + Sync {
    fn get(&self, path: &Path, name: &str) -> io::Result<Option<Vec<u8>>>;
    fn set(&self, path: &Path, name: &str, value: &[u8]) -> io::Result<()>;
    fn remove(&self, path: &Path, name: &str) -> io::Result<()>;
}

/// Filesystem extended attributes via the `xattr` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct XattrStore;

impl AttributeStore for XattrStore {
    fn get(&self, path: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
        xattr::get(path, name)
    }

    fn set(&self, path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
        xattr::set(path, name, value)
    }

    fn remove(&self, path: &Path, name: &str) -> io::Result<()> {
        if xattr::get(path, name)?.is_none() {
            return Ok(());
        }
        xattr::remove(path, name)
    }
}

/// In-process attribute map for filesystems without user attributes
#[derive(Debug, Default)]
pub struct MemoryAttributeStore {
    values: Mutex<HashMap<(PathBuf, String), Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail with a permission error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn get(&self, path: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self
            .values
            .lock()
            .get(&(path.to_path_buf(), name.to_string()))
            .cloned())
    }

    fn set(&self, path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "attribute writes disabled",
            ));
        }
        self.values
            .lock()
            .insert((path.to_path_buf(), name.to_string()), value.to_vec());
        Ok(())
    }

    fn remove(&self, path: &Path, name: &str) -> io::Result<()> {
        self.values
            .lock()
            .remove(&(path.to_path_buf(), name.to_string()));
        Ok(())
    }
}

/// Why a stored value was rejected
#[derive(Debug, Error)]
pub(crate) enum DecodeError {
    #[error("malformed identity record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid identity record: {0}")]
    InvalidShape(&'static str),
}

pub(crate) fn decode(raw: &[u8]) -> Result<FileIdentity, DecodeError> {
    let identity: FileIdentity = serde_json::from_slice(raw)?;
    if identity.magic.is_some() && identity.hash.is_none() {
        return Err(DecodeError::InvalidShape("magic without hash"));
    }
    Ok(identity)
}

pub(crate) fn encode(identity: &FileIdentity) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(identity)
}

/// Reads and writes identity records under one attribute name
#[derive(Clone)]
pub struct IdentityCodec {
    store: Arc<dyn AttributeStore>,
    attribute: String,
}

impl IdentityCodec {
    pub fn new(store: Arc<dyn AttributeStore>, attribute: impl Into<String>) -> Self {
        Self {
            store,
            attribute: attribute.into(),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Stored record, or `None` when absent or corrupt.
    pub fn read(&self, path: &Path) -> Option<FileIdentity> {
        let raw = match self.store.get(path, &self.attribute) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Identity attribute unreadable");
                return None;
            }
        };
        match decode(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Dropping corrupt identity attribute");
                None
            }
        }
    }

    pub fn write(&self, path: &Path, identity: &FileIdentity) -> io::Result<()> {
        let raw = encode(identity).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.store.set(path, &self.attribute, &raw)
    }

    pub fn clear(&self, path: &Path) -> io::Result<()> {
        self.store.remove(path, &self.attribute)
    }
}
