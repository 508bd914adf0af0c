//! Content hashing
//!
//! BLAKE3 over the raw bytes of a file. Hashing never touches identity records;
//! callers decide whether to persist the result.

use crate::error::StorageError;
use crate::types::ContentHash;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 64 * 1024;
const MAGIC_HEADER_SIZE: usize = 32;

/// Label used when the header matches no known image format
pub const GENERIC_MAGIC: &str = "data";

/// Hash the full contents of `path`.
pub fn hash_file(path: &Path) -> Result<ContentHash, StorageError> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(ContentHash(*hasher.finalize().as_bytes()))
}

/// `hash_file` on the blocking pool.
pub async fn hash_file_async(path: impl AsRef<Path>) -> Result<ContentHash, StorageError> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| StorageError::from(std::io::Error::new(ErrorKind::Other, e)))?
}

/// Hash an in-memory buffer the same way `hash_file` hashes a file.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash(*blake3::hash(bytes).as_bytes())
}

/// Short content-kind label from the file header, e.g. `JPEG` or `PNG`.
pub fn sniff_magic(path: &Path) -> Result<String, StorageError> {
    let mut header = Vec::with_capacity(MAGIC_HEADER_SIZE);
    File::open(path)?
        .take(MAGIC_HEADER_SIZE as u64)
        .read_to_end(&mut header)?;

    Ok(match image::guess_format(&header) {
        Ok(format) => format!("{:?}", format).to_uppercase(),
        Err(_) => GENERIC_MAGIC.to_string(),
    })
}
