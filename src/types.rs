//! Core types shared by the identity and thumbnail layers.

use crate::error::ApiError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Hash: Generic 256-bit hash value
pub type Hash = [u8; 32];

/// BLAKE3 digest of a file's bytes, the content-addressing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub Hash);

impl ContentHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64 character hex digest.
    pub fn from_hex(s: &str) -> Result<Self, ApiError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| ApiError::InvalidQuery(format!("invalid content hash {:?}: {}", s, e)))?;
        Ok(ContentHash(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// CacheKey: hex digest of (content hash, transform signature)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a content hash rendered with a canonical signature.
    pub fn derive(content: &ContentHash, canonical_signature: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(content.to_hex().as_bytes());
        hasher.update(b":");
        hasher.update(canonical_signature.as_bytes());
        CacheKey(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading hex characters used as the shard directory name.
    pub fn shard(&self) -> &str {
        &self.0[..3]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
