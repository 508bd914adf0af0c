//! Mediacache: File Identities and Thumbnail Caching
//!
//! Stable per-file identities persisted in extended attributes, content hashing,
//! and a content-addressed thumbnail cache fed by a single-flight generation
//! queue.

pub mod config;
pub mod error;
pub mod hasher;
pub mod index;
pub mod logging;
pub mod thumbnail;
pub mod tooling;
pub mod types;
pub mod xstat;

pub use error::{ApiError, StorageError};
pub use thumbnail::Thumbnailer;
pub use xstat::{read_identity, EntryType, FileIdentity, IdentityResolver};
