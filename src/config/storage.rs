//! StorageConfig: where thumbnails live.

use crate::config::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Thumbnail root; None means the XDG cache directory
    #[serde(default)]
    pub thumbnail_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_thumbnail_dir(&self) -> Result<PathBuf, ApiError> {
        match &self.thumbnail_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.clone()),
            _ => xdg::thumbnail_dir(),
        }
    }
}
