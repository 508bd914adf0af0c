//! ConfigLoader: builds `MediaConfig` from layered sources.

use super::{environment, xdg, MediaConfig};
use config::{Config, ConfigError, File, FileFormat};
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration.
    ///
    /// Precedence: defaults (lowest), then `path` if given or else the global
    /// XDG config file when present, then environment (highest).
    pub fn load(path: Option<&Path>) -> Result<MediaConfig, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Ok(global) = xdg::config_file() {
                    builder = builder.add_source(File::from(global).required(false));
                }
            }
        }
        environment::add_to_builder(builder)
            .build()?
            .try_deserialize()
    }

    /// Load from a specific file with the environment overlay.
    pub fn load_from_file(path: &Path) -> Result<MediaConfig, ConfigError> {
        Self::load(Some(path))
    }

    /// Parse TOML text, without the environment overlay.
    pub fn load_from_str(toml: &str) -> Result<MediaConfig, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Create default configuration.
    pub fn default() -> MediaConfig {
        MediaConfig::default()
    }
}
