//! Configuration
//!
//! Layered configuration: defaults, then a TOML file, then `MEDIACACHE_*`
//! environment variables with `__` separating nested keys
//! (`MEDIACACHE_GENERATION__WORKERS=4`).

pub mod environment;
pub mod facade;
pub mod storage;
pub mod xdg;

pub use facade::ConfigLoader;
pub use storage::StorageConfig;

use crate::logging::LoggingConfig;
use crate::thumbnail::GenerationConfig;
use crate::xstat::codec::DEFAULT_ATTRIBUTE;
use crate::xstat::IdentityResolver;
use serde::{Deserialize, Serialize};

/// Identity attribute settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Extended attribute holding the identity record
    #[serde(default = "default_attribute")]
    pub attribute: String,
}

fn default_attribute() -> String {
    DEFAULT_ATTRIBUTE.to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            attribute: default_attribute(),
        }
    }
}

impl IdentityConfig {
    /// Resolver over real extended attributes with the configured name.
    pub fn resolver(&self) -> IdentityResolver {
        IdentityResolver::new(self.attribute.clone())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}
