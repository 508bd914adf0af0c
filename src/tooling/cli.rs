//! CLI Tooling
//!
//! Command definitions and their execution. Every command returns its output
//! as a string for the binary to print.

use crate::config::{ConfigLoader, MediaConfig};
use crate::error::{ApiError, StorageError};
use crate::hasher;
use crate::index::SourceIndex;
use crate::logging::LoggingConfig;
use crate::thumbnail::Thumbnailer;
use crate::xstat::IdentityResolver;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Mediacache CLI - file identities and thumbnails
#[derive(Parser, Debug)]
#[command(name = "mediacache")]
#[command(about = "Stable file identities and content-addressed thumbnails")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Print the identity record of a file or directory
    Identity { path: PathBuf },
    /// Print the content hash of a file
    Hash {
        path: PathBuf,
        /// Also record the hash in the file's identity
        #[arg(long)]
        persist: bool,
    },
    /// Index every regular file under a directory
    Index { root: PathBuf },
    /// Produce a thumbnail for a source file and print its path
    Thumb {
        source: PathBuf,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// fit or caret
        #[arg(long, default_value = "fit")]
        modifier: String,
        /// Skip the generation queue
        #[arg(long)]
        instant: bool,
    },
}

impl Cli {
    /// Apply command-line logging overrides on top of `base`.
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut config = base.clone();
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.file = Some(file.clone());
        }
        config
    }
}

/// Loaded configuration plus the services commands run against
pub struct CliContext {
    config: MediaConfig,
    identities: IdentityResolver,
}

impl CliContext {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(None)?,
        };
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: MediaConfig) -> Self {
        let identities = config.identity.resolver();
        Self::with_identities(config, identities)
    }

    pub fn with_identities(config: MediaConfig, identities: IdentityResolver) -> Self {
        Self { config, identities }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Identity { path } => {
                let identity = self.identities.read_identity(path)?;
                serde_json::to_string_pretty(&identity).map_err(|e| {
                    ApiError::ConfigError(format!("Failed to serialize identity: {}", e))
                })
            }
            Commands::Hash { path, persist } => {
                if *persist {
                    let identity = self.index().index_file(path)?;
                    identity
                        .hash
                        .map(|h| h.to_hex())
                        .ok_or_else(|| ApiError::NotSupportedType(path.clone()))
                } else {
                    Ok(hasher::hash_file(path)?.to_hex())
                }
            }
            Commands::Index { root } => {
                let count = self.index().index_tree(root)?;
                Ok(format!("Indexed {} files under {}", count, root.display()))
            }
            Commands::Thumb {
                source,
                width,
                height,
                modifier,
                instant,
            } => {
                let index = self.index();
                let identity = index.index_file(source)?;
                let content = identity
                    .hash
                    .ok_or_else(|| ApiError::NotSupportedType(source.clone()))?;

                let thumbnailer = Thumbnailer::from_config(&self.config, Arc::new(index))?;
                let query = vec![
                    ("width", width.to_string()),
                    ("height", height.to_string()),
                    ("modifier", modifier.clone()),
                    ("instant", instant.to_string()),
                ];

                let runtime = tokio::runtime::Runtime::new().map_err(StorageError::from)?;
                let path = runtime.block_on(async {
                    thumbnailer.start()?;
                    let result = thumbnailer.request(&content.to_hex(), query).await;
                    thumbnailer.stop().await?;
                    result
                })?;

                info!(source = %source.display(), path = %path.display(), "Thumbnail ready");
                Ok(path.display().to_string())
            }
        }
    }

    fn index(&self) -> SourceIndex {
        SourceIndex::new(self.identities.clone())
    }
}
