//! XDG Base Directory locations.

use crate::error::ApiError;
use std::path::PathBuf;

const APP_DIR: &str = "mediacache";

fn home_join(parts: &[&str], what: &str) -> Result<PathBuf, ApiError> {
    let home = std::env::var("HOME").map_err(|_| {
        ApiError::ConfigError(format!(
            "Could not determine XDG {} directory (HOME not set)",
            what
        ))
    })?;
    Ok(parts.iter().fold(PathBuf::from(home), |p, part| p.join(part)))
}

/// `$XDG_CONFIG_HOME`, defaulting to `$HOME/.config`
pub fn config_home() -> Result<PathBuf, ApiError> {
    match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => home_join(&[".config"], "config home"),
    }
}

/// `$XDG_CACHE_HOME`, defaulting to `$HOME/.cache`
pub fn cache_home() -> Result<PathBuf, ApiError> {
    match std::env::var("XDG_CACHE_HOME") {
        Ok(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => home_join(&[".cache"], "cache home"),
    }
}

/// Global config file: `$XDG_CONFIG_HOME/mediacache/config.toml`
pub fn config_file() -> Result<PathBuf, ApiError> {
    Ok(config_home()?.join(APP_DIR).join("config.toml"))
}

/// Default thumbnail directory: `$XDG_CACHE_HOME/mediacache/thumbnails`
pub fn thumbnail_dir() -> Result<PathBuf, ApiError> {
    Ok(cache_home()?.join(APP_DIR).join("thumbnails"))
}
