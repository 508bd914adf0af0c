//! Transform signatures and request parsing.
//!
//! A signature is the canonical form of the render parameters. Two queries
//! that differ only in key order, in an explicit default modifier, or in the
//! admission flag produce the same signature and therefore the same cache key.

use crate::error::ApiError;
use crate::types::{CacheKey, ContentHash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default upper bound for either dimension
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// How the source is fitted into the requested box
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    /// Scale down to fit within width x height, preserving aspect ratio
    #[default]
    Fit,
    /// Scale to cover width x height and crop the overflow
    Caret,
}

impl Modifier {
    fn as_str(self) -> &'static str {
        match self {
            Modifier::Fit => "fit",
            Modifier::Caret => "caret",
        }
    }
}

/// Admission mode for a generation request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// FIFO behind other queued work
    #[default]
    Queued,
    /// Start immediately unless a job for the key is already pending
    Instant,
}

/// Canonical render parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformSignature {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub modifier: Modifier,
}

impl TransformSignature {
    pub fn new(width: u32, height: u32, modifier: Modifier) -> Self {
        Self {
            width,
            height,
            modifier,
        }
    }

    /// Deterministic string form used in cache keys.
    pub fn canonical(&self) -> String {
        format!("{}x{}-{}", self.width, self.height, self.modifier.as_str())
    }

    pub fn cache_key(&self, content: &ContentHash) -> CacheKey {
        CacheKey::derive(content, &self.canonical())
    }
}

impl fmt::Display for TransformSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// A parsed thumbnail query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub signature: TransformSignature,
    pub priority: Priority,
}

impl ThumbnailRequest {
    /// Parse query pairs. Unknown keys are ignored; a repeated key keeps its
    /// last value.
    pub fn parse<I, K, V>(pairs: I, max_dimension: u32) -> Result<Self, ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut width = None;
        let mut height = None;
        let mut modifier = Modifier::Fit;
        let mut priority = Priority::Queued;

        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "width" => width = Some(parse_dimension("width", value, max_dimension)?),
                "height" => height = Some(parse_dimension("height", value, max_dimension)?),
                "modifier" => {
                    modifier = match value {
                        "caret" => Modifier::Caret,
                        "fit" => Modifier::Fit,
                        other => {
                            return Err(ApiError::InvalidQuery(format!(
                                "unknown modifier {:?}",
                                other
                            )))
                        }
                    }
                }
                "instant" => {
                    priority = if value == "true" {
                        Priority::Instant
                    } else {
                        Priority::Queued
                    }
                }
                _ => {}
            }
        }

        let width = width.ok_or_else(|| ApiError::InvalidQuery("width is required".into()))?;
        let height = height.ok_or_else(|| ApiError::InvalidQuery("height is required".into()))?;

        Ok(Self {
            signature: TransformSignature::new(width, height, modifier),
            priority,
        })
    }
}

fn parse_dimension(field: &str, value: &str, max: u32) -> Result<u32, ApiError> {
    let parsed: u32 = value.trim().parse().map_err(|_| {
        ApiError::InvalidQuery(format!("{} must be a positive integer, got {:?}", field, value))
    })?;
    if parsed == 0 || parsed > max {
        return Err(ApiError::InvalidQuery(format!(
            "{} must be between 1 and {}, got {}",
            field, max, parsed
        )));
    }
    Ok(parsed)
}
