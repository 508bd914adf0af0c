//! Thumbnail rendering
//!
//! Rendering is blocking CPU work and always runs on the blocking pool.

use super::signature::{Modifier, TransformSignature};
use crate::error::ApiError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Produces encoded thumbnail bytes from a source file
pub trait Renderer: Send + Sync {
    fn render(&self, source: &Path, signature: &TransformSignature) -> Result<Vec<u8>, ApiError>;
}

/// Renders raster images with the `image` crate and encodes JPEG
#[derive(Debug, Clone)]
pub struct ImageRenderer {
    quality: u8,
}

impl Default for ImageRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageRenderer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    fn transform(img: &DynamicImage, signature: &TransformSignature) -> DynamicImage {
        match signature.modifier {
            Modifier::Fit => {
                // never upscale past the source
                if img.width() <= signature.width && img.height() <= signature.height {
                    img.clone()
                } else {
                    img.resize(signature.width, signature.height, FilterType::Triangle)
                }
            }
            Modifier::Caret => {
                img.resize_to_fill(signature.width, signature.height, FilterType::Triangle)
            }
        }
    }
}

impl Renderer for ImageRenderer {
    fn render(&self, source: &Path, signature: &TransformSignature) -> Result<Vec<u8>, ApiError> {
        let raw = std::fs::read(source).map_err(|e| ApiError::from_io(source, e))?;
        let img = image::load_from_memory(&raw).map_err(|e| {
            ApiError::GenerationFailed(format!("failed to decode {}: {}", source.display(), e))
        })?;

        // JPEG has no alpha channel
        let thumb = Self::transform(&img, signature).to_rgb8();

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(&thumb)
            .map_err(|e| {
                ApiError::GenerationFailed(format!("failed to encode thumbnail: {}", e))
            })?;
        Ok(out)
    }
}
