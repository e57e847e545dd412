//! Image preparation for signin pages before extraction.
//!
//! Deskew, contrast and sharpness boost, then a size cap. Everything runs on
//! the CPU and blocks, so callers go through `spawn_blocking`.

mod enhance;
mod skew;

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use rollcall::config::ExtractionSettings;
use thiserror::Error;

pub use enhance::{adjust_contrast, adjust_sharpness, encode_png, fit_dimensions, limit_dimensions};
pub use skew::{deskew, ProjectionProfileDetector, SkewDetector};

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },

    #[error("failed to encode page: {0}")]
    Encode(#[from] image::ImageError),
}

/// A page image ready to send for extraction.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub png: Vec<u8>,
    /// Skew found on the page, if any.
    pub skew_degrees: Option<f32>,
    /// True when skew was found but the correction was out of bounds.
    pub rotation_skipped: bool,
    pub width: u32,
    pub height: u32,
}

pub struct Preprocessor {
    detector: Arc<dyn SkewDetector>,
    max_rotation_degrees: f32,
    contrast_factor: f32,
    sharpness_factor: f32,
    max_dimension: u32,
}

impl Preprocessor {
    pub fn new(settings: &ExtractionSettings, detector: Arc<dyn SkewDetector>) -> Self {
        Self {
            detector,
            max_rotation_degrees: settings.max_rotation_degrees,
            contrast_factor: settings.contrast_factor,
            sharpness_factor: settings.sharpness_factor,
            max_dimension: settings.max_image_dimension,
        }
    }

    pub fn from_settings(settings: &ExtractionSettings) -> Self {
        Self::new(settings, Arc::new(ProjectionProfileDetector::default()))
    }

    /// Read a page raster from disk and prepare it.
    pub fn prepare_path(&self, path: &Path) -> Result<PreparedImage, PreprocessError> {
        let img = image::open(path)
            .map_err(|source| PreprocessError::Decode {
                path: path.display().to_string(),
                source,
            })?
            .to_rgb8();
        self.prepare(img)
    }

    pub fn prepare(&self, img: RgbImage) -> Result<PreparedImage, PreprocessError> {
        let skew = self.detector.detect(&image::imageops::grayscale(&img));

        let mut rotation_skipped = false;
        let img = match skew {
            Some(angle) if angle.abs() >= self.max_rotation_degrees => {
                tracing::info!(
                    angle,
                    limit = self.max_rotation_degrees,
                    "Skew out of bounds, skipped rotation"
                );
                rotation_skipped = true;
                img
            }
            Some(angle) if angle != 0.0 => {
                tracing::debug!(angle, "Deskewing page");
                deskew(&img, angle)
            }
            _ => img,
        };

        let img = adjust_contrast(&img, self.contrast_factor);
        let img = adjust_sharpness(&img, self.sharpness_factor);
        let img = limit_dimensions(img, self.max_dimension);
        let (width, height) = img.dimensions();

        Ok(PreparedImage {
            png: encode_png(img)?,
            skew_degrees: skew,
            rotation_skipped,
            width,
            height,
        })
    }
}
