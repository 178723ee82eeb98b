//! # Shared Types for Image Preprocessing
//!
//! Types, errors and configuration shared by the preprocessing sub-modules.

use image::GrayImage;

use crate::errors::{AppError, AppResult};
use crate::ocr_errors::OcrError;

/// Errors that can occur during image preprocessing operations.
#[derive(Debug, Clone)]
pub enum PreprocessingError {
    /// Failed to load or decode image
    ImageLoad { message: String },
    /// Image processing operation failed
    ProcessingFailed { message: String },
    /// A filter parameter was outside its supported range
    InvalidParameter { name: &'static str, value: String },
}

impl std::fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessingError::ImageLoad { message } => {
                write!(f, "Failed to load image: {}", message)
            }
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
            PreprocessingError::InvalidParameter { name, value } => {
                write!(f, "Invalid preprocessing parameter {}: {}", name, value)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

impl From<PreprocessingError> for OcrError {
    fn from(err: PreprocessingError) -> Self {
        match err {
            PreprocessingError::ImageLoad { message } => OcrError::InvalidImage(message),
            other => OcrError::Extraction(other.to_string()),
        }
    }
}

/// Tunables for the preprocessing chain (resize, denoise, binarize).
///
/// Defaults reproduce the label pipeline: longer side scaled to 1000 px,
/// bilateral filter d=9 σ=75/75, Gaussian adaptive threshold block 11, C=2.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Target size of the longer image side in pixels
    pub max_dimension: u32,
    /// Bilateral filter neighbourhood diameter in pixels
    pub bilateral_diameter: u32,
    /// Bilateral filter range sigma (intensity difference)
    pub bilateral_sigma_color: f32,
    /// Bilateral filter spatial sigma
    pub bilateral_sigma_space: f32,
    /// Adaptive threshold block size (odd)
    pub threshold_block_size: u32,
    /// Constant subtracted from the weighted neighbourhood mean
    pub threshold_c: f32,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1000,
            bilateral_diameter: 9,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_space: 75.0,
            threshold_block_size: 11,
            threshold_c: 2.0,
        }
    }
}

impl PreprocessingConfig {
    /// Validate preprocessing parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.max_dimension < 32 || self.max_dimension > 8000 {
            return Err(AppError::Config(format!(
                "max_dimension ({}) must be between 32 and 8000",
                self.max_dimension
            )));
        }
        if self.bilateral_diameter == 0 || self.bilateral_diameter > 31 {
            return Err(AppError::Config(format!(
                "bilateral_diameter ({}) must be between 1 and 31",
                self.bilateral_diameter
            )));
        }
        if self.bilateral_sigma_color <= 0.0 || self.bilateral_sigma_space <= 0.0 {
            return Err(AppError::Config(
                "bilateral sigmas must be greater than 0".to_string(),
            ));
        }
        if self.threshold_block_size < 3 || self.threshold_block_size % 2 == 0 {
            return Err(AppError::Config(format!(
                "threshold_block_size ({}) must be odd and at least 3",
                self.threshold_block_size
            )));
        }
        Ok(())
    }
}

/// Result of the resize step.
#[derive(Debug, Clone)]
pub struct ScaledImageResult {
    /// The scaled image
    pub image: GrayImage,
    /// Original image dimensions (width, height)
    pub original_dimensions: (u32, u32),
    /// New image dimensions (width, height)
    pub new_dimensions: (u32, u32),
    /// Scale factor applied
    pub scale_factor: f32,
}

/// Result of the full preprocessing chain, ready to hand to an OCR engine.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    /// PNG-encoded binarized image
    pub png_bytes: Vec<u8>,
    /// Dimensions of the binarized image (width, height)
    pub dimensions: (u32, u32),
    /// Dimensions of the decoded input (width, height)
    pub original_dimensions: (u32, u32),
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}
