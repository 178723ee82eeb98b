//! # Image Preprocessing Module
//!
//! Prepares label photographs for OCR: decode, grayscale, resize to a bounded
//! size, edge-preserving denoise, and adaptive binarization.
//!
//! - `scaling`: longer-side resize
//! - `filtering`: bilateral noise reduction
//! - `thresholding`: Gaussian adaptive threshold
//! - `types`: shared types, configuration and error definitions

pub mod filtering;
pub mod scaling;
pub mod thresholding;
pub mod types;

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

pub use filtering::bilateral_filter;
pub use scaling::resize_to_max_dimension;
pub use thresholding::apply_adaptive_threshold;
pub use types::{PreprocessedImage, PreprocessingConfig, PreprocessingError, ScaledImageResult};

/// Runs the full preprocessing chain over raw upload bytes.
///
/// # Errors
///
/// Returns `PreprocessingError::ImageLoad` when the bytes cannot be decoded as an
/// image; other variants indicate an invalid configuration or an encoding failure.
///
/// # Examples
///
/// ```no_run
/// use nutrition_ocr::preprocessing::{preprocess, PreprocessingConfig};
///
/// let raw = std::fs::read("label.jpg")?;
/// let prepared = preprocess(&raw, &PreprocessingConfig::default())?;
/// println!("binarized to {:?}", prepared.dimensions);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn preprocess(
    raw: &[u8],
    config: &PreprocessingConfig,
) -> Result<PreprocessedImage, PreprocessingError> {
    let start_time = std::time::Instant::now();

    let decoded = image::load_from_memory(raw).map_err(|e| PreprocessingError::ImageLoad {
        message: e.to_string(),
    })?;
    let gray = decoded.to_luma8();

    let scaled = resize_to_max_dimension(&gray, config.max_dimension)?;
    let denoised = bilateral_filter(
        &scaled.image,
        config.bilateral_diameter,
        config.bilateral_sigma_color,
        config.bilateral_sigma_space,
    )?;
    let binary =
        apply_adaptive_threshold(&denoised, config.threshold_block_size, config.threshold_c)?;
    let dimensions = binary.dimensions();

    let mut png_bytes = Vec::new();
    DynamicImage::ImageLuma8(binary)
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| PreprocessingError::ProcessingFailed {
            message: format!("PNG encoding failed: {}", e),
        })?;

    let processing_time = start_time.elapsed();
    tracing::debug!(
        target: "ocr_preprocessing",
        original = ?scaled.original_dimensions,
        prepared = ?dimensions,
        encoded_bytes = png_bytes.len(),
        "Preprocessing completed in {}ms",
        processing_time.as_millis()
    );

    Ok(PreprocessedImage {
        png_bytes,
        dimensions,
        original_dimensions: scaled.original_dimensions,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Returns true when the bytes carry a recognizable image signature.
///
/// Used by the transport layer to reject non-image uploads before they reach
/// the pipeline.
pub fn is_image_content(bytes: &[u8]) -> bool {
    image::guess_format(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn encoded_png(width: u32, height: u32) -> Vec<u8> {
        let img = GrayImage::from_fn(width, height, |x, _| {
            if x % 7 == 0 {
                Luma([20])
            } else {
                Luma([230])
            }
        });
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_preprocess_produces_bounded_binary_png() {
        let config = PreprocessingConfig {
            max_dimension: 64,
            ..Default::default()
        };
        let prepared = preprocess(&encoded_png(128, 32), &config).unwrap();
        assert_eq!(prepared.original_dimensions, (128, 32));
        assert_eq!(prepared.dimensions, (64, 16));

        let decoded = image::load_from_memory(&prepared.png_bytes).unwrap().to_luma8();
        assert!(decoded.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_undecodable_bytes_are_image_load_errors() {
        let err = preprocess(b"definitely not an image", &PreprocessingConfig::default())
            .unwrap_err();
        assert!(matches!(err, PreprocessingError::ImageLoad { .. }));
    }

    #[test]
    fn test_is_image_content() {
        assert!(is_image_content(&encoded_png(4, 4)));
        assert!(!is_image_content(b"plain text upload"));
    }
}
