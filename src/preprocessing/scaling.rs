//! # Image Scaling Module
//!
//! Resizes label photographs so their longer side matches a fixed target,
//! which keeps glyph sizes in a predictable range for the OCR engines.

use image::imageops::FilterType;
use image::GrayImage;

use super::types::{PreprocessingError, ScaledImageResult};

/// Scales a grayscale image so that its longer side equals `max_dimension`.
///
/// Both down- and up-scaling are applied; aspect ratio is preserved and
/// neither side drops below one pixel.
///
/// # Errors
///
/// Returns `PreprocessingError::InvalidParameter` when `max_dimension` is 0 and
/// `PreprocessingError::ProcessingFailed` for an empty image.
pub fn resize_to_max_dimension(
    image: &GrayImage,
    max_dimension: u32,
) -> Result<ScaledImageResult, PreprocessingError> {
    if max_dimension == 0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "max_dimension",
            value: max_dimension.to_string(),
        });
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessingError::ProcessingFailed {
            message: "cannot scale an empty image".to_string(),
        });
    }

    let scale = max_dimension as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale) as u32).max(1);
    let new_height = ((height as f32 * scale) as u32).max(1);

    let resized = if (new_width, new_height) == (width, height) {
        image.clone()
    } else {
        // Triangle filtering is the closest match to area averaging when shrinking.
        image::imageops::resize(image, new_width, new_height, FilterType::Triangle)
    };

    tracing::debug!(
        target: "ocr_preprocessing",
        "Resized {}x{} -> {}x{} (scale {:.3})",
        width,
        height,
        new_width,
        new_height,
        scale
    );

    Ok(ScaledImageResult {
        image: resized,
        original_dimensions: (width, height),
        new_dimensions: (new_width, new_height),
        scale_factor: scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downscale_preserves_aspect_ratio() {
        let img = GrayImage::new(2000, 1000);
        let result = resize_to_max_dimension(&img, 1000).unwrap();
        assert_eq!(result.new_dimensions, (1000, 500));
        assert_eq!(result.image.dimensions(), (1000, 500));
        assert!((result.scale_factor - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_upscale_small_image() {
        let img = GrayImage::new(100, 250);
        let result = resize_to_max_dimension(&img, 1000).unwrap();
        assert_eq!(result.new_dimensions, (400, 1000));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(resize_to_max_dimension(&GrayImage::new(10, 10), 0).is_err());
        assert!(resize_to_max_dimension(&GrayImage::new(0, 10), 100).is_err());
    }
}
