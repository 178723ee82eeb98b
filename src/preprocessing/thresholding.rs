//! # Image Thresholding Module
//!
//! Binary thresholding for OCR preprocessing. Label photos are rarely lit
//! evenly, so a local (adaptive) threshold is used instead of a single global
//! cut-off.

use image::{GrayImage, Luma};

use super::types::PreprocessingError;

/// Builds a normalized 1-D Gaussian kernel for the given odd size.
///
/// Sigma follows the usual derivation from the block size:
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= sum;
    }
    kernel
}

/// Separable Gaussian blur with replicated borders, returned as `f32` samples.
fn gaussian_mean(image: &GrayImage, kernel: &[f32]) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as i32, height as i32);
    let half = (kernel.len() / 2) as i32;

    let mut horizontal = vec![0f32; (width * height) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x + k as i32 - half).clamp(0, w - 1);
                acc += weight * image.get_pixel(sx as u32, y as u32)[0] as f32;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    let mut vertical = vec![0f32; (width * height) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = (y + k as i32 - half).clamp(0, h - 1);
                acc += weight * horizontal[(sy * w + x) as usize];
            }
            vertical[(y * w + x) as usize] = acc;
        }
    }

    vertical
}

/// Applies Gaussian-weighted adaptive thresholding.
///
/// A pixel becomes white (255) when it is brighter than the Gaussian-weighted
/// mean of its `block_size`×`block_size` neighbourhood minus `c`, otherwise
/// black (0). Dark print on light packaging therefore ends up black on white.
///
/// # Errors
///
/// Returns `PreprocessingError::InvalidParameter` when `block_size` is even or
/// smaller than 3.
pub fn apply_adaptive_threshold(
    image: &GrayImage,
    block_size: u32,
    c: f32,
) -> Result<GrayImage, PreprocessingError> {
    if block_size < 3 || block_size % 2 == 0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "threshold_block_size",
            value: block_size.to_string(),
        });
    }

    let start_time = std::time::Instant::now();
    let kernel = gaussian_kernel(block_size);
    let means = gaussian_mean(image, &kernel);
    let width = image.width();

    let binary = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let threshold = means[(y * width + x) as usize] - c;
        if image.get_pixel(x, y)[0] as f32 > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    tracing::debug!(
        target: "ocr_preprocessing",
        "Adaptive threshold completed in {}ms: block={}, c={:.1}, dimensions={}x{}",
        start_time.elapsed().as_millis(),
        block_size,
        c,
        image.width(),
        image.height()
    );

    Ok(binary)
}
