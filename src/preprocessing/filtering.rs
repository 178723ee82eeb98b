//! # Image Filtering Module
//!
//! Edge-preserving noise reduction for label photographs. A bilateral filter
//! smooths paper texture and sensor noise while keeping glyph edges sharp, which
//! matters for the thin strokes of small nutrition-table print.

use image::{GrayImage, Luma};

use super::types::PreprocessingError;

/// Applies a bilateral filter to a grayscale image.
///
/// Each output pixel is the weighted mean of its `diameter`×`diameter`
/// neighbourhood, weighted by both spatial distance (`sigma_space`) and
/// intensity difference (`sigma_color`). Borders are handled by clamping.
///
/// # Errors
///
/// Returns `PreprocessingError::InvalidParameter` for a zero diameter or a
/// non-positive sigma.
pub fn bilateral_filter(
    image: &GrayImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> Result<GrayImage, PreprocessingError> {
    if diameter == 0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "bilateral_diameter",
            value: diameter.to_string(),
        });
    }
    if sigma_color <= 0.0 || sigma_space <= 0.0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "bilateral_sigma",
            value: format!("color={}, space={}", sigma_color, sigma_space),
        });
    }

    let start_time = std::time::Instant::now();
    let (width, height) = image.dimensions();
    let radius = (diameter / 2) as i64;

    // Intensity differences are 0..=255, so the range kernel is a lookup table.
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let range_weights: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let mut spatial_kernel = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist_sq = (dx * dx + dy * dy) as f32;
            if dist_sq > (radius * radius) as f32 {
                continue;
            }
            spatial_kernel.push((dx, dy, (dist_sq * space_coeff).exp()));
        }
    }

    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;
    let mut output = GrayImage::new(width, height);

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let center = image.get_pixel(x as u32, y as u32)[0] as i32;
            let mut weighted_sum = 0f32;
            let mut weight_total = 0f32;

            for &(dx, dy, spatial_weight) in &spatial_kernel {
                let nx = (x + dx).clamp(0, max_x) as u32;
                let ny = (y + dy).clamp(0, max_y) as u32;
                let neighbour = image.get_pixel(nx, ny)[0] as i32;
                let weight = spatial_weight * range_weights[(neighbour - center).unsigned_abs() as usize];
                weighted_sum += weight * neighbour as f32;
                weight_total += weight;
            }

            let value = if weight_total > 0.0 {
                (weighted_sum / weight_total).round().clamp(0.0, 255.0) as u8
            } else {
                center as u8
            };
            output.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }

    tracing::debug!(
        target: "ocr_preprocessing",
        "Bilateral filter completed in {}ms: d={}, sigma_color={:.1}, sigma_space={:.1}, dimensions={}x{}",
        start_time.elapsed().as_millis(),
        diameter,
        sigma_color,
        sigma_space,
        width,
        height
    );

    Ok(output)
}
