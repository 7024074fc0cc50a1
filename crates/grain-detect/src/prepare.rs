//! Input preparation: resolution capping and region-of-interest masking.
//!
//! Watershed and edge detection are O(pixels), so inputs larger than
//! [`MAX_PROCESSING_SIZE`] on their longest side are resampled down before
//! detection and every downstream measurement is corrected back to original
//! units through the returned scale factor.

use image::{RgbaImage, imageops};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use tracing::debug;

use crate::error::{DetectError, Result};
use crate::types::RegionMask;

/// Longest side, in pixels, above which inputs are downscaled.
pub const MAX_PROCESSING_SIZE: u32 = 2048;

/// A pixel buffer at processing resolution plus the factor that maps it back
/// to original coordinates.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub pixels: RgbaImage,
    /// Processing over original resolution, in (0, 1].
    pub scale_factor: f64,
}

/// Cap the input at processing resolution.
///
/// Returns the buffer unchanged with factor 1.0 when it already fits.
pub fn downscale(image: &RgbaImage) -> Result<PreparedImage> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(DetectError::InvalidInput(format!(
            "image has zero dimension ({w}x{h})"
        )));
    }

    let longest = w.max(h);
    if longest <= MAX_PROCESSING_SIZE {
        return Ok(PreparedImage {
            pixels: image.clone(),
            scale_factor: 1.0,
        });
    }

    let scale_factor = MAX_PROCESSING_SIZE as f64 / longest as f64;
    let new_w = (w as f64 * scale_factor).round() as u32;
    let new_h = (h as f64 * scale_factor).round() as u32;
    debug!(from = ?(w, h), to = ?(new_w, new_h), scale_factor, "downscaling input");

    let pixels = imageops::resize(image, new_w, new_h, imageops::FilterType::CatmullRom);
    Ok(PreparedImage {
        pixels,
        scale_factor,
    })
}

/// Zero out every pixel outside the region polygon.
///
/// Vertices arrive in original-image coordinates and are scaled by
/// `scale_factor` to match the (possibly downscaled) buffer before being
/// rasterized with a scanline fill.
pub fn apply_region_mask(
    image: &mut RgbaImage,
    region: &RegionMask,
    scale_factor: f64,
) -> Result<()> {
    if region.vertices.len() < 3 {
        return Err(DetectError::InvalidInput(format!(
            "region mask needs at least 3 vertices, got {}",
            region.vertices.len()
        )));
    }

    let mut poly: Vec<Point<i32>> = region
        .vertices
        .iter()
        .map(|&[x, y]| {
            Point::new(
                (x * scale_factor).round() as i32,
                (y * scale_factor).round() as i32,
            )
        })
        .collect();
    // draw_polygon_mut rejects an explicitly closed ring.
    if poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    if poly.len() < 3 {
        return Err(DetectError::InvalidInput(
            "region mask degenerates to fewer than 3 distinct vertices".into(),
        ));
    }

    let mut stencil = image::GrayImage::new(image.width(), image.height());
    draw_polygon_mut(&mut stencil, &poly, image::Luma([255u8]));

    for (pixel, mask) in image.pixels_mut().zip(stencil.pixels()) {
        if mask.0[0] == 0 {
            *pixel = image::Rgba([0, 0, 0, 255]);
        }
    }
    Ok(())
}
