//! Mask-contour pipeline: fixed recipe over externally produced masks.
//!
//! Each mask (typically one per candidate grain from an ML segmentor) is
//! opened, blurred, thresholded and traced. The recipe is deliberately not
//! configurable: it mirrors an established reference algorithm exactly, down
//! to the adaptive simplification epsilon of 0.5% of the contour perimeter.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::contrast::{ThresholdType, threshold};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::open;
use tracing::{debug, warn};

use crate::error::{DetectError, Result};
use crate::grain::{GrainAssembler, arc_length};
use crate::types::{DetectedGrain, MaskBatch, MaskInput};

const OPEN_KERNEL_RADIUS: u8 = 2; // 5x5 structuring element
const BLUR_SIGMA: f32 = 1.0; // 5x5-equivalent Gaussian
const BINARY_THRESHOLD: u8 = 127;
/// Adaptive Douglas-Peucker epsilon, as a fraction of contour perimeter.
const EPSILON_PER_PERIMETER: f64 = 0.005;

/// Decode a base64 PNG into a luma mask at preview resolution.
pub fn decode_mask(mask: &MaskInput, preview_width: u32, preview_height: u32) -> Result<GrayImage> {
    if preview_width == 0 || preview_height == 0 {
        return Err(DetectError::InvalidInput(
            "preview resolution has zero dimension".into(),
        ));
    }
    // Tolerate a data-URL wrapper around the payload.
    let payload = mask
        .png_base64
        .rsplit_once(',')
        .map_or(mask.png_base64.as_str(), |(_, data)| data);
    let bytes = BASE64.decode(payload.trim())?;
    let decoded = image::load_from_memory(&bytes)?.to_luma8();

    if decoded.dimensions() == (preview_width, preview_height) {
        Ok(decoded)
    } else {
        Ok(image::imageops::resize(
            &decoded,
            preview_width,
            preview_height,
            image::imageops::FilterType::Triangle,
        ))
    }
}

/// Extract grains from one decoded mask.
///
/// Contours come from the full tree (not just external borders): a mask may
/// legitimately contain several disjoint blobs or nested regions.
pub fn grains_from_mask(mask: &GrayImage, batch: &MaskBatch, confidence: f64) -> Vec<DetectedGrain> {
    let opened = open(mask, Norm::LInf, OPEN_KERNEL_RADIUS);
    let blurred = gaussian_blur_f32(&opened, BLUR_SIGMA);
    let binary = threshold(&blurred, BINARY_THRESHOLD, ThresholdType::Binary);

    // Preview and original aspect ratios are assumed equal, but integer
    // rounding can make the per-axis factors differ slightly.
    let assembler = GrainAssembler {
        scale_x: batch.original_width as f64 / batch.preview_width as f64,
        scale_y: batch.original_height as f64 / batch.preview_height as f64,
        min_area: 0.0,
    };

    let mut grains = Vec::new();
    for contour in find_contours::<i32>(&binary) {
        let epsilon = EPSILON_PER_PERIMETER * arc_length(&contour.points);
        if let Some(grain) = assembler.assemble(&contour.points, Some(epsilon), Some(confidence)) {
            grains.push(grain);
        }
    }
    grains
}

/// Process a whole batch strictly sequentially, concatenating every mask's
/// grains into one flat list.
///
/// A single failing mask is logged and contributes zero grains; it does not
/// abort the batch. Overlap between masks is not resolved here. The
/// `on_progress` callback fires with 1-based `(current, total)` as each mask
/// starts; returning `false` cancels the batch cooperatively at the next
/// mask boundary.
pub fn process_mask_batch(
    batch: &MaskBatch,
    mut on_progress: impl FnMut(usize, usize) -> bool,
) -> Result<Vec<DetectedGrain>> {
    if batch.original_width == 0 || batch.original_height == 0 {
        return Err(DetectError::InvalidInput(
            "original resolution has zero dimension".into(),
        ));
    }

    let total = batch.masks.len();
    let mut grains = Vec::new();
    for (i, mask) in batch.masks.iter().enumerate() {
        if !on_progress(i + 1, total) {
            return Err(DetectError::Cancelled {
                current: i + 1,
                total,
            });
        }
        match decode_mask(mask, batch.preview_width, batch.preview_height) {
            Ok(decoded) => {
                let found = grains_from_mask(&decoded, batch, mask.confidence);
                debug!(mask = i + 1, total, grains = found.len(), "mask processed");
                grains.extend(found);
            }
            Err(err) => {
                warn!(mask = i + 1, total, %err, "skipping undecodable mask");
            }
        }
    }
    Ok(grains)
}
