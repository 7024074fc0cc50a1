//! Classical detection: preprocess → Canny edges → watershed → contours.
//!
//! The pipeline is a fixed sequential chain; a failing stage aborts the whole
//! call. A degenerate result (no edges, no surviving markers) is not a
//! failure: it produces an empty grain list.

use std::time::Instant;

use image::{GrayImage, RgbaImage, imageops};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::{Norm, euclidean_squared_distance_transform};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use imageproc::region_labelling::{Connectivity, connected_components};
use tracing::{debug, info};

use crate::error::Result;
use crate::grain::GrainAssembler;
use crate::prepare::{apply_region_mask, downscale};
use crate::presets::DetectionSettings;
use crate::types::{DetectedGrain, DetectionResult, ImageDimensions, RegionMask};
use crate::vision::{LabelMap, clahe, watershed};

/// Sigma of the 5x5-equivalent Gaussian used before equalization.
const BLUR_SIGMA: f32 = 1.0;
const CLAHE_CLIP_LIMIT: f64 = 2.0;
const CLAHE_TILES: u32 = 8;
/// Fraction of the distance-transform maximum kept as sure foreground.
const SURE_FOREGROUND_FRACTION: f64 = 0.4;

/// Run the full classical pipeline on a raw RGBA image.
///
/// Synchronous and CPU-bound; callers on latency-sensitive threads are
/// expected to off-load the call themselves.
pub fn detect_grains(
    image: &RgbaImage,
    settings: &DetectionSettings,
    region: Option<&RegionMask>,
) -> Result<DetectionResult> {
    let started = Instant::now();
    let (orig_w, orig_h) = image.dimensions();

    let mut prepared = downscale(image)?;
    if let Some(region) = region {
        apply_region_mask(&mut prepared.pixels, region, prepared.scale_factor)?;
    }
    let scale_factor = prepared.scale_factor;

    let relief = preprocess(&prepared.pixels);
    let edges = detect_edges(&relief, settings);

    let assembler = GrainAssembler::uniform(scale_factor, settings.min_grain_size);
    let epsilon = settings
        .simplify_outlines
        .then_some(settings.simplify_tolerance);

    let grains = match build_markers(&edges) {
        Some(mut markers) => {
            watershed(&relief, &mut markers);
            extract_grains(&markers, &assembler, epsilon)
        }
        None => {
            debug!("no watershed seeds survived; returning empty result");
            Vec::new()
        }
    };

    let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!(
        grains = grains.len(),
        scale_factor, processing_time_ms, "classical detection finished"
    );

    Ok(DetectionResult {
        grains,
        processing_time_ms,
        settings: settings.clone(),
        image_dimensions: ImageDimensions {
            width: orig_w,
            height: orig_h,
        },
        scale_factor,
    })
}

/// Grayscale → blur → CLAHE. Normalizes illumination and suppresses sensor
/// noise ahead of edge detection; the result doubles as the watershed relief.
fn preprocess(pixels: &RgbaImage) -> GrayImage {
    let gray = imageops::grayscale(pixels);
    let blurred = gaussian_blur_f32(&gray, BLUR_SIGMA);
    clahe(&blurred, CLAHE_CLIP_LIMIT, CLAHE_TILES, CLAHE_TILES)
}

/// Canny with sensitivity-mapped thresholds, then a small dilation to bridge
/// gaps in weak boundaries.
fn detect_edges(relief: &GrayImage, settings: &DetectionSettings) -> GrayImage {
    let low = (150.0 - settings.sensitivity).max(30.0) as f32;
    let high = (250.0 - settings.sensitivity).max(100.0) as f32;
    let edges = canny(relief, low, high);

    let kernel = ((3.0 - settings.edge_contrast / 50.0).round() as i64).max(1);
    debug!(low, high, kernel, "edge detection");
    // Square structuring element of size `kernel`; radius 0 is a no-op.
    let radius = (kernel / 2) as u8;
    if radius > 0 {
        dilate(&edges, Norm::LInf, radius)
    } else {
        edges
    }
}

/// Derive the watershed marker image from the edge map.
///
/// Returns `None` when no seed region survives thresholding (blank or
/// featureless input).
fn build_markers(edges: &GrayImage) -> Option<LabelMap> {
    let (w, h) = edges.dimensions();
    if edges.as_raw().iter().all(|&p| p == 0) {
        return None;
    }

    // Distance of every pixel to the nearest edge: the distance transform of
    // the inverted edge map. Grain centers are the local maxima.
    let squared = euclidean_squared_distance_transform(edges);
    let mut max_dist = 0.0f64;
    for p in squared.pixels() {
        max_dist = max_dist.max(p.0[0].sqrt());
    }
    if max_dist <= 0.0 {
        return None;
    }

    // Sure foreground: pixels farther from any edge than 40% of the maximum.
    let cutoff = SURE_FOREGROUND_FRACTION * max_dist;
    let mut sure_fg = GrayImage::new(w, h);
    for (x, y, p) in squared.enumerate_pixels() {
        if p.0[0].sqrt() > cutoff {
            sure_fg.put_pixel(x, y, image::Luma([255u8]));
        }
    }

    // Sure background: the inverted edge map dilated three times with a 3x3
    // kernel. Everything between the two is unknown territory for watershed.
    let mut inverted = edges.clone();
    for p in inverted.pixels_mut() {
        p.0[0] = if p.0[0] == 0 { 255 } else { 0 };
    }
    let mut sure_bg = inverted;
    for _ in 0..3 {
        sure_bg = dilate(&sure_bg, Norm::LInf, 1);
    }

    let components = connected_components(&sure_fg, Connectivity::Four, image::Luma([0u8]));
    let seed_count = components.pixels().map(|p| p.0[0]).max().unwrap_or(0);
    if seed_count == 0 {
        return None;
    }

    // Background becomes label 1, seeds become 2..; unknown pixels stay 0 so
    // the flood decides their basin.
    let mut markers = LabelMap::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let unknown = sure_bg.get_pixel(x, y).0[0] == 255 && sure_fg.get_pixel(x, y).0[0] == 0;
            if unknown {
                continue;
            }
            markers.set(x, y, components.get_pixel(x, y).0[0] as i32 + 1);
        }
    }
    debug!(seeds = seed_count, max_dist, "watershed markers built");
    Some(markers)
}

/// One grain per marker id >= 2 (1 = background, -1 = ridge lines, 0 = never
/// claimed). Each basin's external contour goes through the shared assembler.
fn extract_grains(
    markers: &LabelMap,
    assembler: &GrainAssembler,
    epsilon: Option<f64>,
) -> Vec<DetectedGrain> {
    let mut grains = Vec::new();
    for label in 2..=markers.max_label() {
        let mask = markers.mask_of(label);
        let contour = find_contours::<i32>(&mask)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .max_by_key(|c| c.points.len());
        let Some(contour) = contour else { continue };
        if let Some(grain) = assembler.assemble(&contour.points, epsilon, None) {
            grains.push(grain);
        }
    }
    grains
}
