//! End-to-end scenarios for both detection pipelines.

use grain_detect::{
    DetectionSettings, MaskBatch, MaskInput, PresetKind, RegionMask, detect_grains,
    process_mask_batch,
};
use image::RgbaImage;
use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

fn settings() -> DetectionSettings {
    DetectionSettings {
        sensitivity: 50.0,
        min_grain_size: 100.0,
        edge_contrast: 50.0,
        simplify_tolerance: 2.0,
        simplify_outlines: true,
        preset_name: None,
    }
}

/// Bright cells on a dark background, separated by thin dark seams.
fn cell_grid(width: u32, height: u32, cell: u32, gap: u32) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width, height, image::Rgba([15, 15, 15, 255]));
    let pitch = cell + gap;
    for (x, y, p) in img.enumerate_pixels_mut() {
        if x % pitch < cell && y % pitch < cell {
            *p = image::Rgba([215, 215, 215, 255]);
        }
    }
    img
}

fn encoded_disc(size: u32, radius: f64) -> String {
    let mut img = image::GrayImage::new(size, size);
    let c = size as f64 / 2.0;
    for (x, y, p) in img.enumerate_pixels_mut() {
        let dx = x as f64 - c;
        let dy = y as f64 - c;
        if (dx * dx + dy * dy).sqrt() <= radius {
            p.0[0] = 255;
        }
    }
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    BASE64.encode(&bytes)
}

#[test]
fn blank_image_is_a_valid_empty_result() {
    let img = RgbaImage::from_pixel(512, 512, image::Rgba([0, 0, 0, 255]));
    let result = detect_grains(&img, &settings(), None).unwrap();
    assert!(result.grains.is_empty());
    assert_eq!(result.scale_factor, 1.0);
}

#[test]
fn every_grain_satisfies_the_output_invariants() {
    let img = cell_grid(320, 320, 60, 8);
    let result = detect_grains(&img, &settings(), None).unwrap();
    assert!(!result.grains.is_empty());

    let mut ids = std::collections::HashSet::new();
    for grain in &result.grains {
        assert!(ids.insert(grain.temp_id.clone()), "duplicate temp id");
        assert!(grain.contour.len() >= 3);
        assert!(grain.area >= result.settings.min_grain_size);
        let circ = grain.circularity.unwrap();
        assert!((0.0..=1.0).contains(&circ));
        assert!(grain.bounding_box.width > 0 && grain.bounding_box.height > 0);
        // Contours stay inside the original coordinate space.
        for &[x, y] in &grain.contour {
            assert!((0..320).contains(&x) && (0..320).contains(&y));
        }
    }
}

#[test]
fn settings_are_echoed_and_timing_is_reported() {
    let img = cell_grid(128, 128, 28, 4);
    let mut s = settings();
    s.preset_name = Some("granite-xpl".into());
    let result = detect_grains(&img, &s, None).unwrap();
    assert_eq!(result.settings, s);
    assert!(result.processing_time_ms >= 0.0);
    assert_eq!(result.image_dimensions.width, 128);
}

#[test]
fn region_mask_with_two_vertices_is_an_input_error() {
    let img = cell_grid(64, 64, 28, 4);
    let region = RegionMask {
        vertices: vec![[0.0, 0.0], [10.0, 10.0]],
        coverage_percent: Some(1.0),
    };
    assert!(detect_grains(&img, &settings(), Some(&region)).is_err());
}

#[test]
fn preset_catalog_drives_the_pipeline() {
    let img = cell_grid(192, 192, 40, 6);
    let result = detect_grains(&img, &PresetKind::Basalt.settings(), None).unwrap();
    assert_eq!(result.settings.preset_name.as_deref(), Some("basalt"));
}

#[test]
fn single_disc_mask_yields_one_round_grain() {
    let batch = MaskBatch {
        masks: vec![MaskInput {
            png_base64: encoded_disc(512, 50.0),
            confidence: 0.95,
        }],
        original_width: 512,
        original_height: 512,
        preview_width: 512,
        preview_height: 512,
    };
    let grains = process_mask_batch(&batch, |_, _| true).unwrap();
    assert_eq!(grains.len(), 1);

    let grain = &grains[0];
    let expected = std::f64::consts::PI * 50.0 * 50.0;
    assert!((grain.area - expected).abs() / expected < 0.05);
    assert!(grain.circularity.unwrap() > 0.9);
    assert_eq!(grain.confidence, Some(0.95));
}

#[test]
fn mask_grains_map_to_original_resolution() {
    // Preview 256, original 1024: every coordinate quadruples.
    let batch = MaskBatch {
        masks: vec![MaskInput {
            png_base64: encoded_disc(256, 40.0),
            confidence: 1.0,
        }],
        original_width: 1024,
        original_height: 1024,
        preview_width: 256,
        preview_height: 256,
    };
    let grains = process_mask_batch(&batch, |_, _| true).unwrap();
    assert_eq!(grains.len(), 1);
    let grain = &grains[0];
    assert!((grain.centroid[0] - 512).abs() <= 8);
    assert!((grain.centroid[1] - 512).abs() <= 8);
    let expected = std::f64::consts::PI * 160.0 * 160.0;
    assert!((grain.area - expected).abs() / expected < 0.08);
}

// Full-resolution watershed on a 4096x4096 input; slow in debug builds.
#[test]
#[ignore = "slow; exercises the oversized-input path end to end"]
fn oversized_image_reports_original_coordinates() {
    let img = cell_grid(4096, 4096, 900, 80);
    let result = detect_grains(&img, &settings(), None).unwrap();
    assert_eq!(result.scale_factor, 0.5);
    assert_eq!(result.image_dimensions.width, 4096);
    assert!(!result.grains.is_empty());

    // Grains from the far quadrant prove coordinates are in 4096-space.
    let beyond_processing_res = result
        .grains
        .iter()
        .any(|g| g.centroid[0] > 2048 || g.centroid[1] > 2048);
    assert!(beyond_processing_res);
    for grain in &result.grains {
        for &[x, y] in &grain.contour {
            assert!((0..4096).contains(&x) && (0..4096).contains(&y));
        }
    }
}
