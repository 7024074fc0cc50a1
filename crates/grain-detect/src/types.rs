use std::sync::atomic::{AtomicU64, Ordering};

use geo_types::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::presets::DetectionSettings;

/// Axis-aligned bounding box in original-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Optional polygon restricting detection to a sub-region of the image.
///
/// Vertices are in original-image pixel coordinates. `coverage_percent` is
/// informational only; the rasterized polygon is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionMask {
    pub vertices: Vec<[f64; 2]>,
    pub coverage_percent: Option<f64>,
}

/// One segmented grain, the canonical output unit of both pipelines.
///
/// The contour is an implicitly closed polygon (no duplicated end point) with
/// integer vertices in original-image coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedGrain {
    /// Process-local unique id, not a persisted identity.
    pub temp_id: String,
    pub contour: Vec<[i32; 2]>,
    /// Polygon area in original-image pixel^2 units.
    pub area: f64,
    pub centroid: [i32; 2],
    pub bounding_box: BoundingBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perimeter: Option<f64>,
    /// `4*pi*area / perimeter^2`, clamped to [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circularity: Option<f64>,
    /// Externally supplied per-mask score, carried through unmodified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl DetectedGrain {
    /// Convert to a geo-types Polygon for geometric operations.
    pub fn to_geo_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self
            .contour
            .iter()
            .map(|&[x, y]| Coord {
                x: x as f64,
                y: y as f64,
            })
            .collect();
        Polygon::new(LineString::new(coords), vec![])
    }
}

/// Result of one classical-pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub grains: Vec<DetectedGrain>,
    pub processing_time_ms: f64,
    /// Echo of the input settings.
    pub settings: DetectionSettings,
    /// Original dimensions, before any downscale.
    pub image_dimensions: ImageDimensions,
    /// Processing resolution over original resolution; 1.0 when no downscale
    /// was needed.
    pub scale_factor: f64,
}

/// One externally produced mask, as received over the worker boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskInput {
    /// Base64-encoded PNG; a `data:` URL prefix is tolerated.
    pub png_base64: String,
    pub confidence: f64,
}

/// A batch of masks plus the two resolutions needed to map preview-space
/// contours back to original-image coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskBatch {
    pub masks: Vec<MaskInput>,
    pub original_width: u32,
    pub original_height: u32,
    pub preview_width: u32,
    pub preview_height: u32,
}

static NEXT_GRAIN_ID: AtomicU64 = AtomicU64::new(0);

/// Mint a process-locally unique grain id.
pub(crate) fn next_temp_id() -> String {
    let n = NEXT_GRAIN_ID.fetch_add(1, Ordering::Relaxed);
    format!("grain-{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_ids_are_unique() {
        let a = next_temp_id();
        let b = next_temp_id();
        assert_ne!(a, b);
    }

    #[test]
    fn grain_serializes_without_absent_optionals() {
        let grain = DetectedGrain {
            temp_id: "grain-0".into(),
            contour: vec![[0, 0], [10, 0], [10, 10]],
            area: 50.0,
            centroid: [7, 3],
            bounding_box: BoundingBox {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
            perimeter: None,
            circularity: None,
            confidence: None,
        };
        let json = serde_json::to_value(&grain).unwrap();
        assert!(json.get("perimeter").is_none());
        assert!(json.get("confidence").is_none());
    }
}
