//! Contour → [`DetectedGrain`] conversion.
//!
//! This is the single place scale correction happens: both pipelines hand
//! every contour (in processing-resolution pixels) through an assembler
//! carrying the multipliers back to original-image coordinates, so all
//! size-derived measurements come out in consistent units.

use geo::{Area, BoundingRect, Centroid, Simplify};
use geo_types::{Coord, LineString, Polygon};
use imageproc::point::Point;

use crate::types::{BoundingBox, DetectedGrain, next_temp_id};

/// Closed-polygon arc length of a contour, in its own coordinate units.
pub fn arc_length(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        let dx = (b.x - a.x) as f64;
        let dy = (b.y - a.y) as f64;
        total += (dx * dx + dy * dy).sqrt();
    }
    total
}

/// Converts raw contours into normalized grain records.
#[derive(Debug, Clone)]
pub struct GrainAssembler {
    /// Multiplier from processing-resolution X to original-image X.
    pub scale_x: f64,
    /// Multiplier from processing-resolution Y to original-image Y.
    pub scale_y: f64,
    /// Area floor in original-image pixel^2 units.
    pub min_area: f64,
}

impl GrainAssembler {
    /// Uniform scaling, as used by the classical pipeline: `scale_factor` is
    /// the downscale ratio (processing over original), so the correction back
    /// to original units is its inverse.
    pub fn uniform(scale_factor: f64, min_area: f64) -> Self {
        let inv = 1.0 / scale_factor;
        Self {
            scale_x: inv,
            scale_y: inv,
            min_area,
        }
    }

    /// Build one grain from a contour.
    ///
    /// `simplify_epsilon` is a Douglas-Peucker tolerance in
    /// processing-resolution pixels; `None` keeps the raw contour. Returns
    /// `None` for contours that simplify below 3 vertices or fall under the
    /// area floor.
    pub fn assemble(
        &self,
        contour: &[Point<i32>],
        simplify_epsilon: Option<f64>,
        confidence: Option<f64>,
    ) -> Option<DetectedGrain> {
        if contour.len() < 3 {
            return None;
        }

        let raw: Vec<Coord<f64>> = contour
            .iter()
            .map(|p| Coord {
                x: p.x as f64,
                y: p.y as f64,
            })
            .collect();

        let simplified: Vec<Coord<f64>> = match simplify_epsilon {
            Some(epsilon) if epsilon > 0.0 => LineString::new(raw)
                .simplify(&epsilon)
                .coords()
                .copied()
                .collect(),
            _ => raw,
        };
        if simplified.len() < 3 {
            return None;
        }

        // From here on everything is in original-image coordinates.
        let scaled: Vec<Coord<f64>> = simplified
            .iter()
            .map(|c| Coord {
                x: c.x * self.scale_x,
                y: c.y * self.scale_y,
            })
            .collect();

        let polygon = Polygon::new(LineString::new(scaled.clone()), vec![]);
        let area = polygon.unsigned_area();
        if area < self.min_area {
            return None;
        }

        let centroid = polygon.centroid()?;
        let rect = polygon.bounding_rect()?;

        let mut perimeter = 0.0;
        for i in 0..scaled.len() {
            let a = scaled[i];
            let b = scaled[(i + 1) % scaled.len()];
            perimeter += ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
        }
        let circularity = if perimeter > 0.0 {
            (4.0 * std::f64::consts::PI * area / (perimeter * perimeter)).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Some(DetectedGrain {
            temp_id: next_temp_id(),
            contour: scaled
                .iter()
                .map(|c| [c.x.round() as i32, c.y.round() as i32])
                .collect(),
            area,
            centroid: [centroid.x().round() as i32, centroid.y().round() as i32],
            bounding_box: BoundingBox {
                x: rect.min().x.round() as i32,
                y: rect.min().y.round() as i32,
                width: rect.width().round() as i32,
                height: rect.height().round() as i32,
            },
            perimeter: Some(perimeter),
            circularity: Some(circularity),
            confidence,
        })
    }
}
