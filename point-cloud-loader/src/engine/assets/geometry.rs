use constants::normalisation::TARGET_EXTENT;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::bounds::PointCloudBounds;

/// Display statistics for one load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointCloudStats {
    /// Time spent in the native decode call.
    pub decode_ms: f64,
    /// Points the decoder produced.
    pub decoded_points: u64,
    /// Points left after decimation and clamping.
    pub displayed_points: u64,
    pub has_color: bool,
}

/// Recentre-and-rescale transform mapping a cloud onto the canonical extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalisation {
    pub center: (f64, f64, f64),
    pub size: (f64, f64, f64),
    pub scale: f64,
}

impl Normalisation {
    /// Identity for empty clouds; scale stays 1 when every axis is flat.
    pub fn from_bounds(bounds: &PointCloudBounds) -> Self {
        if bounds.is_empty() {
            return Self {
                center: (0.0, 0.0, 0.0),
                size: (0.0, 0.0, 0.0),
                scale: 1.0,
            };
        }

        let extent = bounds.max_extent();
        Self {
            center: bounds.center(),
            size: bounds.dimensions(),
            scale: if extent > 0.0 {
                TARGET_EXTENT / extent
            } else {
                1.0
            },
        }
    }

    /// Transform interleaved XYZ positions in place.
    pub fn apply(&self, positions: &mut [f32]) {
        let (cx, cy, cz) = self.center;
        let scale = self.scale;
        positions.par_chunks_mut(3).for_each(|point| {
            point[0] = ((point[0] as f64 - cx) * scale) as f32;
            point[1] = ((point[1] as f64 - cy) * scale) as f32;
            point[2] = ((point[2] as f64 - cz) * scale) as f32;
        });
    }

    /// Where `bounds` lands after the transform.
    pub fn transform_bounds(&self, bounds: &PointCloudBounds) -> PointCloudBounds {
        if bounds.is_empty() {
            return *bounds;
        }
        let (cx, cy, cz) = self.center;
        PointCloudBounds {
            min_x: (bounds.min_x - cx) * self.scale,
            max_x: (bounds.max_x - cx) * self.scale,
            min_y: (bounds.min_y - cy) * self.scale,
            max_y: (bounds.max_y - cy) * self.scale,
            min_z: (bounds.min_z - cz) * self.scale,
            max_z: (bounds.max_z - cz) * self.scale,
        }
    }
}

/// Host-owned display geometry produced by one load.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudGeometry {
    /// Normalised interleaved XYZ.
    pub positions: Vec<f32>,
    /// Colour-corrected interleaved RGB, paired with `positions`.
    pub colours: Option<Vec<f32>>,
    /// Bounds of `positions` after normalisation.
    pub bounds: PointCloudBounds,
    pub normalisation: Normalisation,
    pub stats: PointCloudStats,
}

impl PointCloudGeometry {
    pub fn point_count(&self) -> usize {
        self.positions.len() / 3
    }
}
