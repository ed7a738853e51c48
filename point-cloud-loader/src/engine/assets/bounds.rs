/// Point cloud coordinate bounds tracking
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Points per parallel bounds chunk.
const BOUNDS_CHUNK_POINTS: usize = 25_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointCloudBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl PointCloudBounds {
    /// Create new bounds initialised to infinity values
    pub fn new() -> Self {
        Self {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
            min_z: f64::INFINITY,
            max_z: f64::NEG_INFINITY,
        }
    }

    /// Update bounds with a new point
    pub fn update(&mut self, x: f64, y: f64, z: f64) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
        self.min_z = self.min_z.min(z);
        self.max_z = self.max_z.max(z);
    }

    /// Grow to cover `other` as well.
    pub fn merge(mut self, other: &Self) -> Self {
        self.min_x = self.min_x.min(other.min_x);
        self.max_x = self.max_x.max(other.max_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_y = self.max_y.max(other.max_y);
        self.min_z = self.min_z.min(other.min_z);
        self.max_z = self.max_z.max(other.max_z);
        self
    }

    /// Bounds of interleaved XYZ positions, computed in parallel chunks.
    pub fn from_positions(positions: &[f32]) -> Self {
        positions
            .par_chunks(BOUNDS_CHUNK_POINTS * 3)
            .map(|chunk| {
                let mut local_bounds = Self::new();
                for point in chunk.chunks_exact(3) {
                    local_bounds.update(point[0] as f64, point[1] as f64, point[2] as f64);
                }
                local_bounds
            })
            .reduce_with(|a, b| a.merge(&b))
            .unwrap_or_else(Self::new)
    }

    /// Bounds from a `[min x, y, z, max x, y, z]` array.
    pub fn from_min_max(values: &[f32; 6]) -> Self {
        Self {
            min_x: values[0] as f64,
            min_y: values[1] as f64,
            min_z: values[2] as f64,
            max_x: values[3] as f64,
            max_y: values[4] as f64,
            max_z: values[5] as f64,
        }
    }

    /// True until at least one point has been added.
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x
    }

    /// World space dimensions
    pub fn dimensions(&self) -> (f64, f64, f64) {
        (
            self.max_x - self.min_x,
            self.max_y - self.min_y,
            self.max_z - self.min_z,
        )
    }

    pub fn center(&self) -> (f64, f64, f64) {
        (
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
            (self.min_z + self.max_z) * 0.5,
        )
    }

    /// Largest of the three axis spans.
    pub fn max_extent(&self) -> f64 {
        let (x, y, z) = self.dimensions();
        x.max(y).max(z)
    }
}

impl Default for PointCloudBounds {
    fn default() -> Self {
        Self::new()
    }
}
