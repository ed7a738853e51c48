use constants::loading::{DEFAULT_DECIMATE, DEFAULT_MAX_POINTS, POSITION_STRIDE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::colour::correct_colours;
use crate::engine::assets::{Normalisation, PointCloudBounds, PointCloudGeometry, PointCloudStats};
use crate::engine::native::DecodeResult;

/// Display reduction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessOptions {
    /// Keep every n-th point. 0 and 1 keep everything.
    pub decimate: usize,
    /// Upper bound on displayed points after decimation.
    pub max_points: usize,
}

impl Default for PostProcessOptions {
    fn default() -> Self {
        Self {
            decimate: DEFAULT_DECIMATE,
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

/// Turns a raw decode into display geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointCloudPostProcessor {
    options: PostProcessOptions,
}

impl PointCloudPostProcessor {
    pub fn new(options: PostProcessOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PostProcessOptions {
        &self.options
    }

    /// Decimate, clamp, normalise and colour-correct.
    ///
    /// Colours are reduced with the same stride and prefix as positions so
    /// each colour stays with its point.
    pub fn process(&self, result: DecodeResult) -> PointCloudGeometry {
        let decoded_points = (result.positions.len() / POSITION_STRIDE) as u64;
        let max_values = self.options.max_points.saturating_mul(POSITION_STRIDE);

        let mut positions = decimate(result.positions, self.options.decimate);
        positions.truncate(max_values);

        let mut colours = result.colors.map(|colours| {
            let mut colours = decimate(colours, self.options.decimate);
            colours.truncate(max_values);
            colours
        });

        let source_bounds = PointCloudBounds::from_positions(&positions);
        let normalisation = Normalisation::from_bounds(&source_bounds);
        normalisation.apply(&mut positions);
        let bounds = normalisation.transform_bounds(&source_bounds);

        debug!(
            "Normalised point cloud: centre {:?}, size {:?}, scale {:.6}, bounds {:?}",
            normalisation.center, normalisation.size, normalisation.scale, bounds
        );

        if let Some(colours) = colours.as_mut() {
            correct_colours(colours);
            debug!("RGB colours applied ({} verts)", colours.len() / 3);
        }

        let stats = PointCloudStats {
            decode_ms: result.decode_time_ms,
            decoded_points,
            displayed_points: (positions.len() / POSITION_STRIDE) as u64,
            has_color: colours.is_some(),
        };

        PointCloudGeometry {
            positions,
            colours,
            bounds,
            normalisation,
            stats,
        }
    }
}

/// Keep every `factor`-th triple, starting with the first.
fn decimate(values: Vec<f32>, factor: usize) -> Vec<f32> {
    if factor <= 1 {
        return values;
    }
    values
        .chunks_exact(POSITION_STRIDE)
        .step_by(factor)
        .flatten()
        .copied()
        .collect()
}
