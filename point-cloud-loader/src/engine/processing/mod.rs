//! Post-decode processing of point data before display.

/// Gamma expansion and brightening of normalised RGB channels.
pub mod colour;

/// Decimation, point-count clamping, normalisation and statistics.
pub mod post_process;

pub use post_process::{PointCloudPostProcessor, PostProcessOptions};
