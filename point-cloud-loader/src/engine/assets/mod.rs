/// Spatial bounds tracking with parallel accumulation over positions.
pub mod bounds;

/// Owned display geometry, normalisation transform and load statistics.
///
/// Produced by post-processing and held by the controller until the next reload.
pub mod geometry;

pub use bounds::PointCloudBounds;
pub use geometry::{Normalisation, PointCloudGeometry, PointCloudStats};
