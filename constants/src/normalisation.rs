/// Largest axis span of a point cloud after normalisation.
pub const TARGET_EXTENT: f64 = 1000.0;
