//! Shared tuning constants for the point cloud loading pipeline.

/// Colour correction applied to decoded RGB channels.
pub mod colour;

/// Defaults for decimation and point-count clamping.
pub mod loading;

/// Foreign heap sizing and memory budget defaults.
pub mod memory;

/// Canonical extent used when recentring and rescaling coordinates.
pub mod normalisation;
