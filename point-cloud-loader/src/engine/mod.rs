/// Bounds tracking, normalisation transform and owned display geometry.
pub mod assets;

/// Request sequencing, byte acquisition and HTTP transport.
///
/// Hosts the controller that discards stale reload results.
pub mod loading;

/// Allocation ledger and scoped budget reservations.
pub mod memory;

/// Native decoder boundary: module contract, foreign heap, lifecycle and bridge.
///
/// Guarantees every foreign heap region is released exactly once per decode.
pub mod native;

/// Decimation, clamping, normalisation and colour correction.
pub mod processing;
