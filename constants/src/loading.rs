/// Keep every point unless a caller asks for decimation.
pub const DEFAULT_DECIMATE: usize = 1;

/// Maximum points handed to the display after decimation.
pub const DEFAULT_MAX_POINTS: usize = 1_000_000;

/// Number of f32 components per position (X, Y, Z).
pub const POSITION_STRIDE: usize = 3;

/// Native decoders report progress every this many points.
pub const DECODE_PROGRESS_INTERVAL: u64 = 1_000_000;

/// Leading bytes of an input buffer included in debug logs.
pub const BUFFER_PREVIEW_BYTES: usize = 16;
