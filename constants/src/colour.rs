/// Largest value a 16-bit LAS colour channel can hold.
pub const U16_CHANNEL_MAX: f32 = 65535.0;

/// Display gamma; channels are raised to `1 / COLOUR_GAMMA`.
pub const COLOUR_GAMMA: f32 = 2.2;

/// Brightening factor applied after gamma expansion so dark scans stay visible.
pub const COLOUR_BOOST: f32 = 1.8;

/// Number of interleaved channels per colour (R, G, B).
pub const COLOUR_CHANNELS: usize = 3;
