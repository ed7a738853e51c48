use constants::colour::{COLOUR_BOOST, COLOUR_GAMMA};
use rayon::prelude::*;

/// Gamma-expand and brighten one normalised channel.
///
/// The result is not clamped and exceeds 1.0 for most inputs above ~0.27;
/// renderers clamp on upload.
pub fn correct_channel(value: f32) -> f32 {
    value.powf(1.0 / COLOUR_GAMMA) * COLOUR_BOOST
}

/// Apply [`correct_channel`] to every channel in place.
pub fn correct_colours(colours: &mut [f32]) {
    colours
        .par_iter_mut()
        .for_each(|channel| *channel = correct_channel(*channel));
}
