//! Audio effects for Duet
//!
//! Every node in the effects pipeline implements [`Effect`]. Nodes process
//! stereo interleaved blocks in place and smooth their own parameter changes,
//! so a setter called between two blocks never produces a step in the output.

mod delay;
mod eq;
mod pitch;
mod reverb;

pub use delay::FeedbackDelay;
pub use eq::{EqBand, ThreeBandEq, EQ_GAIN_RANGE_DB};
pub use pitch::{PitchShift, PITCH_RANGE_SEMITONES};
pub use reverb::Reverb;

/// Trait for audio effects
pub trait Effect: Send {
    /// Process audio samples in place (stereo interleaved)
    fn process(&mut self, samples: &mut [f32]);

    /// Reset effect state
    fn reset(&mut self);

    /// Get effect name
    fn name(&self) -> &'static str;
}

/// One-pole smoothing step toward `target`
#[inline(always)]
pub(crate) fn smooth(current: f32, target: f32, coeff: f32) -> f32 {
    coeff * current + (1.0 - coeff) * target
}
