//! Feedback delay (echo) with smoothed wet level.
//!
//! Features:
//! - Linear interpolation for fractional delay times
//! - Highpass filter on the feedback path (prevents mud buildup)
//! - Soft saturation on feedback to stop runaway repeats
//! - Smoothed delay time and wet level for click-free live changes

use super::{smooth, Effect};
use std::f32::consts::PI;

/// Maximum delay time in seconds
const MAX_DELAY_SECS: f32 = 2.0;

/// Default delay time: an eighth note at 120 BPM
const DEFAULT_DELAY_MS: f32 = 250.0;

/// Default feedback amount
const DEFAULT_FEEDBACK: f32 = 0.35;

/// Stereo feedback delay
pub struct FeedbackDelay {
    sample_rate: f32,
    /// Delay buffer (stereo interleaved: L,R,L,R,...)
    buffer: Vec<f32>,
    /// Buffer length in stereo frames
    buffer_frames: usize,
    /// Write position (in frames, not samples)
    write_pos: usize,
    /// Delay time in fractional frames
    delay_frames: f32,
    /// Target delay (for smoothing)
    target_delay: f32,
    /// Feedback amount (0.0 - 0.95)
    feedback: f32,
    /// Highpass filter state for feedback (prevents mud)
    hp_state_l: f32,
    hp_state_r: f32,
    /// Highpass coefficient
    hp_coeff: f32,
    /// Wet level requested by the user
    wet_target: f32,
    /// Wet level currently applied
    wet_current: f32,
}

impl FeedbackDelay {
    /// Delay time smoothing coefficient
    const DELAY_SMOOTH_COEFF: f32 = 0.9995;
    /// Wet smoothing coefficient (~10ms at 48kHz)
    const WET_SMOOTH_COEFF: f32 = 0.998;

    /// Create a new feedback delay with the given wet level
    pub fn new(sample_rate: u32, wet: f32) -> Self {
        let sr = sample_rate as f32;
        let buffer_frames = (sr * MAX_DELAY_SECS) as usize;

        // Highpass at 80Hz to prevent bass buildup
        let hp_coeff = (-2.0 * PI * 80.0 / sr).exp();
        let delay_frames = DEFAULT_DELAY_MS / 1000.0 * sr;
        let wet = wet.clamp(0.0, 1.0);

        Self {
            sample_rate: sr,
            buffer: vec![0.0; buffer_frames * 2],
            buffer_frames,
            write_pos: 0,
            delay_frames,
            target_delay: delay_frames,
            feedback: DEFAULT_FEEDBACK,
            hp_state_l: 0.0,
            hp_state_r: 0.0,
            hp_coeff,
            wet_target: wet,
            wet_current: wet,
        }
    }

    /// Set delay time in milliseconds
    pub fn set_delay_ms(&mut self, ms: f32) {
        let clamped_ms = ms.clamp(1.0, MAX_DELAY_SECS * 1000.0);
        self.target_delay = (clamped_ms / 1000.0) * self.sample_rate;
    }

    /// Get delay time in milliseconds
    pub fn delay_ms(&self) -> f32 {
        (self.target_delay / self.sample_rate) * 1000.0
    }

    /// Set feedback amount (0.0 - 0.95)
    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, 0.95);
    }

    /// Get feedback amount
    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    /// Set wet level (0.0 - 1.0)
    pub fn set_wet(&mut self, wet: f32) {
        if !wet.is_finite() {
            return;
        }
        self.wet_target = wet.clamp(0.0, 1.0);
    }

    /// Get the requested wet level
    pub fn wet(&self) -> f32 {
        self.wet_target
    }

    /// Read from the delay line with linear interpolation
    #[inline]
    fn read_interpolated(&self, delay_frames: f32) -> (f32, f32) {
        let int_delay = delay_frames as usize;
        let frac = delay_frames - int_delay as f32;

        let pos = (self.write_pos + self.buffer_frames - int_delay) % self.buffer_frames;
        let prev = if pos == 0 { self.buffer_frames - 1 } else { pos - 1 };

        let (i0, i1) = (pos * 2, prev * 2);
        let l = self.buffer[i0] * (1.0 - frac) + self.buffer[i1] * frac;
        let r = self.buffer[i0 + 1] * (1.0 - frac) + self.buffer[i1 + 1] * frac;
        (l, r)
    }

    /// Soft saturation for feedback path
    #[inline(always)]
    fn soft_saturate(x: f32) -> f32 {
        // Fast tanh approximation
        x / (1.0 + x.abs())
    }
}

impl Effect for FeedbackDelay {
    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(2) {
            self.wet_current = smooth(self.wet_current, self.wet_target, Self::WET_SMOOTH_COEFF);
            self.delay_frames =
                smooth(self.delay_frames, self.target_delay, Self::DELAY_SMOOTH_COEFF);

            let effective_delay = self.delay_frames.clamp(2.0, self.buffer_frames as f32 - 2.0);
            let (delayed_l, delayed_r) = self.read_interpolated(effective_delay);

            // Highpass filter on feedback path (prevent mud buildup)
            let hp_in_l = frame[0] + delayed_l * self.feedback;
            let hp_in_r = frame[1] + delayed_r * self.feedback;

            let hp_out_l = hp_in_l - self.hp_state_l;
            let hp_out_r = hp_in_r - self.hp_state_r;
            self.hp_state_l = hp_in_l * (1.0 - self.hp_coeff) + self.hp_state_l * self.hp_coeff;
            self.hp_state_r = hp_in_r * (1.0 - self.hp_coeff) + self.hp_state_r * self.hp_coeff;

            let write_idx = self.write_pos * 2;
            self.buffer[write_idx] = Self::soft_saturate(hp_out_l);
            self.buffer[write_idx + 1] = Self::soft_saturate(hp_out_r);

            let dry = 1.0 - self.wet_current;
            frame[0] = frame[0] * dry + delayed_l * self.wet_current;
            frame[1] = frame[1] * dry + delayed_r * self.wet_current;

            self.write_pos = (self.write_pos + 1) % self.buffer_frames;
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.delay_frames = self.target_delay;
        self.hp_state_l = 0.0;
        self.hp_state_r = 0.0;
    }

    fn name(&self) -> &'static str {
        "FeedbackDelay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_passthrough() {
        let mut delay = FeedbackDelay::new(48000, 0.0);
        let mut samples = vec![0.5, -0.5, 0.25, -0.25];
        let original = samples.clone();
        delay.process(&mut samples);

        for (out, inp) in samples.iter().zip(original.iter()) {
            assert!((out - inp).abs() < 1e-6);
        }
    }

    #[test]
    fn test_echo_arrives_after_delay_time() {
        let mut delay = FeedbackDelay::new(1000, 1.0);
        delay.set_delay_ms(10.0);
        delay.reset();

        // Impulse on the first frame, silence afterwards
        let mut samples = vec![0.0f32; 40];
        samples[0] = 1.0;
        samples[1] = 1.0;
        delay.process(&mut samples);

        let echo_frame = samples
            .chunks(2)
            .enumerate()
            .skip(1)
            .find(|(_, f)| f[0].abs() > 0.1)
            .map(|(i, _)| i);
        assert_eq!(echo_frame, Some(10));
    }

    #[test]
    fn test_wet_clamping() {
        let mut delay = FeedbackDelay::new(48000, 0.2);
        delay.set_wet(3.0);
        assert_eq!(delay.wet(), 1.0);
        delay.set_wet(-1.0);
        assert_eq!(delay.wet(), 0.0);
    }

    #[test]
    fn test_soft_saturate() {
        assert!(FeedbackDelay::soft_saturate(10.0) < 1.0);
        assert!(FeedbackDelay::soft_saturate(-10.0) > -1.0);
        assert!((FeedbackDelay::soft_saturate(0.1) - 0.091).abs() < 0.01);
    }

    #[test]
    fn test_wet_step_is_smoothed() {
        let mut delay = FeedbackDelay::new(48000, 0.0);
        let mut samples = vec![0.5f32; 64];
        delay.process(&mut samples);

        delay.set_wet(1.0);
        let mut samples = vec![0.5f32; 4];
        delay.process(&mut samples);

        // Delay line holds only ~0.5 input, so a hard switch would drop the
        // first frame to the (silent) delayed signal
        assert!(samples[0] > 0.45);
    }
}
