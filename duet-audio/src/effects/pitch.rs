//! Delay-line pitch shifter.
//!
//! Two read taps sweep across a short window of the recent input at a rate
//! set by the pitch ratio. Each tap is faded with a sin² window that is zero
//! where the tap wraps around, and the two taps sit half a window apart so the
//! fades always sum to one. Tempo is untouched: this only retunes.

use super::{smooth, Effect};
use std::f32::consts::PI;

/// Grain window length in seconds
const WINDOW_SECS: f32 = 0.1;

/// Pitch range in semitones (both directions)
pub const PITCH_RANGE_SEMITONES: f32 = 12.0;

/// Granular pitch shifter
pub struct PitchShift {
    /// Delay buffer (stereo interleaved)
    buffer: Vec<f32>,
    buffer_frames: usize,
    write_pos: usize,
    /// Window length in frames
    window_frames: f32,
    /// Sweep phase of the first tap (0.0 - 1.0)
    phase: f32,
    semitones: f32,
    /// Smoothed pitch ratio
    ratio_current: f32,
    ratio_target: f32,
    /// Shifted/dry crossfade (0 at zero semitones)
    wet_current: f32,
}

impl PitchShift {
    /// Ratio smoothing coefficient
    const RATIO_SMOOTH_COEFF: f32 = 0.999;
    /// Dry/shifted crossfade coefficient (~10ms at 48kHz)
    const WET_SMOOTH_COEFF: f32 = 0.998;

    /// Create a new pitch shifter at the given shift
    pub fn new(sample_rate: u32, semitones: f32) -> Self {
        let window_frames = sample_rate as f32 * WINDOW_SECS;
        let buffer_frames = window_frames as usize + 4;

        let mut shifter = Self {
            buffer: vec![0.0; buffer_frames * 2],
            buffer_frames,
            write_pos: 0,
            window_frames,
            phase: 0.0,
            semitones: 0.0,
            ratio_current: 1.0,
            ratio_target: 1.0,
            wet_current: 0.0,
        };
        shifter.set_semitones(semitones);
        shifter.ratio_current = shifter.ratio_target;
        shifter.wet_current = shifter.wet_target();
        shifter
    }

    /// Set pitch shift in semitones, clamped to -12..=12
    ///
    /// A non-finite value is ignored and the previous shift stays.
    pub fn set_semitones(&mut self, semitones: f32) {
        if !semitones.is_finite() {
            return;
        }
        self.semitones = semitones.clamp(-PITCH_RANGE_SEMITONES, PITCH_RANGE_SEMITONES);
        self.ratio_target = 2.0f32.powf(self.semitones / 12.0);
    }

    /// Get current pitch shift
    pub fn semitones(&self) -> f32 {
        self.semitones
    }

    fn wet_target(&self) -> f32 {
        if self.semitones == 0.0 {
            0.0
        } else {
            1.0
        }
    }

    /// Read the delay line `delay` frames behind the write head
    #[inline]
    fn read(&self, delay: f32) -> (f32, f32) {
        let int_delay = delay as usize;
        let frac = delay - int_delay as f32;

        let pos = (self.write_pos + self.buffer_frames - int_delay) % self.buffer_frames;
        let prev = if pos == 0 { self.buffer_frames - 1 } else { pos - 1 };

        let (i0, i1) = (pos * 2, prev * 2);
        (
            self.buffer[i0] * (1.0 - frac) + self.buffer[i1] * frac,
            self.buffer[i0 + 1] * (1.0 - frac) + self.buffer[i1 + 1] * frac,
        )
    }

    /// Fade for a tap at the given sweep phase
    #[inline(always)]
    fn window(phase: f32) -> f32 {
        let s = (PI * phase).sin();
        s * s
    }
}

impl Effect for PitchShift {
    fn process(&mut self, samples: &mut [f32]) {
        let wet_target = self.wet_target();

        // Nothing to do once fully dry; keep the line fresh for the next shift
        if wet_target == 0.0 && self.wet_current < 0.0001 {
            self.wet_current = 0.0;
            for frame in samples.chunks_exact(2) {
                let idx = self.write_pos * 2;
                self.buffer[idx] = frame[0];
                self.buffer[idx + 1] = frame[1];
                self.write_pos = (self.write_pos + 1) % self.buffer_frames;
            }
            return;
        }

        for frame in samples.chunks_exact_mut(2) {
            let idx = self.write_pos * 2;
            self.buffer[idx] = frame[0];
            self.buffer[idx + 1] = frame[1];

            self.wet_current = smooth(self.wet_current, wet_target, Self::WET_SMOOTH_COEFF);
            self.ratio_current =
                smooth(self.ratio_current, self.ratio_target, Self::RATIO_SMOOTH_COEFF);

            // Pitching up shortens the delay over time, pitching down lengthens it
            let inc = (1.0 - self.ratio_current) / self.window_frames;
            self.phase = (self.phase + inc).rem_euclid(1.0);
            let phase_b = (self.phase + 0.5).rem_euclid(1.0);

            let (a_l, a_r) = self.read(1.0 + self.phase * self.window_frames);
            let (b_l, b_r) = self.read(1.0 + phase_b * self.window_frames);
            let gain_a = Self::window(self.phase);
            let gain_b = Self::window(phase_b);

            let shifted_l = a_l * gain_a + b_l * gain_b;
            let shifted_r = a_r * gain_a + b_r * gain_b;

            let dry = 1.0 - self.wet_current;
            frame[0] = frame[0] * dry + shifted_l * self.wet_current;
            frame[1] = frame[1] * dry + shifted_r * self.wet_current;

            self.write_pos = (self.write_pos + 1) % self.buffer_frames;
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.phase = 0.0;
        self.ratio_current = self.ratio_target;
    }

    fn name(&self) -> &'static str {
        "PitchShift"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semitone_clamping() {
        let mut ps = PitchShift::new(48000, 0.0);

        ps.set_semitones(50.0);
        assert_eq!(ps.semitones(), 12.0);

        ps.set_semitones(-24.0);
        assert_eq!(ps.semitones(), -12.0);

        ps.set_semitones(3.0);
        assert_eq!(ps.semitones(), 3.0);
    }

    #[test]
    fn test_zero_shift_passes_through() {
        let mut ps = PitchShift::new(48000, 0.0);
        let mut samples = vec![0.4, -0.4, 0.2, -0.2];
        let original = samples.clone();
        ps.process(&mut samples);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_windows_sum_to_one() {
        for i in 0..100 {
            let p = i as f32 / 100.0;
            let sum = PitchShift::window(p) + PitchShift::window((p + 0.5) % 1.0);
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_shifted_output_is_bounded() {
        let mut ps = PitchShift::new(48000, 7.0);
        let mut samples: Vec<f32> = (0..9600)
            .flat_map(|i| {
                let s = (i as f32 * 440.0 * 2.0 * PI / 48000.0).sin() * 0.5;
                [s, s]
            })
            .collect();
        ps.process(&mut samples);

        assert!(samples.iter().all(|s| s.is_finite() && s.abs() <= 0.51));
    }
}
