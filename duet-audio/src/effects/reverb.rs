//! Freeverb-style reverb effect
//!
//! Uses parallel comb filters and series allpass filters. The wet level is a
//! dry/wet crossfade, smoothed per sample.

use super::{smooth, Effect};

/// Comb filter delay times in samples at 44.1kHz (from Freeverb)
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delay times in samples at 44.1kHz
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];

/// Stereo spread in samples
const STEREO_SPREAD: usize = 23;

/// Lowpass-feedback comb filter
struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    filter_store: f32,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            filter_store: 0.0,
        }
    }

    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let output = self.buffer[self.index];

        // Lowpass filter in feedback path (damping)
        self.filter_store = output * (1.0 - damping) + self.filter_store * damping;
        self.buffer[self.index] = input + self.filter_store * feedback;
        self.index = (self.index + 1) % self.buffer.len();

        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_store = 0.0;
        self.index = 0;
    }
}

/// Schroeder allpass filter
struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        let output = -input + buffered;

        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();

        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

/// Freeverb-style stereo reverb
pub struct Reverb {
    comb_l: [CombFilter; 8],
    allpass_l: [AllpassFilter; 4],
    comb_r: [CombFilter; 8],
    allpass_r: [AllpassFilter; 4],

    /// Comb feedback, derived from the decay time
    feedback: f32,
    damping: f32,
    decay_secs: f32,

    wet_target: f32,
    wet_current: f32,
}

impl Reverb {
    /// Wet smoothing coefficient (~10ms at 48kHz)
    const WET_SMOOTH_COEFF: f32 = 0.998;

    /// Default decay time in seconds
    pub const DEFAULT_DECAY_SECS: f32 = 2.0;

    /// Create a new reverb with the given wet level
    pub fn new(sample_rate: u32, wet: f32) -> Self {
        let scale = sample_rate as f32 / 44100.0;
        let spread = (STEREO_SPREAD as f32 * scale) as usize;

        let comb_l =
            std::array::from_fn(|i| CombFilter::new((COMB_TUNINGS[i] as f32 * scale) as usize));
        let allpass_l = std::array::from_fn(|i| {
            AllpassFilter::new((ALLPASS_TUNINGS[i] as f32 * scale) as usize)
        });
        let comb_r = std::array::from_fn(|i| {
            CombFilter::new((COMB_TUNINGS[i] as f32 * scale) as usize + spread)
        });
        let allpass_r = std::array::from_fn(|i| {
            AllpassFilter::new((ALLPASS_TUNINGS[i] as f32 * scale) as usize + spread)
        });

        let wet = wet.clamp(0.0, 1.0);
        let mut reverb = Self {
            comb_l,
            allpass_l,
            comb_r,
            allpass_r,
            feedback: 0.0,
            damping: 0.5,
            decay_secs: 0.0,
            wet_target: wet,
            wet_current: wet,
        };
        reverb.set_decay(Self::DEFAULT_DECAY_SECS);
        reverb
    }

    /// Set the decay time (0.2 - 10 seconds)
    ///
    /// Maps onto Freeverb's room size: feedback = room * 0.28 + 0.7.
    pub fn set_decay(&mut self, secs: f32) {
        self.decay_secs = secs.clamp(0.2, 10.0);
        let room = ((self.decay_secs - 0.2) / 9.8).sqrt();
        self.feedback = room * 0.28 + 0.7;
    }

    /// Get the decay time in seconds
    pub fn decay(&self) -> f32 {
        self.decay_secs
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

    /// Run one stereo frame through the tank, returning the reverb signal only
    fn process_tank(&mut self, left: f32, right: f32) -> (f32, f32) {
        // Attenuate input to prevent buildup
        let input = (left + right) * 0.25;

        let mut out_l = 0.0;
        let mut out_r = 0.0;

        for comb in &mut self.comb_l {
            out_l += comb.process(input, self.feedback, self.damping);
        }
        for comb in &mut self.comb_r {
            out_r += comb.process(input, self.feedback, self.damping);
        }

        out_l *= 0.125;
        out_r *= 0.125;

        for allpass in &mut self.allpass_l {
            out_l = allpass.process(out_l);
        }
        for allpass in &mut self.allpass_r {
            out_r = allpass.process(out_r);
        }

        (out_l, out_r)
    }
}

impl Effect for Reverb {
    fn process(&mut self, samples: &mut [f32]) {
        for chunk in samples.chunks_exact_mut(2) {
            self.wet_current = smooth(self.wet_current, self.wet_target, Self::WET_SMOOTH_COEFF);

            // The tank keeps running at zero wet so raising the level later
            // brings in an already-developed tail
            let (wet_l, wet_r) = self.process_tank(chunk[0], chunk[1]);

            let dry = 1.0 - self.wet_current;
            chunk[0] = chunk[0] * dry + wet_l * self.wet_current;
            chunk[1] = chunk[1] * dry + wet_r * self.wet_current;
        }
    }

    fn reset(&mut self) {
        for comb in self.comb_l.iter_mut().chain(self.comb_r.iter_mut()) {
            comb.reset();
        }
        for allpass in self.allpass_l.iter_mut().chain(self.allpass_r.iter_mut()) {
            allpass.reset();
        }
    }

    fn name(&self) -> &'static str {
        "Reverb"
    }
}
