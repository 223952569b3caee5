//! Three-band EQ
//!
//! Low shelf, mid bell and high shelf built from RBJ Audio EQ Cookbook
//! biquads. Band gains are smoothed per block so live slider moves do not
//! click.
//!
//! Bands:
//! - Low shelf: 400Hz, ±20dB
//! - Mid bell: 1kHz, ±20dB
//! - High shelf: 2.5kHz, ±20dB

use std::f32::consts::PI;

use super::Effect;

/// Gain range of every band in dB
pub const EQ_GAIN_RANGE_DB: f32 = 20.0;

const LOW_FREQ: f32 = 400.0;
const MID_FREQ: f32 = 1000.0;
const MID_Q: f32 = 0.7;
const HIGH_FREQ: f32 = 2500.0;

/// EQ band selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    pub const ALL: [EqBand; 3] = [EqBand::Low, EqBand::Mid, EqBand::High];

    /// Parse a band name ("low", "mid", "high")
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "low" | "l" => Some(EqBand::Low),
            "mid" | "m" => Some(EqBand::Mid),
            "high" | "h" => Some(EqBand::High),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            EqBand::Low => 0,
            EqBand::Mid => 1,
            EqBand::High => 2,
        }
    }
}

/// Biquad filter coefficients
#[derive(Clone, Copy)]
struct BiquadCoeffs {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
}

impl BiquadCoeffs {
    const UNITY: Self = Self {
        a0: 1.0,
        a1: 0.0,
        a2: 0.0,
        b1: 0.0,
        b2: 0.0,
    };
}

/// Biquad filter state for a single channel
#[derive(Default, Clone)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f32, coeffs: &BiquadCoeffs) -> f32 {
        let output = coeffs.a0 * input + coeffs.a1 * self.x1 + coeffs.a2 * self.x2
            - coeffs.b1 * self.y1
            - coeffs.b2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Three-band EQ node
pub struct ThreeBandEq {
    sample_rate: f32,
    /// Requested gains in dB (low, mid, high)
    gains: [f32; 3],
    /// Smoothed gains actually used for the coefficients
    gains_smooth: [f32; 3],
    smooth_coeff: f32,
    coeffs: [BiquadCoeffs; 3],
    /// Per band (left, right) state
    states: [(BiquadState, BiquadState); 3],
}

impl ThreeBandEq {
    /// Create a flat EQ
    pub fn new(sample_rate: f32) -> Self {
        // Per-block smoothing, ~40% of the remaining distance each block
        let mut eq = Self {
            sample_rate,
            gains: [0.0; 3],
            gains_smooth: [0.0; 3],
            smooth_coeff: 0.4,
            coeffs: [BiquadCoeffs::UNITY; 3],
            states: Default::default(),
        };
        eq.update_coefficients();
        eq
    }

    /// Set a band gain in dB, clamped to ±20dB
    pub fn set_gain(&mut self, band: EqBand, gain_db: f32) {
        if !gain_db.is_finite() {
            return;
        }
        self.gains[band.index()] = gain_db.clamp(-EQ_GAIN_RANGE_DB, EQ_GAIN_RANGE_DB);
    }

    /// Get a band gain in dB
    pub fn gain(&self, band: EqBand) -> f32 {
        self.gains[band.index()]
    }

    fn update_coefficients(&mut self) {
        let [low, mid, high] = self.gains_smooth;
        self.coeffs = [
            self.calc_low_shelf_coeffs(LOW_FREQ, low),
            self.calc_peaking_coeffs(MID_FREQ, mid, MID_Q),
            self.calc_high_shelf_coeffs(HIGH_FREQ, high),
        ];
    }

    /// Calculate low shelf filter coefficients (RBJ cookbook)
    fn calc_low_shelf_coeffs(&self, freq: f32, gain_db: f32) -> BiquadCoeffs {
        if gain_db.abs() < 0.01 {
            return BiquadCoeffs::UNITY;
        }

        let a = 10.0f32.powf(gain_db / 40.0); // sqrt(10^(dB/20))
        let omega = 2.0 * PI * freq / self.sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / 2.0 * (2.0f32).sqrt(); // Slope = 1
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha;

        BiquadCoeffs {
            a0: (a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha)) / a0,
            a1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega)) / a0,
            a2: (a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha)) / a0,
            b1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_omega)) / a0,
            b2: ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha) / a0,
        }
    }

    /// Calculate high shelf filter coefficients (RBJ cookbook)
    fn calc_high_shelf_coeffs(&self, freq: f32, gain_db: f32) -> BiquadCoeffs {
        if gain_db.abs() < 0.01 {
            return BiquadCoeffs::UNITY;
        }

        let a = 10.0f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / self.sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / 2.0 * (2.0f32).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha;

        BiquadCoeffs {
            a0: (a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha)) / a0,
            a1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega)) / a0,
            a2: (a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha)) / a0,
            b1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_omega)) / a0,
            b2: ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha) / a0,
        }
    }

    /// Calculate peaking (bell) filter coefficients (RBJ cookbook)
    fn calc_peaking_coeffs(&self, freq: f32, gain_db: f32, q: f32) -> BiquadCoeffs {
        if gain_db.abs() < 0.01 {
            return BiquadCoeffs::UNITY;
        }

        let a = 10.0f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / self.sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let a0 = 1.0 + alpha / a;

        BiquadCoeffs {
            a0: (1.0 + alpha * a) / a0,
            a1: (-2.0 * cos_omega) / a0,
            a2: (1.0 - alpha * a) / a0,
            b1: (-2.0 * cos_omega) / a0,
            b2: (1.0 - alpha / a) / a0,
        }
    }

    /// Move smoothed gains toward their targets, recomputing coefficients
    /// only when something moved
    fn smooth_and_update(&mut self) {
        let mut changed = false;

        for (smoothed, &target) in self.gains_smooth.iter_mut().zip(self.gains.iter()) {
            if (*smoothed - target).abs() > 0.001 {
                *smoothed += (target - *smoothed) * self.smooth_coeff;
                changed = true;
            } else if *smoothed != target {
                *smoothed = target;
                changed = true;
            }
        }

        if changed {
            self.update_coefficients();
        }
    }
}

impl Effect for ThreeBandEq {
    fn process(&mut self, samples: &mut [f32]) {
        self.smooth_and_update();

        for frame in samples.chunks_exact_mut(2) {
            let mut left = frame[0];
            let mut right = frame[1];

            for (coeffs, (state_l, state_r)) in self.coeffs.iter().zip(self.states.iter_mut()) {
                left = state_l.process(left, coeffs);
                right = state_r.process(right, coeffs);
            }

            frame[0] = left;
            frame[1] = right;
        }
    }

    fn reset(&mut self) {
        for (l, r) in &mut self.states {
            l.reset();
            r.reset();
        }
    }

    fn name(&self) -> &'static str {
        "ThreeBandEq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_eq_is_transparent() {
        let mut eq = ThreeBandEq::new(48000.0);
        let mut samples = vec![0.5, 0.5, 0.3, 0.3, 0.1, 0.1, -0.2, -0.2];
        let original = samples.clone();
        eq.process(&mut samples);

        assert_eq!(samples, original);
    }

    #[test]
    fn test_gain_clamping() {
        let mut eq = ThreeBandEq::new(48000.0);

        eq.set_gain(EqBand::Low, 35.0);
        assert_eq!(eq.gain(EqBand::Low), 20.0);

        eq.set_gain(EqBand::High, -35.0);
        assert_eq!(eq.gain(EqBand::High), -20.0);

        eq.set_gain(EqBand::Mid, 4.5);
        assert_eq!(eq.gain(EqBand::Mid), 4.5);
    }

    #[test]
    fn test_low_boost_raises_dc_level() {
        let mut eq = ThreeBandEq::new(48000.0);
        eq.set_gain(EqBand::Low, 12.0);

        // Constant signal is pure low frequency; let the smoother and filter settle
        let mut samples = vec![0.1f32; 4096];
        for _ in 0..40 {
            samples.fill(0.1);
            eq.process(&mut samples);
        }

        let last = samples[samples.len() - 2];
        // +12dB is roughly 4x
        assert!(last > 0.3, "expected boosted output, got {}", last);
    }

    #[test]
    fn test_band_names() {
        assert_eq!(EqBand::from_name("LOW"), Some(EqBand::Low));
        assert_eq!(EqBand::from_name("mid"), Some(EqBand::Mid));
        assert_eq!(EqBand::from_name("h"), Some(EqBand::High));
        assert_eq!(EqBand::from_name("sub"), None);
    }
}
