//! Effects pipeline - the fixed per-source signal chain
//!
//! ```text
//! Source → PitchShift → ThreeBandEQ → FeedbackDelay → Reverb → MasterOutput
//! ```
//!
//! The chain is wired once in [`EffectsPipeline::new`]. Setters only mutate
//! node state in place; every node smooths its own parameter so a change made
//! between two blocks is heard on the next block without a click. All nodes
//! are owned by the pipeline, so dropping it releases the whole chain at once.

use crate::effects::{Effect, EqBand, FeedbackDelay, PitchShift, Reverb, ThreeBandEq};

/// Tempo range accepted for the track source
pub const TEMPO_RANGE: (f32, f32) = (0.5, 1.5);
/// Master volume range in dB
pub const MASTER_VOLUME_RANGE_DB: (f32, f32) = (-60.0, 0.0);

/// User-controlled effect settings
///
/// Each field is independent. Values outside their documented range are
/// clamped by [`EffectsParameters::clamped`] and by every pipeline setter,
/// never accepted as-is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectsParameters {
    /// Pitch shift in semitones (-12..=12)
    pub pitch_semitones: f32,
    /// Track playback rate (0.5..=1.5)
    pub tempo_rate: f32,
    /// Reverb wet level (0..=1)
    pub reverb_wet: f32,
    /// Delay wet level (0..=1)
    pub delay_wet: f32,
    /// EQ band gains in dB (-20..=20)
    pub eq_low_db: f32,
    pub eq_mid_db: f32,
    pub eq_high_db: f32,
    /// Master output level in dB (-60..=0)
    pub master_volume_db: f32,
}

impl Default for EffectsParameters {
    fn default() -> Self {
        Self {
            pitch_semitones: 0.0,
            tempo_rate: 1.0,
            reverb_wet: 0.3,
            delay_wet: 0.2,
            eq_low_db: 0.0,
            eq_mid_db: 0.0,
            eq_high_db: 0.0,
            master_volume_db: -10.0,
        }
    }
}

impl EffectsParameters {
    /// Copy with every field clamped into its range
    ///
    /// Non-finite fields fall back to their defaults.
    pub fn clamped(self) -> Self {
        let d = Self::default();
        Self {
            pitch_semitones: clamp_pitch(finite_or(self.pitch_semitones, d.pitch_semitones)),
            tempo_rate: clamp_tempo(finite_or(self.tempo_rate, d.tempo_rate)),
            reverb_wet: clamp_unit(finite_or(self.reverb_wet, d.reverb_wet)),
            delay_wet: clamp_unit(finite_or(self.delay_wet, d.delay_wet)),
            eq_low_db: clamp_eq(finite_or(self.eq_low_db, d.eq_low_db)),
            eq_mid_db: clamp_eq(finite_or(self.eq_mid_db, d.eq_mid_db)),
            eq_high_db: clamp_eq(finite_or(self.eq_high_db, d.eq_high_db)),
            master_volume_db: clamp_master(finite_or(self.master_volume_db, d.master_volume_db)),
        }
    }

    /// Gain of a single EQ band
    pub fn eq(&self, band: EqBand) -> f32 {
        match band {
            EqBand::Low => self.eq_low_db,
            EqBand::Mid => self.eq_mid_db,
            EqBand::High => self.eq_high_db,
        }
    }

    /// Set one EQ band (clamped); non-finite gains are ignored
    pub fn set_eq(&mut self, band: EqBand, db: f32) {
        if !db.is_finite() {
            return;
        }
        let db = clamp_eq(db);
        match band {
            EqBand::Low => self.eq_low_db = db,
            EqBand::Mid => self.eq_mid_db = db,
            EqBand::High => self.eq_high_db = db,
        }
    }
}

/// A single parameter change, as relayed from the UI into a pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectParameter {
    Pitch(f32),
    Eq(EqBand, f32),
    ReverbWet(f32),
    DelayWet(f32),
    MasterVolume(f32),
}

impl EffectParameter {
    /// The requested value, whatever the parameter
    pub fn value(&self) -> f32 {
        match *self {
            EffectParameter::Pitch(v)
            | EffectParameter::Eq(_, v)
            | EffectParameter::ReverbWet(v)
            | EffectParameter::DelayWet(v)
            | EffectParameter::MasterVolume(v) => v,
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

pub(crate) fn clamp_pitch(semitones: f32) -> f32 {
    semitones.clamp(-12.0, 12.0)
}

pub(crate) fn clamp_tempo(rate: f32) -> f32 {
    rate.clamp(TEMPO_RANGE.0, TEMPO_RANGE.1)
}

fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

fn clamp_eq(db: f32) -> f32 {
    db.clamp(-20.0, 20.0)
}

fn clamp_master(db: f32) -> f32 {
    db.clamp(MASTER_VOLUME_RANGE_DB.0, MASTER_VOLUME_RANGE_DB.1)
}

/// Convert decibels to linear gain
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Final gain stage of the chain
struct MasterOutput {
    volume_db: f32,
    gain: f32,
    smoothed_gain: f32,
}

impl MasterOutput {
    /// Smoothing coefficient for master volume (~5ms at 48kHz)
    const SMOOTH_COEFF: f32 = 0.995;

    fn new(volume_db: f32) -> Self {
        let volume_db = clamp_master(volume_db);
        let gain = db_to_gain(volume_db);
        Self {
            volume_db,
            gain,
            smoothed_gain: gain,
        }
    }

    fn set_volume(&mut self, db: f32) {
        if !db.is_finite() {
            return;
        }
        self.volume_db = clamp_master(db);
        self.gain = db_to_gain(self.volume_db);
    }
}

impl Effect for MasterOutput {
    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(2) {
            self.smoothed_gain = Self::SMOOTH_COEFF * self.smoothed_gain
                + (1.0 - Self::SMOOTH_COEFF) * self.gain;
            frame[0] *= self.smoothed_gain;
            frame[1] *= self.smoothed_gain;
        }
    }

    fn reset(&mut self) {
        self.smoothed_gain = self.gain;
    }

    fn name(&self) -> &'static str {
        "MasterOutput"
    }
}

/// The fixed effects chain for one source
pub struct EffectsPipeline {
    pitch: PitchShift,
    eq: ThreeBandEq,
    delay: FeedbackDelay,
    reverb: Reverb,
    master: MasterOutput,
}

impl EffectsPipeline {
    /// Build the chain with the given parameters
    pub fn new(sample_rate: u32, params: EffectsParameters) -> Self {
        let params = params.clamped();
        let mut eq = ThreeBandEq::new(sample_rate as f32);
        for band in EqBand::ALL {
            eq.set_gain(band, params.eq(band));
        }

        Self {
            pitch: PitchShift::new(sample_rate, params.pitch_semitones),
            eq,
            delay: FeedbackDelay::new(sample_rate, params.delay_wet),
            reverb: Reverb::new(sample_rate, params.reverb_wet),
            master: MasterOutput::new(params.master_volume_db),
        }
    }

    /// Set pitch shift in semitones; values outside -12..=12 are clamped
    pub fn set_pitch(&mut self, semitones: f32) {
        self.pitch.set_semitones(semitones);
    }

    /// Set an EQ band gain in dB; clamped to ±20dB
    pub fn set_eq(&mut self, band: EqBand, db: f32) {
        self.eq.set_gain(band, db);
    }

    /// Set reverb wet level; clamped to 0..=1
    pub fn set_reverb_wet(&mut self, wet: f32) {
        self.reverb.set_wet(wet);
    }

    /// Set delay wet level; clamped to 0..=1
    pub fn set_delay_wet(&mut self, wet: f32) {
        self.delay.set_wet(wet);
    }

    /// Set master volume in dB; clamped to -60..=0
    pub fn set_master_volume(&mut self, db: f32) {
        self.master.set_volume(db);
    }

    /// Apply a relayed parameter change
    pub fn apply(&mut self, param: EffectParameter) {
        match param {
            EffectParameter::Pitch(st) => self.set_pitch(st),
            EffectParameter::Eq(band, db) => self.set_eq(band, db),
            EffectParameter::ReverbWet(wet) => self.set_reverb_wet(wet),
            EffectParameter::DelayWet(wet) => self.set_delay_wet(wet),
            EffectParameter::MasterVolume(db) => self.set_master_volume(db),
        }
    }

    /// Current (clamped) parameter set
    ///
    /// Track rate belongs to the transport, so `tempo_rate` always reads 1.0.
    pub fn parameters(&self) -> EffectsParameters {
        EffectsParameters {
            pitch_semitones: self.pitch.semitones(),
            tempo_rate: 1.0,
            reverb_wet: self.reverb.wet(),
            delay_wet: self.delay.wet(),
            eq_low_db: self.eq.gain(EqBand::Low),
            eq_mid_db: self.eq.gain(EqBand::Mid),
            eq_high_db: self.eq.gain(EqBand::High),
            master_volume_db: self.master.volume_db,
        }
    }

    /// Run one block through the chain in wiring order
    pub fn process(&mut self, samples: &mut [f32]) {
        self.pitch.process(samples);
        self.eq.process(samples);
        self.delay.process(samples);
        self.reverb.process(samples);
        self.master.process(samples);
    }

    /// Clear all delay lines and filter state
    pub fn reset(&mut self) {
        self.pitch.reset();
        self.eq.reset();
        self.delay.reset();
        self.reverb.reset();
        self.master.reset();
    }

    /// Node names in signal order
    pub fn node_names(&self) -> [&'static str; 5] {
        [
            self.pitch.name(),
            self.eq.name(),
            self.delay.name(),
            self.reverb.name(),
            self.master.name(),
        ]
    }
}
