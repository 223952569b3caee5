//! Audio engine for Duet - transport, effects pipeline, and monitoring
//!
//! This crate provides the local half of a shared-playback session:
//! - Transport: one loaded track with a clock-anchored playback head
//! - Pipeline: Pitch → EQ → Delay → Reverb → Master, one per source
//! - Analyzer: fixed-size waveform frames from the final mix
//! - Engine: player nodes and the mic feed rendered on the audio thread

mod analyzer;
mod clock;
mod effects;
mod engine;
mod monitor;
mod pipeline;
mod player;
pub mod recording;
mod track;
mod transport;

pub use analyzer::{AnalyzerTap, ANALYZER_FRAME_SIZE};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use effects::{
    Effect, EqBand, FeedbackDelay, PitchShift, Reverb, ThreeBandEq, EQ_GAIN_RANGE_DB,
    PITCH_RANGE_SEMITONES,
};
pub use engine::{AudioCommand, AudioEngine, AudioEvent, EngineSink, EngineState, Retired};
pub use monitor::{MicError, MicFeed, MicMonitor};
pub use pipeline::{
    db_to_gain, EffectParameter, EffectsParameters, EffectsPipeline, MASTER_VOLUME_RANGE_DB,
    TEMPO_RANGE,
};
pub use player::PlayerNode;
pub use track::{LoadError, TrackBuffer, TrackSource};
pub use transport::{LocalTransport, NodeId, PlaybackSink};
