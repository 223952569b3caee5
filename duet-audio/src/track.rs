//! Decoded track buffers and the sources that produce them

use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while producing a track buffer
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in source")]
    NoAudioTrack,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Track contains no audio")]
    Empty,
}

/// A fully decoded track ready for playback
#[derive(Debug, Clone)]
pub struct TrackBuffer {
    /// Interleaved stereo samples - Arc to avoid copying through channels
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    name: Option<String>,
}

impl TrackBuffer {
    /// Wrap interleaved stereo samples
    pub fn new(samples: Vec<f32>, sample_rate: u32, name: Option<String>) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            name,
        }
    }

    /// A silent buffer of the given length, handy for tests and placeholders
    pub fn silent(duration_secs: f64, sample_rate: u32) -> Self {
        let frames = (duration_secs * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * 2], sample_rate, None)
    }

    pub fn samples(&self) -> &Arc<Vec<f32>> {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * 2.0) // stereo
    }
}

/// Anything that can be decoded into a [`TrackBuffer`]
///
/// Decoding happens before any playback state is touched, so a failing
/// source leaves the current track in place.
pub trait TrackSource {
    /// Decode into stereo samples at `target_sample_rate`
    fn decode(&self, target_sample_rate: u32) -> Result<TrackBuffer, LoadError>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

impl TrackSource for TrackBuffer {
    fn decode(&self, _target_sample_rate: u32) -> Result<TrackBuffer, LoadError> {
        if self.is_empty() {
            return Err(LoadError::Empty);
        }
        Ok(self.clone())
    }

    fn describe(&self) -> String {
        self.name().unwrap_or("in-memory buffer").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let buffer = TrackBuffer::silent(30.0, 48000);
        assert!((buffer.duration() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        let buffer = TrackBuffer::new(Vec::new(), 48000, None);
        assert!(matches!(buffer.decode(48000), Err(LoadError::Empty)));
    }
}
