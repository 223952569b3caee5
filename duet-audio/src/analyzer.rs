//! Waveform tap on the final mix
//!
//! The audio thread pushes every output block into [`AnalyzerTap::write`];
//! renderers pull the latest fixed-size frame with [`AnalyzerTap::sample`]
//! whenever they draw. Nothing is queued, so a slow reader simply skips
//! frames.

use parking_lot::Mutex;
use std::sync::Arc;

/// Default frame size in mono samples
pub const ANALYZER_FRAME_SIZE: usize = 256;

struct TapFrame {
    /// Ring of the most recent mono samples
    ring: Vec<f32>,
    write_pos: usize,
}

/// Cloneable handle to the waveform tap
#[derive(Clone)]
pub struct AnalyzerTap {
    frame: Arc<Mutex<TapFrame>>,
}

impl Default for AnalyzerTap {
    fn default() -> Self {
        Self::new(ANALYZER_FRAME_SIZE)
    }
}

impl AnalyzerTap {
    /// Create a tap returning frames of `frame_size` samples
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame: Arc::new(Mutex::new(TapFrame {
                ring: vec![0.0; frame_size.max(1)],
                write_pos: 0,
            })),
        }
    }

    /// Feed a stereo interleaved block (audio thread)
    ///
    /// Never blocks: if a reader holds the frame the block is dropped.
    pub fn write(&self, stereo: &[f32]) {
        let Some(mut frame) = self.frame.try_lock() else {
            return;
        };

        let len = frame.ring.len();
        // Only the tail of a long block can survive in the ring
        let frames = stereo.len() / 2;
        let skip = frames.saturating_sub(len);

        for pair in stereo.chunks_exact(2).skip(skip) {
            let pos = frame.write_pos;
            frame.ring[pos] = (pair[0] + pair[1]) * 0.5;
            frame.write_pos = (pos + 1) % len;
        }
    }

    /// Latest waveform frame, oldest sample first
    pub fn sample(&self) -> Vec<f32> {
        let frame = self.frame.lock();
        let len = frame.ring.len();
        (0..len)
            .map(|i| frame.ring[(frame.write_pos + i) % len])
            .collect()
    }

    /// Peak absolute amplitude of the latest frame
    pub fn peak(&self) -> f32 {
        self.frame
            .lock()
            .ring
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}
