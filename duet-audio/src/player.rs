//! Player node - renders one track buffer into the program bus

use crate::transport::NodeId;
use crate::TrackBuffer;
use std::sync::Arc;

/// A buffer source node owned by the audio thread
pub struct PlayerNode {
    id: NodeId,
    /// Interleaved stereo samples shared with the control thread
    samples: Arc<Vec<f32>>,
    source_sample_rate: u32,
    /// Source frames advanced per output frame at rate 1.0
    step: f64,
    /// Playback position in frames
    position: f64,
    playing: bool,
    rate: f32,
}

impl PlayerNode {
    pub fn new(id: NodeId, buffer: &TrackBuffer, output_sample_rate: u32) -> Self {
        let step = if output_sample_rate == 0 {
            1.0
        } else {
            buffer.sample_rate() as f64 / output_sample_rate as f64
        };
        Self {
            id,
            samples: buffer.samples().clone(),
            source_sample_rate: buffer.sample_rate(),
            step,
            position: 0.0,
            playing: false,
            rate: 1.0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Start from `offset_secs` of source time
    pub fn start(&mut self, offset_secs: f64) {
        let frame = offset_secs.max(0.0) * self.source_sample_rate as f64;
        self.position = frame.min(self.frames() as f64);
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Mix into a stereo interleaved block
    pub fn render(&mut self, output: &mut [f32]) {
        if !self.playing {
            return;
        }

        let frames = self.frames();
        let advance = self.step * self.rate as f64;

        for frame in output.chunks_exact_mut(2) {
            let pos = self.position as usize;
            if pos + 1 >= frames {
                // End of buffer, the transport freezes its own clock
                self.playing = false;
                self.position = frames as f64;
                break;
            }

            // Linear interpolation between neighbouring frames
            let frac = self.position.fract() as f32;
            let i = pos * 2;
            let l0 = self.samples[i];
            let r0 = self.samples[i + 1];
            let l1 = self.samples[i + 2];
            let r1 = self.samples[i + 3];

            frame[0] += l0 + frac * (l1 - l0);
            frame[1] += r0 + frac * (r1 - r0);

            self.position += advance;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> TrackBuffer {
        let samples = (0..frames).flat_map(|i| [i as f32, -(i as f32)]).collect();
        TrackBuffer::new(samples, 100, None)
    }

    #[test]
    fn test_stopped_node_adds_nothing() {
        let mut node = PlayerNode::new(NodeId(1), &ramp(10), 100);
        let mut out = [0.25; 8];
        node.render(&mut out);
        assert_eq!(out, [0.25; 8]);
    }

    #[test]
    fn test_start_at_offset() {
        let buffer = ramp(100);
        let mut node = PlayerNode::new(NodeId(1), &buffer, 100);
        node.start(0.5);

        let mut out = [0.0; 4];
        node.render(&mut out);
        assert_eq!(out, [50.0, -50.0, 51.0, -51.0]);
    }

    #[test]
    fn test_rate_interpolates() {
        let buffer = ramp(100);
        let mut node = PlayerNode::new(NodeId(1), &buffer, 100);
        node.set_rate(0.5);
        node.start(0.0);

        let mut out = [0.0; 6];
        node.render(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.5, -0.5, 1.0, -1.0]);
    }

    #[test]
    fn test_stops_at_end() {
        let mut node = PlayerNode::new(NodeId(1), &ramp(4), 100);
        node.start(0.0);
        let mut out = [0.0; 16];
        node.render(&mut out);
        assert!(!node.is_playing());
    }
}
