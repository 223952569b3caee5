//! Local transport - one loaded track and its playback clock
//!
//! The transport decides *what* the player node should be doing and keeps a
//! clock anchor so the playhead can be computed at any moment. The node itself
//! lives behind a [`PlaybackSink`] (the audio engine in the app, a recorder in
//! tests).

use crate::clock::Clock;
use crate::pipeline::clamp_tempo;
use crate::track::{LoadError, TrackSource};
use crate::TrackBuffer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Handle to a player node attached to the output graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// The output side of the transport: owns player nodes and routes them into
/// the program effects pipeline
pub trait PlaybackSink: Send {
    /// Attach a new player node for `buffer`, stopped at the start
    fn attach(&mut self, buffer: TrackBuffer) -> NodeId;
    /// Release a player node and its buffer
    fn dispose(&mut self, node: NodeId);
    /// Start (or restart) the node from `offset_secs`
    fn start(&mut self, node: NodeId, offset_secs: f64);
    /// Stop the node, keeping it attached
    fn stop(&mut self, node: NodeId);
    /// Change the node's playback rate
    fn set_rate(&mut self, node: NodeId, rate: f32);
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Head {
    Stopped {
        position: f64,
    },
    Running {
        /// Position at the anchor
        anchor_position: f64,
        /// Clock reading when the anchor was taken
        anchor: Duration,
    },
}

struct LoadedTrack {
    node: NodeId,
    duration: f64,
}

/// One track buffer with a playback head
pub struct LocalTransport {
    sink: Box<dyn PlaybackSink>,
    clock: Arc<dyn Clock>,
    output_sample_rate: u32,
    track: Option<LoadedTrack>,
    head: Head,
    rate: f32,
}

impl LocalTransport {
    pub fn new(sink: Box<dyn PlaybackSink>, clock: Arc<dyn Clock>, output_sample_rate: u32) -> Self {
        Self {
            sink,
            clock,
            output_sample_rate,
            track: None,
            head: Head::Stopped { position: 0.0 },
            rate: 1.0,
        }
    }

    /// Decode `source` and make it the current track, returning its duration
    ///
    /// The previous node is disposed before the new one is attached. On
    /// failure nothing changes.
    pub fn load(&mut self, source: &dyn TrackSource) -> Result<f64, LoadError> {
        let buffer = source.decode(self.output_sample_rate)?;
        if buffer.is_empty() {
            return Err(LoadError::Empty);
        }
        let duration = buffer.duration();

        if let Some(old) = self.track.take() {
            if matches!(self.head, Head::Running { .. }) {
                self.sink.stop(old.node);
            }
            self.sink.dispose(old.node);
            debug!(node = old.node.0, "disposed previous player node");
        }

        let node = self.sink.attach(buffer);
        self.sink.set_rate(node, self.rate);
        self.track = Some(LoadedTrack { node, duration });
        self.head = Head::Stopped { position: 0.0 };

        info!(source = %source.describe(), duration, "track loaded");
        Ok(duration)
    }

    /// Duration of the loaded track
    pub fn duration(&self) -> Option<f64> {
        self.track.as_ref().map(|t| t.duration)
    }

    /// Begin advancing from `at` seconds; does nothing without a track
    ///
    /// Starting at or past the end leaves the head frozen at the end.
    pub fn start(&mut self, at: f64) {
        let Some(track) = &self.track else {
            debug!(at, "start ignored, no track loaded");
            return;
        };
        if !at.is_finite() {
            warn!(at, "start ignored, position is not finite");
            return;
        }

        let at = at.clamp(0.0, track.duration);
        if at >= track.duration {
            if matches!(self.head, Head::Running { .. }) {
                self.sink.stop(track.node);
            }
            debug!(at, "start at end of track, staying stopped");
            self.head = Head::Stopped {
                position: track.duration,
            };
            return;
        }
        self.sink.start(track.node, at);
        self.head = Head::Running {
            anchor_position: at,
            anchor: self.clock.now(),
        };
    }

    /// Freeze the clock at the current position
    pub fn stop(&mut self) {
        if !matches!(self.head, Head::Running { .. }) {
            return;
        }
        let position = self.current_position();
        if let Some(track) = &self.track {
            self.sink.stop(track.node);
        }
        self.head = Head::Stopped { position };
    }

    /// Move the playhead, restarting the node if it is running
    pub fn seek(&mut self, position: f64) {
        if !position.is_finite() {
            warn!(position, "seek ignored, position is not finite");
            return;
        }
        let position = position.clamp(0.0, self.duration().unwrap_or(0.0));
        match self.head {
            Head::Running { .. } => {
                self.stop();
                self.start(position);
            }
            Head::Stopped { .. } => self.head = Head::Stopped { position },
        }
    }

    /// Current playhead in seconds
    ///
    /// While running this is computed from the clock anchor; while stopped it
    /// is the frozen position.
    pub fn current_position(&self) -> f64 {
        match self.head {
            Head::Stopped { position } => position,
            Head::Running {
                anchor_position,
                anchor,
            } => {
                let elapsed = self.clock.now().saturating_sub(anchor).as_secs_f64();
                let position = anchor_position + elapsed * self.rate as f64;
                position.min(self.duration().unwrap_or(position))
            }
        }
    }

    /// Whether the clock is advancing
    pub fn is_running(&self) -> bool {
        matches!(self.head, Head::Running { .. }) && !self.reached_end()
    }

    fn reached_end(&self) -> bool {
        match (self.head, self.duration()) {
            (Head::Running { .. }, Some(duration)) => self.current_position() >= duration,
            _ => false,
        }
    }

    /// Freeze at the end if the running clock has passed the duration
    ///
    /// Returns true when this call performed the transition.
    pub fn settle_end(&mut self) -> bool {
        if !self.reached_end() {
            return false;
        }
        if let Some(track) = &self.track {
            self.sink.stop(track.node);
            self.head = Head::Stopped {
                position: track.duration,
            };
        }
        true
    }

    /// Change the playback rate from now on (clamped to 0.5..=1.5)
    ///
    /// Elapsed time keeps the old rate: the anchor is moved to the current
    /// position before the new rate applies.
    pub fn set_rate(&mut self, rate: f32) {
        if !rate.is_finite() {
            warn!(rate, "rate ignored, not finite");
            return;
        }
        let rate = clamp_tempo(rate);
        if let Head::Running { .. } = self.head {
            self.head = Head::Running {
                anchor_position: self.current_position(),
                anchor: self.clock.now(),
            };
        }
        self.rate = rate;
        if let Some(track) = &self.track {
            self.sink.set_rate(track.node, rate);
        }
    }

    /// Current playback rate
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// The clock positions are anchored to
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        if let Some(track) = self.track.take() {
            self.sink.dispose(track.node);
        }
    }
}
