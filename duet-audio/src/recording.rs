//! Recording playback sink for driving the transport without an audio device

use crate::transport::{NodeId, PlaybackSink};
use crate::TrackBuffer;
use parking_lot::Mutex;
use std::sync::Arc;

/// One call made against a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Attach(NodeId),
    Dispose(NodeId),
    Start(NodeId, f64),
    Stop(NodeId),
    SetRate(NodeId, f32),
}

#[derive(Default)]
struct SinkLog {
    next_id: u64,
    calls: Vec<SinkCall>,
    active: Vec<NodeId>,
}

/// A sink that records every call; clones share the log
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<SinkCall> {
        self.log.lock().calls.clone()
    }

    /// Start and stop calls only
    pub fn transport_calls(&self) -> Vec<SinkCall> {
        self.log
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SinkCall::Start(..) | SinkCall::Stop(_)))
            .cloned()
            .collect()
    }

    /// Forget recorded calls, keeping node bookkeeping
    pub fn clear(&self) {
        self.log.lock().calls.clear();
    }

    /// Nodes attached and not yet disposed
    pub fn active_nodes(&self) -> usize {
        self.log.lock().active.len()
    }
}

impl PlaybackSink for RecordingSink {
    fn attach(&mut self, _buffer: TrackBuffer) -> NodeId {
        let mut log = self.log.lock();
        log.next_id += 1;
        let node = NodeId(log.next_id);
        log.active.push(node);
        log.calls.push(SinkCall::Attach(node));
        node
    }

    fn dispose(&mut self, node: NodeId) {
        let mut log = self.log.lock();
        log.active.retain(|n| *n != node);
        log.calls.push(SinkCall::Dispose(node));
    }

    fn start(&mut self, node: NodeId, offset_secs: f64) {
        self.log.lock().calls.push(SinkCall::Start(node, offset_secs));
    }

    fn stop(&mut self, node: NodeId) {
        self.log.lock().calls.push(SinkCall::Stop(node));
    }

    fn set_rate(&mut self, node: NodeId, rate: f32) {
        self.log.lock().calls.push(SinkCall::SetRate(node, rate));
    }
}
