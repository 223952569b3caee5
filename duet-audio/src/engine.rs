//! Audio engine - player nodes, mic feed, and the two effects chains
//!
//! The control thread talks to the engine through [`AudioCommand`]s; the
//! engine state lives on the audio side and renders:
//!
//! `players → program EffectsPipeline ┐`
//! `mic feed → mic EffectsPipeline ───┴→ mix → AnalyzerTap → output`

use crate::analyzer::AnalyzerTap;
use crate::monitor::{drain_feed, MicFeed};
use crate::pipeline::{EffectParameter, EffectsParameters, EffectsPipeline};
use crate::player::PlayerNode;
use crate::transport::{NodeId, PlaybackSink};
use crate::TrackBuffer;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Commands sent to the audio engine
pub enum AudioCommand {
    // Player nodes
    AttachPlayer(NodeId, TrackBuffer),
    DisposePlayer(NodeId),
    StartPlayer(NodeId, f64),
    StopPlayer(NodeId),
    SetPlayerRate(NodeId, f32),

    // Effects, applied to both chains
    SetParameter(EffectParameter),

    // Mic monitoring
    AttachMic(MicFeed),
    DetachMic,

    // System
    Shutdown,
}

impl std::fmt::Debug for AudioCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttachPlayer(id, buffer) => f
                .debug_tuple("AttachPlayer")
                .field(id)
                .field(&buffer.duration())
                .finish(),
            Self::DisposePlayer(id) => f.debug_tuple("DisposePlayer").field(id).finish(),
            Self::StartPlayer(id, at) => f.debug_tuple("StartPlayer").field(id).field(at).finish(),
            Self::StopPlayer(id) => f.debug_tuple("StopPlayer").field(id).finish(),
            Self::SetPlayerRate(id, rate) => {
                f.debug_tuple("SetPlayerRate").field(id).field(rate).finish()
            }
            Self::SetParameter(p) => f.debug_tuple("SetParameter").field(p).finish(),
            Self::AttachMic(_) => f.write_str("AttachMic"),
            Self::DetachMic => f.write_str("DetachMic"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Events sent from the audio thread
#[derive(Debug, Clone)]
pub enum AudioEvent {
    /// Output stream is running at this sample rate
    Ready { sample_rate: u32 },
    /// Error occurred
    Error(String),
}

/// Default scratch size in samples (2048 stereo frames)
const MAX_BUFFER_SIZE: usize = 4096;

/// Something a command released, to be dropped outside the engine lock
pub enum Retired {
    Player(PlayerNode),
    Mic(MicFeed),
}

/// Audio engine state (held in audio thread)
pub struct EngineState {
    sample_rate: u32,
    players: Vec<PlayerNode>,
    program: EffectsPipeline,
    mic_chain: EffectsPipeline,
    mic: Option<MicFeed>,
    tap: AnalyzerTap,
    program_buffer: Vec<f32>,
    mic_buffer: Vec<f32>,
}

impl EngineState {
    pub fn new(sample_rate: u32, params: EffectsParameters, tap: AnalyzerTap) -> Self {
        Self {
            sample_rate,
            players: Vec::new(),
            program: EffectsPipeline::new(sample_rate, params),
            mic_chain: EffectsPipeline::new(sample_rate, params),
            mic: None,
            tap,
            program_buffer: vec![0.0; MAX_BUFFER_SIZE],
            mic_buffer: vec![0.0; MAX_BUFFER_SIZE],
        }
    }

    /// Size the scratch buffers for the largest block the device will ask for
    ///
    /// Call before the stream starts; larger blocks are still rendered, in
    /// scratch-sized pieces.
    pub fn with_block_capacity(mut self, samples: usize) -> Self {
        let samples = samples.max(2) & !1;
        self.program_buffer = vec![0.0; samples];
        self.mic_buffer = vec![0.0; samples];
        self
    }

    fn player_mut(&mut self, id: NodeId) -> Option<&mut PlayerNode> {
        let node = self.players.iter_mut().find(|p| p.id() == id);
        if node.is_none() {
            debug!(node = id.0, "command for unknown player node");
        }
        node
    }

    /// Apply one command; anything it releases is handed back to the caller
    pub fn handle_command(&mut self, cmd: AudioCommand) -> Option<Retired> {
        match cmd {
            AudioCommand::AttachPlayer(id, buffer) => {
                let node = PlayerNode::new(id, &buffer, self.sample_rate);
                self.players.push(node);
            }
            AudioCommand::DisposePlayer(id) => {
                let index = self.players.iter().position(|p| p.id() == id)?;
                return Some(Retired::Player(self.players.swap_remove(index)));
            }
            AudioCommand::StartPlayer(id, offset) => {
                if let Some(node) = self.player_mut(id) {
                    node.start(offset);
                }
            }
            AudioCommand::StopPlayer(id) => {
                if let Some(node) = self.player_mut(id) {
                    node.stop();
                }
            }
            AudioCommand::SetPlayerRate(id, rate) => {
                if let Some(node) = self.player_mut(id) {
                    node.set_rate(rate);
                }
            }
            AudioCommand::SetParameter(param) => {
                self.program.apply(param);
                self.mic_chain.apply(param);
            }
            AudioCommand::AttachMic(feed) => {
                self.mic_chain.reset();
                return self.mic.replace(feed).map(Retired::Mic);
            }
            AudioCommand::DetachMic => {
                return self.mic.take().map(Retired::Mic);
            }
            AudioCommand::Shutdown => {}
        }
        None
    }

    /// Render one stereo interleaved output block
    ///
    /// Never allocates: blocks longer than the scratch buffers are rendered
    /// in pieces.
    pub fn process(&mut self, output: &mut [f32]) {
        let capacity = self.program_buffer.len();
        for block in output.chunks_mut(capacity) {
            self.process_block(block);
        }
    }

    fn process_block(&mut self, output: &mut [f32]) {
        let len = output.len();
        let program = &mut self.program_buffer[..len];
        program.fill(0.0);
        for player in &mut self.players {
            player.render(program);
        }
        self.program.process(program);

        let mic = &mut self.mic_buffer[..len];
        match &mut self.mic {
            Some(feed) => {
                drain_feed(feed, mic);
                self.mic_chain.process(mic);
            }
            None => mic.fill(0.0),
        }

        for ((out, p), m) in output.iter_mut().zip(program.iter()).zip(mic.iter()) {
            *out = p + m;
        }

        self.tap.write(output);
    }
}

/// Handle to communicate with the audio engine
pub struct AudioEngine {
    /// Send commands to audio thread
    pub command_tx: Sender<AudioCommand>,
    /// Receive events from audio thread
    pub event_rx: Receiver<AudioEvent>,
    next_node: Arc<AtomicU64>,
}

impl AudioEngine {
    /// Create channels for engine communication
    /// Buffer size of 1024 provides headroom for command bursts without saturation
    pub fn create_channels() -> (
        Sender<AudioCommand>,
        Receiver<AudioCommand>,
        Sender<AudioEvent>,
        Receiver<AudioEvent>,
    ) {
        let (cmd_tx, cmd_rx) = bounded(1024);
        let (evt_tx, evt_rx) = bounded(1024);
        (cmd_tx, cmd_rx, evt_tx, evt_rx)
    }

    /// Create a new engine handle
    pub fn new(command_tx: Sender<AudioCommand>, event_rx: Receiver<AudioEvent>) -> Self {
        Self {
            command_tx,
            event_rx,
            next_node: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send a command to the audio engine
    pub fn send(&self, cmd: AudioCommand) {
        if let Err(TrySendError::Full(cmd)) = self.command_tx.try_send(cmd) {
            warn!(?cmd, "audio command queue full, dropping command");
        }
    }

    /// Apply an effect parameter to both chains
    pub fn set_parameter(&self, param: EffectParameter) {
        self.send(AudioCommand::SetParameter(param));
    }

    /// A playback sink feeding player nodes into this engine
    pub fn sink(&self) -> EngineSink {
        EngineSink {
            command_tx: self.command_tx.clone(),
            next_node: self.next_node.clone(),
        }
    }

    /// Ask the audio thread to stop
    pub fn shutdown(&self) {
        let _ = self.command_tx.try_send(AudioCommand::Shutdown);
    }
}

/// [`PlaybackSink`] that forwards node lifecycle to the audio thread
#[derive(Clone)]
pub struct EngineSink {
    command_tx: Sender<AudioCommand>,
    next_node: Arc<AtomicU64>,
}

impl EngineSink {
    fn post(&self, cmd: AudioCommand) {
        // Lifecycle commands must not be dropped, block briefly if the queue is full
        if self.command_tx.send(cmd).is_err() {
            warn!("audio thread gone, player command lost");
        }
    }
}

impl PlaybackSink for EngineSink {
    fn attach(&mut self, buffer: TrackBuffer) -> NodeId {
        let id = NodeId(self.next_node.fetch_add(1, Ordering::Relaxed) + 1);
        self.post(AudioCommand::AttachPlayer(id, buffer));
        id
    }

    fn dispose(&mut self, node: NodeId) {
        self.post(AudioCommand::DisposePlayer(node));
    }

    fn start(&mut self, node: NodeId, offset_secs: f64) {
        self.post(AudioCommand::StartPlayer(node, offset_secs));
    }

    fn stop(&mut self, node: NodeId) {
        self.post(AudioCommand::StopPlayer(node));
    }

    fn set_rate(&mut self, node: NodeId, rate: f32) {
        self.post(AudioCommand::SetPlayerRate(node, rate));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Producer, Split};
    use ringbuf::HeapRb;

    fn dry_params() -> EffectsParameters {
        EffectsParameters {
            reverb_wet: 0.0,
            delay_wet: 0.0,
            master_volume_db: 0.0,
            ..EffectsParameters::default()
        }
    }

    fn constant(value: f32, secs: f64, sample_rate: u32) -> TrackBuffer {
        let frames = (secs * sample_rate as f64) as usize;
        TrackBuffer::new(vec![value; frames * 2], sample_rate, None)
    }

    #[test]
    fn test_silence_without_players() {
        let mut state = EngineState::new(48000, dry_params(), AnalyzerTap::new(16));
        let mut out = vec![1.0; 256];
        state.process(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_started_player_reaches_output_and_tap() {
        let tap = AnalyzerTap::new(16);
        let mut state = EngineState::new(48000, dry_params(), tap.clone());
        state.handle_command(AudioCommand::AttachPlayer(NodeId(1), constant(0.5, 1.0, 48000)));
        state.handle_command(AudioCommand::StartPlayer(NodeId(1), 0.0));

        let mut out = vec![0.0; 1024];
        for _ in 0..20 {
            state.process(&mut out);
        }
        assert!(out.iter().any(|s| s.abs() > 0.1));
        assert!(tap.peak() > 0.1);
    }

    #[test]
    fn test_dispose_removes_node() {
        let mut state = EngineState::new(48000, dry_params(), AnalyzerTap::default());
        state.handle_command(AudioCommand::AttachPlayer(NodeId(1), constant(0.5, 0.1, 48000)));
        state.handle_command(AudioCommand::AttachPlayer(NodeId(2), constant(0.5, 0.1, 48000)));
        let retired = state.handle_command(AudioCommand::DisposePlayer(NodeId(1)));
        assert!(matches!(retired, Some(Retired::Player(ref p)) if p.id() == NodeId(1)));
        assert_eq!(state.players.len(), 1);
        assert!(state.handle_command(AudioCommand::DisposePlayer(NodeId(1))).is_none());

        // Commands for a disposed node are ignored
        state.handle_command(AudioCommand::StartPlayer(NodeId(1), 0.0));
        assert_eq!(state.players.len(), 1);
    }

    #[test]
    fn test_parameters_reach_both_chains() {
        let mut state = EngineState::new(48000, dry_params(), AnalyzerTap::default());
        state.handle_command(AudioCommand::SetParameter(EffectParameter::Pitch(50.0)));
        assert_eq!(state.program.parameters().pitch_semitones, 12.0);
        assert_eq!(state.mic_chain.parameters().pitch_semitones, 12.0);
    }

    #[test]
    fn test_mic_feed_is_mixed() {
        let mut state = EngineState::new(48000, dry_params(), AnalyzerTap::default());
        let (mut producer, feed) = HeapRb::<f32>::new(8192).split();
        for _ in 0..4096 {
            let _ = producer.try_push(0.5);
        }
        state.handle_command(AudioCommand::AttachMic(feed));
        assert!(state.mic.is_some());

        let mut out = vec![0.0; 4096];
        state.process(&mut out);
        assert!(out.iter().any(|s| s.abs() > 0.1));

        let retired = state.handle_command(AudioCommand::DetachMic);
        assert!(matches!(retired, Some(Retired::Mic(_))));
        assert!(state.mic.is_none());
    }

    #[test]
    fn test_oversized_block_renders_without_growing_scratch() {
        let mut state = EngineState::new(48000, dry_params(), AnalyzerTap::new(16))
            .with_block_capacity(256);
        state.handle_command(AudioCommand::AttachPlayer(NodeId(1), constant(0.5, 1.0, 48000)));
        state.handle_command(AudioCommand::StartPlayer(NodeId(1), 0.0));

        let mut out = vec![0.0; 1000];
        for _ in 0..10 {
            state.process(&mut out);
        }
        assert_eq!(state.program_buffer.len(), 256);
        assert_eq!(state.mic_buffer.len(), 256);
        // The tail past the last full piece is rendered too
        assert!(out[900..].iter().all(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_engine_sink_numbers_nodes() {
        let (cmd_tx, cmd_rx, _evt_tx, evt_rx) = AudioEngine::create_channels();
        let engine = AudioEngine::new(cmd_tx, evt_rx);
        let mut sink = engine.sink();

        let a = sink.attach(TrackBuffer::silent(1.0, 48000));
        let b = engine.sink().attach(TrackBuffer::silent(1.0, 48000));
        assert_ne!(a, b);

        sink.dispose(a);
        let cmds: Vec<_> = cmd_rx.try_iter().collect();
        assert_eq!(cmds.len(), 3);
        assert!(matches!(cmds[2], AudioCommand::DisposePlayer(id) if id == a));
    }
}
