//! Audio thread - cpal output stream and engine command loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info};

use duet_audio::{AnalyzerTap, AudioCommand, AudioEvent, EffectsParameters, EngineState};

/// Scratch size when the device does not report a buffer range
const DEFAULT_BLOCK_FRAMES: usize = 4096;

/// Upper bound on pre-allocated frames; longer callbacks render in pieces
const MAX_BLOCK_FRAMES: usize = 16384;

/// Run the output stream until shutdown
///
/// Reports `AudioEvent::Ready` with the device sample rate once the stream
/// is playing, or `AudioEvent::Error` if it never starts.
pub fn run_audio_thread(
    cmd_rx: Receiver<AudioCommand>,
    evt_tx: Sender<AudioEvent>,
    shutdown: Arc<AtomicBool>,
    params: EffectsParameters,
    tap: AnalyzerTap,
) {
    // Get audio host and device
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(d) => d,
        None => {
            let _ = evt_tx.send(AudioEvent::Error("No audio output device found".into()));
            return;
        }
    };

    let config = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = evt_tx.send(AudioEvent::Error(format!(
                "Failed to get audio config: {}",
                e
            )));
            return;
        }
    };

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let max_frames = match config.buffer_size() {
        cpal::SupportedBufferSize::Range { max, .. } => (*max as usize).clamp(256, MAX_BLOCK_FRAMES),
        cpal::SupportedBufferSize::Unknown => DEFAULT_BLOCK_FRAMES,
    };

    // All scratch is allocated here, never in the callback
    let engine_state = Arc::new(Mutex::new(
        EngineState::new(sample_rate, params, tap).with_block_capacity(max_frames * 2),
    ));
    let engine_for_callback = engine_state.clone();
    let mut stereo_buffer = vec![0.0f32; max_frames * 2];

    // Build audio stream
    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            // Never block the real-time thread; on contention output silence
            let Some(mut state) = engine_for_callback.try_lock() else {
                data.fill(0.0);
                return;
            };

            if channels == 2 {
                state.process(data);
                return;
            }

            // Up/down-mix through the stereo scratch, one scratch-sized piece at a time
            let channels = channels.max(1);
            let piece_frames = stereo_buffer.len() / 2;
            for piece in data.chunks_mut(piece_frames * channels) {
                let frames = piece.len() / channels;
                let stereo = &mut stereo_buffer[..frames * 2];
                state.process(stereo);

                for (frame, pair) in piece.chunks_mut(channels).zip(stereo.chunks_exact(2)) {
                    if channels == 1 {
                        frame[0] = (pair[0] + pair[1]) * 0.5;
                    } else {
                        frame[0] = pair[0];
                        frame[1] = pair[1];
                        frame[2..].fill(0.0);
                    }
                }
            }
        },
        |err| {
            error!("Audio stream error: {}", err);
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = evt_tx.send(AudioEvent::Error(format!(
                "Failed to create audio stream: {}",
                e
            )));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = evt_tx.send(AudioEvent::Error(format!("Failed to start audio: {}", e)));
        return;
    }

    info!(sample_rate, channels, "audio output running");
    let _ = evt_tx.send(AudioEvent::Ready { sample_rate });

    // Command processing loop
    while !shutdown.load(Ordering::Relaxed) {
        match cmd_rx.recv_timeout(Duration::from_millis(10)) {
            Ok(AudioCommand::Shutdown) => break,
            Ok(cmd) => {
                let retired = engine_state.lock().handle_command(cmd);
                // Freed after the lock is released so the callback never waits on it
                drop(retired);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("audio output stopped");
}
