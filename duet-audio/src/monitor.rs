//! Microphone monitoring - default input device into the mic effects chain
//!
//! The cpal input callback pushes stereo frames into a lock-free SPSC ring;
//! the engine drains the consumer half inside the output callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use thiserror::Error;
use tracing::{error, info, warn};

/// Consumer half of the mic ring, handed to the audio engine
pub type MicFeed = HeapCons<f32>;

/// Half a second of stereo audio at 48 kHz
const MIC_RING_CAPACITY: usize = 48000;

/// Errors that can occur while opening the microphone
#[derive(Error, Debug)]
pub enum MicError {
    #[error("No audio input device found")]
    NoInputDevice,
    #[error("Microphone access denied: {0}")]
    AccessDenied(String),
    #[error("Input stream error: {0}")]
    Stream(String),
}

/// A running input stream; dropping it stops capture
pub struct MicMonitor {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl MicMonitor {
    /// Open the default input device and start capturing
    ///
    /// `output_sample_rate` is requested from the device; when it is not
    /// supported the device default is used and the mismatch is logged.
    pub fn start(output_sample_rate: u32) -> Result<(Self, MicFeed), MicError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(MicError::NoInputDevice)?;

        let supported = device
            .default_input_config()
            .map_err(|e| classify(e.to_string()))?;
        let channels = supported.channels();
        let mut config: cpal::StreamConfig = supported.into();
        if config.sample_rate.0 != output_sample_rate {
            let matching = device
                .supported_input_configs()
                .map(|mut configs| {
                    configs.any(|c| {
                        c.channels() == channels
                            && c.min_sample_rate().0 <= output_sample_rate
                            && c.max_sample_rate().0 >= output_sample_rate
                    })
                })
                .unwrap_or(false);
            if matching {
                config.sample_rate = cpal::SampleRate(output_sample_rate);
            } else {
                warn!(
                    input = config.sample_rate.0,
                    output = output_sample_rate,
                    "mic sample rate differs from output"
                );
            }
        }

        let (producer, feed) = HeapRb::<f32>::new(MIC_RING_CAPACITY).split();
        let mut capture = Capture {
            producer,
            channels: channels as usize,
        };

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| capture.push(data),
                |err| error!("Mic stream error: {}", err),
                None,
            )
            .map_err(|e| classify(e.to_string()))?;

        stream.play().map_err(|e| classify(e.to_string()))?;

        let name = device.name().unwrap_or_else(|_| "unknown".into());
        info!(device = %name, sample_rate = config.sample_rate.0, channels, "mic monitoring started");

        Ok((
            Self {
                _stream: stream,
                sample_rate: config.sample_rate.0,
                channels,
            },
            feed,
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Backends report permission problems as free-form text
fn classify(message: String) -> MicError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        MicError::AccessDenied(message)
    } else {
        MicError::Stream(message)
    }
}

/// Producer side owned by the input callback
struct Capture {
    producer: HeapProd<f32>,
    channels: usize,
}

impl Capture {
    /// Push input frames as stereo pairs, dropping what does not fit
    fn push(&mut self, data: &[f32]) {
        let channels = self.channels.max(1);
        for frame in data.chunks_exact(channels) {
            if self.producer.vacant_len() < 2 {
                break;
            }
            let left = frame[0];
            let right = if channels > 1 { frame[1] } else { left };
            let _ = self.producer.try_push(left);
            let _ = self.producer.try_push(right);
        }
    }
}

/// Drain up to `out.len()` samples from the feed, zero-filling the rest
pub(crate) fn drain_feed(feed: &mut MicFeed, out: &mut [f32]) {
    let read = feed.pop_slice(out);
    out[read..].fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_capture_duplicates_channels() {
        let (producer, mut feed) = HeapRb::<f32>::new(16).split();
        let mut capture = Capture {
            producer,
            channels: 1,
        };
        capture.push(&[0.1, 0.2]);

        let mut out = [9.0; 6];
        drain_feed(&mut feed, &mut out);
        assert_eq!(out, [0.1, 0.1, 0.2, 0.2, 0.0, 0.0]);
    }

    #[test]
    fn test_full_ring_drops_frames() {
        let (producer, feed) = HeapRb::<f32>::new(4).split();
        let mut capture = Capture {
            producer,
            channels: 2,
        };
        capture.push(&[1.0; 12]);
        assert_eq!(feed.occupied_len(), 4);
    }

    #[test]
    fn test_classify_permission_errors() {
        assert!(matches!(
            classify("Permission denied by user".into()),
            MicError::AccessDenied(_)
        ));
        assert!(matches!(classify("device busy".into()), MicError::Stream(_)));
    }
}
