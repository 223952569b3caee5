//! Track loading and session configuration for Duet

mod config;
mod loader;

pub use config::{ConfigError, SessionConfig, DEFAULT_DRIFT_THRESHOLD_SECS, DEFAULT_POLL_INTERVAL_MS};
pub use loader::{FileSource, LoadedTrack, TrackLoader, TrackMetadata};
