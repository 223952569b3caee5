use crate::channel::ChannelError;
use duet_audio::LoadError;
use thiserror::Error;

/// Errors surfaced by the sync engine
///
/// Connectivity trouble while already in a room is not an error: the engine
/// degrades to local control and reports it through its status instead.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Could not resolve room: {0}")]
    RoomResolution(#[source] ChannelError),
    #[error("Track load failed: {0}")]
    TrackLoad(#[from] LoadError),
    #[error("Shared record unavailable: {0}")]
    ChannelUnavailable(String),
}
