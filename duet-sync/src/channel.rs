//! Shared-record channel - read, write, and change notifications for a room
//!
//! Delivery is at-least-once and unordered: a subscriber may see the same
//! record twice, or an older one after a newer one. Consumers reconcile
//! against each record as it arrives and never rely on sequence.

use crate::record::{PlaybackIntent, RoomKey, SharedPlaybackRecord};
use crossbeam_channel::Receiver;
use thiserror::Error;

/// Errors that can occur talking to the shared record
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Shared record unavailable: {0}")]
    Unavailable(String),
    #[error("Room not found: {0}")]
    RoomNotFound(RoomKey),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Whether the room itself is unknown, as opposed to the store failing
    pub fn is_room_not_found(&self) -> bool {
        matches!(self, ChannelError::RoomNotFound(_))
    }
}

/// Notification delivered to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The room's record changed (or was redelivered)
    Changed(SharedPlaybackRecord),
    /// The channel lost (false) or regained (true) access to the store
    Connectivity(bool),
}

/// Access to the per-room shared playback record
pub trait SharedRecordChannel: Send + Sync {
    /// Fetch the current record
    fn read(&self, room: &RoomKey) -> Result<SharedPlaybackRecord, ChannelError>;

    /// Overwrite the record with `intent` (last writer wins)
    fn write(&self, room: &RoomKey, intent: PlaybackIntent) -> Result<(), ChannelError>;

    /// Start receiving change notifications for `room`
    fn subscribe(&self, room: &RoomKey) -> Result<Subscription, ChannelError>;
}

/// Live change feed for one room; dropping it unsubscribes
pub struct Subscription {
    events: Receiver<ChannelEvent>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(events: Receiver<ChannelEvent>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            events,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Receiver side of the feed, for `select!` loops
    pub fn events(&self) -> &Receiver<ChannelEvent> {
        &self.events
    }

    /// Everything delivered so far, without blocking
    pub fn drain(&self) -> Vec<ChannelEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pending", &self.events.len())
            .finish()
    }
}
