//! The shared playback record and the keys that address it

use std::fmt;

/// Room identity, normalized to trimmed upper case
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a client wants the room to be doing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackIntent {
    pub playing: bool,
    /// Seconds `playing` advances from
    pub position: f64,
}

impl PlaybackIntent {
    pub fn playing(position: f64) -> Self {
        Self {
            playing: true,
            position,
        }
    }

    pub fn paused(position: f64) -> Self {
        Self {
            playing: false,
            position,
        }
    }
}

/// One room's authoritative playback state
///
/// Last writer wins: a write replaces both fields at once and bumps the
/// version. The version and timestamp are for change detection and
/// staleness only, never for ordering writers.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedPlaybackRecord {
    pub room: RoomKey,
    pub playing: bool,
    pub position: f64,
    pub version: u64,
    /// Unix milliseconds of the last write
    pub updated_at: i64,
}

impl SharedPlaybackRecord {
    /// A fresh room: paused at the start
    pub fn new(room: RoomKey) -> Self {
        Self {
            room,
            playing: false,
            position: 0.0,
            version: 0,
            updated_at: 0,
        }
    }

    pub fn intent(&self) -> PlaybackIntent {
        PlaybackIntent {
            playing: self.playing,
            position: self.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_key_normalizes() {
        assert_eq!(RoomKey::new("  ab12cd "), RoomKey::new("AB12CD"));
        assert_eq!(RoomKey::new("ab12cd").as_str(), "AB12CD");
        assert!(RoomKey::new("   ").is_empty());
    }

    #[test]
    fn test_new_record_is_paused_at_start() {
        let record = SharedPlaybackRecord::new(RoomKey::new("ROOM01"));
        assert_eq!(record.intent(), PlaybackIntent::paused(0.0));
    }
}
