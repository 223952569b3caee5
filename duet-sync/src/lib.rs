//! Playback synchronization for Duet
//!
//! Every room has one shared playback record. Clients publish intent to it
//! and reconcile their local transport against whatever it says:
//! - Record: last-writer-wins `{playing, position}` per room
//! - Channel: read/write/subscribe over memory or SQLite
//! - Engine: the per-client state machine and drift correction

mod channel;
mod engine;
mod error;
mod memory;
mod record;
mod session;
mod sqlite;

pub use channel::{ChannelError, ChannelEvent, SharedRecordChannel, Subscription};
pub use engine::{Connectivity, Dispatch, PlaybackSyncEngine, SyncStatus, DRIFT_THRESHOLD_SECS};
pub use error::SyncError;
pub use memory::MemoryChannel;
pub use record::{PlaybackIntent, RoomKey, SharedPlaybackRecord};
pub use session::SessionContext;
pub use sqlite::{generate_room_code, SqliteRecordStore, DEFAULT_POLL_INTERVAL, ROOM_CODE_LEN};
