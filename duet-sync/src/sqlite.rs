//! SQLite room directory and shared record store
//!
//! Every room is one row in `rooms`; a write replaces `playing`/`position`
//! and bumps `version`. Subscriptions poll their row on a watcher thread and
//! emit a change whenever the version moves, so several processes pointed at
//! the same database file see each other's writes.

use crate::channel::{ChannelError, ChannelEvent, SharedRecordChannel, Subscription};
use crate::record::{PlaybackIntent, RoomKey, SharedPlaybackRecord};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Length of generated room codes
pub const ROOM_CODE_LEN: usize = 6;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default change-feed poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Random upper-case room code
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Room directory and shared record backed by SQLite
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
}

impl SqliteRecordStore {
    /// SQL schema for rooms and their participants
    const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS rooms (
            room_code TEXT PRIMARY KEY NOT NULL,
            playing INTEGER NOT NULL DEFAULT 0,
            position REAL NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS participants (
            id INTEGER PRIMARY KEY,
            room_code TEXT NOT NULL REFERENCES rooms(room_code) ON DELETE CASCADE,
            name TEXT NOT NULL,
            joined_at INTEGER NOT NULL,
            UNIQUE(room_code, name)
        );
        CREATE INDEX IF NOT EXISTS idx_participants_room ON participants(room_code);
    "#;

    /// Open or create a store at the given path
    pub fn open(db_path: &Path) -> Result<Self, ChannelError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        // Several clients may share the file
        conn.busy_timeout(Duration::from_secs(2))?;
        conn.execute_batch(Self::SCHEMA)?;
        info!(path = %db_path.display(), "room store opened");
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, ChannelError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(Self::SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Change how often subscriptions poll for changes
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Create a room with a fresh code, paused at the start
    pub fn create_room(&self) -> Result<RoomKey, ChannelError> {
        let conn = self.conn.lock();
        let now = now_millis();
        loop {
            let code = generate_room_code();
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO rooms (room_code, created_at, updated_at) VALUES (?1, ?2, ?2)",
                params![code, now],
            )?;
            if inserted == 1 {
                info!(room = %code, "room created");
                return Ok(RoomKey::new(&code));
            }
            debug!(room = %code, "room code collision, retrying");
        }
    }

    /// Normalize a typed code and check that the room exists
    pub fn resolve(&self, code: &str) -> Result<RoomKey, ChannelError> {
        let room = RoomKey::new(code);
        let exists = self
            .conn
            .lock()
            .query_row(
                "SELECT 1 FROM rooms WHERE room_code = ?1",
                params![room.as_str()],
                |_| Ok(()),
            )
            .optional()?;

        match exists {
            Some(()) => Ok(room),
            None => Err(ChannelError::RoomNotFound(room)),
        }
    }

    /// Register a participant; joining twice under one name is a no-op
    pub fn add_participant(&self, room: &RoomKey, name: &str) -> Result<(), ChannelError> {
        self.resolve(room.as_str())?;
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO participants (room_code, name, joined_at) VALUES (?1, ?2, ?3)",
            params![room.as_str(), name.trim(), now_millis()],
        )?;
        Ok(())
    }

    /// Participant names in join order
    pub fn participants(&self, room: &RoomKey) -> Result<Vec<String>, ChannelError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name FROM participants WHERE room_code = ?1 ORDER BY joined_at, id",
        )?;
        let names = stmt
            .query_map(params![room.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn read_row(conn: &Connection, room: &RoomKey) -> Result<SharedPlaybackRecord, ChannelError> {
        conn.query_row(
            "SELECT playing, position, version, updated_at FROM rooms WHERE room_code = ?1",
            params![room.as_str()],
            |row| {
                Ok(SharedPlaybackRecord {
                    room: room.clone(),
                    playing: row.get::<_, i64>(0)? != 0,
                    position: row.get(1)?,
                    version: row.get::<_, i64>(2)? as u64,
                    updated_at: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| ChannelError::RoomNotFound(room.clone()))
    }
}

impl SharedRecordChannel for SqliteRecordStore {
    fn read(&self, room: &RoomKey) -> Result<SharedPlaybackRecord, ChannelError> {
        Self::read_row(&self.conn.lock(), room)
    }

    fn write(&self, room: &RoomKey, intent: PlaybackIntent) -> Result<(), ChannelError> {
        let updated = self.conn.lock().execute(
            "UPDATE rooms SET playing = ?2, position = ?3, version = version + 1, updated_at = ?4
             WHERE room_code = ?1",
            params![room.as_str(), intent.playing, intent.position, now_millis()],
        )?;
        if updated == 0 {
            return Err(ChannelError::RoomNotFound(room.clone()));
        }
        debug!(room = %room, playing = intent.playing, position = intent.position, "record written");
        Ok(())
    }

    fn subscribe(&self, room: &RoomKey) -> Result<Subscription, ChannelError> {
        let initial = self.read(room)?;
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        let watcher = Watcher {
            conn: self.conn.clone(),
            room: room.clone(),
            tx,
            stop: stop.clone(),
            interval: self.poll_interval,
            last_version: initial.version,
        };
        thread::Builder::new()
            .name(format!("duet-watch-{}", room))
            .spawn(move || watcher.run())?;

        debug!(room = %room, version = initial.version, "change feed started");
        Ok(Subscription::new(rx, move || {
            stop.store(true, Ordering::Relaxed);
        }))
    }
}

/// Polls one room row and turns version bumps into change events
struct Watcher {
    conn: Arc<Mutex<Connection>>,
    room: RoomKey,
    tx: Sender<ChannelEvent>,
    stop: Arc<AtomicBool>,
    interval: Duration,
    last_version: u64,
}

impl Watcher {
    fn run(mut self) {
        let mut online = true;

        while !self.stop.load(Ordering::Relaxed) {
            thread::sleep(self.interval);
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            let result = SqliteRecordStore::read_row(&self.conn.lock(), &self.room);
            let event = match result {
                Ok(record) => {
                    if !online {
                        online = true;
                        info!(room = %self.room, "change feed recovered");
                        if self.tx.send(ChannelEvent::Connectivity(true)).is_err() {
                            break;
                        }
                    }
                    if record.version == self.last_version {
                        continue;
                    }
                    self.last_version = record.version;
                    ChannelEvent::Changed(record)
                }
                Err(e) => {
                    if !online {
                        continue;
                    }
                    online = false;
                    warn!(room = %self.room, "change feed query failed: {}", e);
                    ChannelEvent::Connectivity(false)
                }
            };

            // Receiver gone means the subscription was dropped
            if self.tx.send(event).is_err() {
                break;
            }
        }

        debug!(room = %self.room, "change feed stopped");
    }
}
