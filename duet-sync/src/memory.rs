//! In-process shared record, for single-process sessions and tests

use crate::channel::{ChannelError, ChannelEvent, SharedRecordChannel, Subscription};
use crate::record::{PlaybackIntent, RoomKey, SharedPlaybackRecord};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

struct Subscriber {
    id: u64,
    room: RoomKey,
    tx: Sender<ChannelEvent>,
}

struct MemoryState {
    online: bool,
    records: HashMap<RoomKey, SharedPlaybackRecord>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    writes: usize,
}

impl MemoryState {
    /// Send to every live subscriber matching `filter`, pruning closed ones
    fn broadcast(&mut self, event: &ChannelEvent, filter: impl Fn(&Subscriber) -> bool) {
        self.subscribers
            .retain(|s| !filter(s) || s.tx.send(event.clone()).is_ok());
    }
}

/// Shared record held in memory; clones share the same rooms
#[derive(Clone)]
pub struct MemoryChannel {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                online: true,
                records: HashMap::new(),
                subscribers: Vec::new(),
                next_id: 0,
                writes: 0,
            })),
        }
    }

    /// Create a room paused at the start; an existing room is left alone
    pub fn create_room(&self, code: &str) -> RoomKey {
        let room = RoomKey::new(code);
        self.state
            .lock()
            .records
            .entry(room.clone())
            .or_insert_with(|| SharedPlaybackRecord::new(room.clone()));
        room
    }

    /// Simulate losing or regaining the store; subscribers are told
    pub fn set_online(&self, online: bool) {
        let mut state = self.state.lock();
        if state.online == online {
            return;
        }
        state.online = online;
        state.broadcast(&ChannelEvent::Connectivity(online), |_| true);
    }

    pub fn is_online(&self) -> bool {
        self.state.lock().online
    }

    /// Deliver the current record again, as an at-least-once feed may
    pub fn redeliver(&self, room: &RoomKey) {
        let mut state = self.state.lock();
        if let Some(record) = state.records.get(room).cloned() {
            state.broadcast(&ChannelEvent::Changed(record), |s| &s.room == room);
        }
    }

    /// Live subscriptions for `room`
    pub fn subscriber_count(&self, room: &RoomKey) -> usize {
        self.state
            .lock()
            .subscribers
            .iter()
            .filter(|s| &s.room == room)
            .count()
    }

    /// Successful writes across all rooms
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    fn check_online(state: &MemoryState) -> Result<(), ChannelError> {
        if state.online {
            Ok(())
        } else {
            Err(ChannelError::Unavailable("memory channel offline".into()))
        }
    }
}

impl SharedRecordChannel for MemoryChannel {
    fn read(&self, room: &RoomKey) -> Result<SharedPlaybackRecord, ChannelError> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        state
            .records
            .get(room)
            .cloned()
            .ok_or_else(|| ChannelError::RoomNotFound(room.clone()))
    }

    fn write(&self, room: &RoomKey, intent: PlaybackIntent) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        Self::check_online(&state)?;

        let record = state
            .records
            .get_mut(room)
            .ok_or_else(|| ChannelError::RoomNotFound(room.clone()))?;
        record.playing = intent.playing;
        record.position = intent.position;
        record.version += 1;
        record.updated_at = record.version as i64;
        let record = record.clone();

        state.writes += 1;
        debug!(room = %room, playing = intent.playing, position = intent.position, "memory record written");
        state.broadcast(&ChannelEvent::Changed(record), |s| &s.room == room);
        Ok(())
    }

    fn subscribe(&self, room: &RoomKey) -> Result<Subscription, ChannelError> {
        let mut state = self.state.lock();
        Self::check_online(&state)?;
        if !state.records.contains_key(room) {
            return Err(ChannelError::RoomNotFound(room.clone()));
        }

        let (tx, rx) = unbounded();
        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.push(Subscriber {
            id,
            room: room.clone(),
            tx,
        });

        let shared = self.state.clone();
        Ok(Subscription::new(rx, move || {
            shared.lock().subscribers.retain(|s| s.id != id);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_notifies_room_subscribers_only() {
        let channel = MemoryChannel::new();
        let a = channel.create_room("aaa111");
        let b = channel.create_room("bbb222");
        let sub_a = channel.subscribe(&a).unwrap();
        let sub_b = channel.subscribe(&b).unwrap();

        channel.write(&a, PlaybackIntent::playing(3.0)).unwrap();

        let events = sub_a.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChannelEvent::Changed(record) => {
                assert!(record.playing);
                assert_eq!(record.position, 3.0);
                assert_eq!(record.version, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(sub_b.drain().is_empty());
    }

    #[test]
    fn test_unknown_room() {
        let channel = MemoryChannel::new();
        let room = RoomKey::new("nope00");
        assert!(channel.read(&room).unwrap_err().is_room_not_found());
        assert!(channel.subscribe(&room).is_err());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let channel = MemoryChannel::new();
        let room = channel.create_room("abc123");
        let sub = channel.subscribe(&room).unwrap();
        assert_eq!(channel.subscriber_count(&room), 1);
        drop(sub);
        assert_eq!(channel.subscriber_count(&room), 0);
    }

    #[test]
    fn test_offline_rejects_and_notifies() {
        let channel = MemoryChannel::new();
        let room = channel.create_room("abc123");
        let sub = channel.subscribe(&room).unwrap();

        channel.set_online(false);
        assert!(matches!(
            channel.write(&room, PlaybackIntent::playing(0.0)),
            Err(ChannelError::Unavailable(_))
        ));
        assert_eq!(sub.drain(), vec![ChannelEvent::Connectivity(false)]);

        channel.set_online(true);
        assert_eq!(sub.drain(), vec![ChannelEvent::Connectivity(true)]);
        assert_eq!(channel.write_count(), 0);
    }

    #[test]
    fn test_redeliver_duplicates_current_record() {
        let channel = MemoryChannel::new();
        let room = channel.create_room("abc123");
        channel.write(&room, PlaybackIntent::paused(4.0)).unwrap();
        let sub = channel.subscribe(&room).unwrap();

        channel.redeliver(&room);
        channel.redeliver(&room);
        assert_eq!(sub.drain().len(), 2);
    }
}
