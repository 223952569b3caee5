//! Playback sync engine - reconciles the local transport with the room record
//!
//! Local intent (play, pause, seek) is published to the shared record and
//! not applied directly; the echoed record comes back through the same
//! [`PlaybackSyncEngine::handle_remote`] path every client runs. Without a
//! room, or while the record is unreachable, intent is reconciled locally
//! instead.

use crate::channel::{ChannelError, ChannelEvent, SharedRecordChannel, Subscription};
use crate::error::SyncError;
use crate::record::{PlaybackIntent, RoomKey, SharedPlaybackRecord};
use crossbeam_channel::Receiver;
use duet_audio::{LocalTransport, TrackSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drift beyond which a playing client hard-resyncs to the record
pub const DRIFT_THRESHOLD_SECS: f64 = 1.0;

/// Local playback status
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncStatus {
    /// No track loaded
    Idle,
    Stopped {
        position: f64,
    },
    Playing {
        started_at_position: f64,
        /// Clock reading when playback (re)started
        started_at: Duration,
    },
}

impl SyncStatus {
    pub fn is_playing(&self) -> bool {
        matches!(self, SyncStatus::Playing { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "no track",
            SyncStatus::Stopped { .. } => "stopped",
            SyncStatus::Playing { .. } => "playing",
        }
    }
}

/// How local intent is being applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// No room or no shared record: intent applies directly
    LocalOnly,
    /// Intent is published and reconciled from the record
    Connected,
    /// In a room, but the record is unreachable
    Degraded,
}

/// What happened to a local action
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    /// Written to the record; the transport moves when the echo arrives
    Published(PlaybackIntent),
    /// Applied straight to the transport
    AppliedLocally(PlaybackIntent),
    /// Nothing to act on (no track loaded, or a non-finite target)
    Ignored,
}

struct Membership {
    room: RoomKey,
    /// None while degraded
    subscription: Option<Subscription>,
}

/// The per-client sync state machine
pub struct PlaybackSyncEngine {
    transport: LocalTransport,
    channel: Option<Arc<dyn SharedRecordChannel>>,
    membership: Option<Membership>,
    status: SyncStatus,
    connectivity: Connectivity,
    drift_threshold: f64,
}

impl PlaybackSyncEngine {
    /// Create an engine; `channel` is None for a solo session
    pub fn new(transport: LocalTransport, channel: Option<Arc<dyn SharedRecordChannel>>) -> Self {
        Self {
            transport,
            channel,
            membership: None,
            status: SyncStatus::Idle,
            connectivity: Connectivity::LocalOnly,
            drift_threshold: DRIFT_THRESHOLD_SECS,
        }
    }

    pub fn with_drift_threshold(mut self, secs: f64) -> Self {
        self.drift_threshold = secs.max(0.0);
        self
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn room(&self) -> Option<&RoomKey> {
        self.membership.as_ref().map(|m| &m.room)
    }

    pub fn transport(&self) -> &LocalTransport {
        &self.transport
    }

    /// Live playhead in seconds
    pub fn current_position(&self) -> f64 {
        self.transport.current_position()
    }

    pub fn duration(&self) -> Option<f64> {
        self.transport.duration()
    }

    pub fn is_playing(&self) -> bool {
        self.status.is_playing()
    }

    /// Receiver for the room's change feed, for `select!` loops
    ///
    /// Events taken from it must be passed to [`Self::handle_event`].
    pub fn events(&self) -> Option<Receiver<ChannelEvent>> {
        self.membership
            .as_ref()
            .and_then(|m| m.subscription.as_ref())
            .map(|s| s.events().clone())
    }

    /// Join a room and subscribe to its record
    ///
    /// An unknown room is an error. An unreachable store is not: the engine
    /// joins in degraded mode and [`Self::reconnect`] can finish the job.
    pub fn join_room(&mut self, code: &str) -> Result<RoomKey, SyncError> {
        let Some(channel) = self.channel.clone() else {
            return Err(SyncError::ChannelUnavailable(
                "no shared record configured".into(),
            ));
        };

        let room = RoomKey::new(code);
        if room.is_empty() {
            return Err(SyncError::RoomResolution(ChannelError::RoomNotFound(room)));
        }

        // One subscription per membership
        if let Some(m) = &self.membership {
            if m.room == room && m.subscription.is_some() {
                return Ok(room);
            }
        }
        self.leave_room();

        match Self::connect(channel.as_ref(), &room) {
            Ok((record, subscription)) => {
                info!(room = %room, "joined room");
                self.membership = Some(Membership {
                    room: room.clone(),
                    subscription: Some(subscription),
                });
                self.connectivity = Connectivity::Connected;
                self.reconcile(record.intent(), self.drift_threshold);
                Ok(room)
            }
            Err(e) if e.is_room_not_found() => Err(SyncError::RoomResolution(e)),
            Err(e) => {
                warn!(room = %room, "shared record unavailable, playing locally: {}", e);
                self.membership = Some(Membership {
                    room: room.clone(),
                    subscription: None,
                });
                self.connectivity = Connectivity::Degraded;
                Ok(room)
            }
        }
    }

    fn connect(
        channel: &dyn SharedRecordChannel,
        room: &RoomKey,
    ) -> Result<(SharedPlaybackRecord, Subscription), ChannelError> {
        let subscription = channel.subscribe(room)?;
        let record = channel.read(room)?;
        Ok((record, subscription))
    }

    /// Leave the current room, dropping its subscription
    pub fn leave_room(&mut self) -> Option<RoomKey> {
        let membership = self.membership.take()?;
        self.connectivity = Connectivity::LocalOnly;
        info!(room = %membership.room, "left room");
        Some(membership.room)
    }

    /// Retry a degraded membership; re-reads and reconciles on success
    pub fn reconnect(&mut self) -> Result<(), SyncError> {
        let (Some(channel), Some(membership)) = (self.channel.clone(), self.membership.as_mut())
        else {
            return Ok(());
        };

        // A live subscription is kept either way; its feed reports recovery
        let result = match membership.subscription.take() {
            Some(subscription) => match channel.read(&membership.room) {
                Ok(record) => Ok((record, subscription)),
                Err(e) => {
                    membership.subscription = Some(subscription);
                    Err(e)
                }
            },
            None => Self::connect(channel.as_ref(), &membership.room),
        };

        match result {
            Ok((record, subscription)) => {
                membership.subscription = Some(subscription);
                if self.connectivity != Connectivity::Connected {
                    info!(room = %membership.room, "shared record reachable again");
                }
                self.connectivity = Connectivity::Connected;
                self.reconcile(record.intent(), self.drift_threshold);
                Ok(())
            }
            Err(e) if e.is_room_not_found() => {
                self.connectivity = Connectivity::Degraded;
                Err(SyncError::RoomResolution(e))
            }
            Err(e) => {
                self.connectivity = Connectivity::Degraded;
                Err(SyncError::ChannelUnavailable(e.to_string()))
            }
        }
    }

    /// Load a track; on failure the current track and status are kept
    ///
    /// In a connected room the record is read afterwards, so a late joiner
    /// picks up playback where the room is.
    pub fn load_track(&mut self, source: &dyn TrackSource) -> Result<f64, SyncError> {
        let duration = self.transport.load(source)?;
        self.status = SyncStatus::Stopped { position: 0.0 };

        if self.connectivity == Connectivity::Connected {
            match self.read_record() {
                Some(Ok(record)) => self.reconcile(record.intent(), self.drift_threshold),
                Some(Err(e)) => self.degrade(&e),
                None => {}
            }
        }
        Ok(duration)
    }

    fn read_record(&self) -> Option<Result<SharedPlaybackRecord, ChannelError>> {
        let channel = self.channel.as_ref()?;
        let membership = self.membership.as_ref()?;
        Some(channel.read(&membership.room))
    }

    fn publish(&self, intent: PlaybackIntent) -> Option<Result<(), ChannelError>> {
        let channel = self.channel.as_ref()?;
        let membership = self.membership.as_ref()?;
        let result = channel.write(&membership.room, intent);
        if result.is_ok() {
            debug!(room = %membership.room, playing = intent.playing, position = intent.position, "intent published");
        }
        Some(result)
    }

    /// Play or pause, given whether the UI believes playback is running
    pub fn toggle_playback(&mut self, currently_playing: bool) -> Dispatch {
        if self.status == SyncStatus::Idle {
            return Dispatch::Ignored;
        }
        let position = self.transport.current_position();
        let intent = if currently_playing {
            PlaybackIntent::paused(position)
        } else {
            PlaybackIntent::playing(position)
        };
        self.dispatch(intent)
    }

    pub fn play(&mut self) -> Dispatch {
        self.toggle_playback(false)
    }

    pub fn pause(&mut self) -> Dispatch {
        self.toggle_playback(true)
    }

    /// Move the playhead, keeping the current play state
    ///
    /// A non-finite target is ignored and never published.
    pub fn seek(&mut self, target: f64) -> Dispatch {
        let Some(duration) = self.transport.duration() else {
            return Dispatch::Ignored;
        };
        if !target.is_finite() {
            warn!(target, "seek ignored, target is not finite");
            return Dispatch::Ignored;
        }
        let intent = PlaybackIntent {
            playing: self.status.is_playing(),
            position: target.clamp(0.0, duration),
        };
        self.dispatch(intent)
    }

    /// Change playback rate; local only, never published
    pub fn set_tempo(&mut self, rate: f32) -> f32 {
        self.transport.set_rate(rate);
        self.transport.rate()
    }

    fn dispatch(&mut self, intent: PlaybackIntent) -> Dispatch {
        if self.connectivity == Connectivity::Connected {
            match self.publish(intent) {
                Some(Ok(())) => return Dispatch::Published(intent),
                Some(Err(e)) => self.degrade(&e),
                None => {}
            }
        }

        // Any difference is a deliberate local move
        self.reconcile(intent, 0.0);
        Dispatch::AppliedLocally(intent)
    }

    fn degrade(&mut self, err: &ChannelError) {
        if self.connectivity != Connectivity::Degraded {
            warn!("shared record unavailable, falling back to local control: {}", err);
        }
        self.connectivity = Connectivity::Degraded;
    }

    /// Reconcile against a record delivered by the change feed
    pub fn handle_remote(&mut self, record: &SharedPlaybackRecord) {
        match self.room() {
            Some(room) if *room == record.room => {}
            _ => {
                debug!(room = %record.room, "record for another room ignored");
                return;
            }
        }
        self.reconcile(record.intent(), self.drift_threshold);
    }

    /// Process one change-feed event
    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Changed(record) => self.handle_remote(&record),
            ChannelEvent::Connectivity(false) => {
                if self.connectivity == Connectivity::Connected {
                    warn!("change feed lost the shared record");
                    self.connectivity = Connectivity::Degraded;
                }
            }
            ChannelEvent::Connectivity(true) => {
                if self.connectivity == Connectivity::Degraded {
                    if let Err(e) = self.reconnect() {
                        warn!("reconnect failed: {}", e);
                    }
                }
            }
        }
    }

    /// Handle everything the subscription has delivered; returns the count
    pub fn pump(&mut self) -> usize {
        let events = match self.membership.as_ref().and_then(|m| m.subscription.as_ref()) {
            Some(subscription) => subscription.drain(),
            None => return 0,
        };
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }
        count
    }

    /// Settle a track that ran off its end; returns the playhead
    pub fn tick(&mut self) -> f64 {
        if self.transport.settle_end() {
            let position = self.transport.current_position();
            info!(position, "track finished");
            if self.status != SyncStatus::Idle {
                self.status = SyncStatus::Stopped { position };
            }
        }
        self.transport.current_position()
    }

    /// Drive the transport toward `intent`
    fn reconcile(&mut self, intent: PlaybackIntent, threshold: f64) {
        if self.status == SyncStatus::Idle {
            debug!(playing = intent.playing, position = intent.position, "no track, update ignored");
            return;
        }

        let running = self.transport.is_running();
        match (intent.playing, running) {
            (true, false) => self.start_at(intent.position),
            (false, true) => {
                self.transport.stop();
            }
            (true, true) => {
                let drift = (self.transport.current_position() - intent.position).abs();
                if drift > threshold {
                    debug!(drift, target = intent.position, "resyncing playhead");
                    self.transport.stop();
                    self.start_at(intent.position);
                }
            }
            (false, false) => {}
        }

        if !intent.playing {
            if self.transport.current_position() != intent.position {
                self.transport.seek(intent.position);
            }
            self.status = SyncStatus::Stopped {
                position: self.transport.current_position(),
            };
        }
    }

    fn start_at(&mut self, position: f64) {
        self.transport.start(position);
        // At or past the end the transport stays frozen at the duration
        if !self.transport.is_running() {
            self.status = SyncStatus::Stopped {
                position: self.transport.current_position(),
            };
            return;
        }
        self.status = SyncStatus::Playing {
            started_at_position: self.transport.current_position(),
            started_at: self.transport.clock().now(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryChannel;
    use duet_audio::recording::{RecordingSink, SinkCall};
    use duet_audio::{ManualClock, NodeId, TrackBuffer};

    struct Client {
        engine: PlaybackSyncEngine,
        sink: RecordingSink,
    }

    fn client(clock: &ManualClock, channel: Option<&MemoryChannel>) -> Client {
        let sink = RecordingSink::new();
        let transport = LocalTransport::new(Box::new(sink.clone()), Arc::new(clock.clone()), 48000);
        let channel = channel.map(|c| Arc::new(c.clone()) as Arc<dyn SharedRecordChannel>);
        Client {
            engine: PlaybackSyncEngine::new(transport, channel),
            sink,
        }
    }

    fn track(secs: f64) -> TrackBuffer {
        TrackBuffer::silent(secs, 48000)
    }

    fn record(room: &RoomKey, playing: bool, position: f64) -> SharedPlaybackRecord {
        SharedPlaybackRecord {
            room: room.clone(),
            playing,
            position,
            version: 1,
            updated_at: 0,
        }
    }

    /// A client in a room, playing at `position`, with sink history cleared
    fn playing_client_at(position: f64) -> (Client, MemoryChannel, RoomKey) {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let room = channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));
        c.engine.load_track(&track(60.0)).unwrap();
        c.engine.join_room("room01").unwrap();
        c.engine.handle_remote(&record(&room, true, position));
        c.sink.clear();
        (c, channel, room)
    }

    #[test]
    fn test_drift_beyond_threshold_restarts_once() {
        let (mut c, _, room) = playing_client_at(10.0);

        c.engine.handle_remote(&record(&room, true, 12.5));
        assert_eq!(
            c.sink.transport_calls(),
            vec![SinkCall::Stop(NodeId(1)), SinkCall::Start(NodeId(1), 12.5)]
        );
    }

    #[test]
    fn test_small_drift_is_tolerated() {
        let (mut c, _, room) = playing_client_at(10.0);

        c.engine.handle_remote(&record(&room, true, 10.4));
        assert!(c.sink.transport_calls().is_empty());
        assert!((c.engine.current_position() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_updates_are_idempotent() {
        let (mut c, _, room) = playing_client_at(0.0);

        let update = record(&room, true, 12.5);
        c.engine.handle_remote(&update);
        c.sink.clear();
        c.engine.handle_remote(&update);
        assert!(c.sink.calls().is_empty());

        let pause = record(&room, false, 30.0);
        c.engine.handle_remote(&pause);
        c.sink.clear();
        c.engine.handle_remote(&pause);
        assert!(c.sink.calls().is_empty());
        assert_eq!(c.engine.status(), SyncStatus::Stopped { position: 30.0 });
    }

    #[test]
    fn test_remote_pause_freezes_at_record_position() {
        let (mut c, _, room) = playing_client_at(10.0);

        c.engine.handle_remote(&record(&room, false, 14.0));
        assert_eq!(c.sink.transport_calls(), vec![SinkCall::Stop(NodeId(1))]);
        assert_eq!(c.engine.current_position(), 14.0);
        assert!(!c.engine.is_playing());
    }

    #[test]
    fn test_remote_play_starts_from_record_position() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let room = channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));
        c.engine.load_track(&track(60.0)).unwrap();
        c.engine.join_room("ROOM01").unwrap();
        c.sink.clear();

        c.engine.handle_remote(&record(&room, true, 5.0));
        assert_eq!(c.sink.transport_calls(), vec![SinkCall::Start(NodeId(1), 5.0)]);
        assert!(matches!(
            c.engine.status(),
            SyncStatus::Playing { started_at_position, .. } if started_at_position == 5.0
        ));
    }

    #[test]
    fn test_idle_client_ignores_remote_play() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let room = channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));
        c.engine.join_room("ROOM01").unwrap();

        c.engine.handle_remote(&record(&room, true, 5.0));
        assert!(c.sink.calls().is_empty());
        assert_eq!(c.engine.status(), SyncStatus::Idle);
        assert_eq!(c.engine.toggle_playback(false), Dispatch::Ignored);
    }

    #[test]
    fn test_local_only_toggle_plays_from_frozen_position() {
        let clock = ManualClock::new();
        let mut c = client(&clock, None);
        c.engine.load_track(&track(30.0)).unwrap();
        c.engine.seek(7.0);
        c.sink.clear();

        let dispatch = c.engine.toggle_playback(false);
        assert_eq!(dispatch, Dispatch::AppliedLocally(PlaybackIntent::playing(7.0)));
        assert!(c.engine.is_playing());
        assert_eq!(c.sink.transport_calls(), vec![SinkCall::Start(NodeId(1), 7.0)]);
        assert_eq!(c.engine.connectivity(), Connectivity::LocalOnly);
    }

    #[test]
    fn test_local_seek_while_playing_applies_exactly() {
        let clock = ManualClock::new();
        let mut c = client(&clock, None);
        c.engine.load_track(&track(30.0)).unwrap();
        c.engine.play();
        clock.advance_secs(2.0);

        c.engine.seek(2.5);
        assert!((c.engine.current_position() - 2.5).abs() < 1e-9);
        assert!(c.engine.is_playing());
    }

    #[test]
    fn test_connected_toggle_publishes_without_touching_transport() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let room = channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));
        c.engine.load_track(&track(30.0)).unwrap();
        c.engine.join_room("ROOM01").unwrap();
        c.sink.clear();

        let dispatch = c.engine.toggle_playback(false);
        assert_eq!(dispatch, Dispatch::Published(PlaybackIntent::playing(0.0)));
        assert!(c.sink.calls().is_empty());
        assert!(channel.read(&room).unwrap().playing);

        // The echo starts playback
        assert_eq!(c.engine.pump(), 1);
        assert!(c.engine.is_playing());
    }

    #[test]
    fn test_two_clients_converge() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        channel.create_room("DUET01");
        let mut a = client(&clock, Some(&channel));
        let mut b = client(&clock, Some(&channel));
        for c in [&mut a, &mut b] {
            c.engine.load_track(&track(120.0)).unwrap();
            c.engine.join_room("duet01").unwrap();
        }

        a.engine.play();
        a.engine.pump();
        b.engine.pump();
        assert!(a.engine.is_playing() && b.engine.is_playing());

        clock.advance_secs(5.0);
        b.engine.seek(40.0);
        a.engine.pump();
        b.engine.pump();
        assert!((a.engine.current_position() - b.engine.current_position()).abs() <= 1.0);
        assert!((a.engine.current_position() - 40.0).abs() < 1e-9);

        clock.advance_secs(3.0);
        a.engine.pause();
        a.engine.pump();
        b.engine.pump();
        assert!(!a.engine.is_playing() && !b.engine.is_playing());
        assert_eq!(a.engine.current_position(), b.engine.current_position());
    }

    #[test]
    fn test_late_joiner_picks_up_room_state() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let room = channel.create_room("ROOM01");
        channel
            .write(&room, PlaybackIntent::playing(20.0))
            .unwrap();

        let mut c = client(&clock, Some(&channel));
        c.engine.join_room("ROOM01").unwrap();
        assert_eq!(c.engine.status(), SyncStatus::Idle);

        c.engine.load_track(&track(60.0)).unwrap();
        assert!(c.engine.is_playing());
        assert_eq!(c.engine.current_position(), 20.0);
    }

    #[test]
    fn test_unknown_room_is_resolution_failure() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let mut c = client(&clock, Some(&channel));

        assert!(matches!(
            c.engine.join_room("NOPE00"),
            Err(SyncError::RoomResolution(_))
        ));
        assert_eq!(c.engine.room(), None);
        assert_eq!(c.engine.connectivity(), Connectivity::LocalOnly);
    }

    #[test]
    fn test_join_without_channel_fails_softly() {
        let clock = ManualClock::new();
        let mut c = client(&clock, None);
        assert!(matches!(
            c.engine.join_room("ROOM01"),
            Err(SyncError::ChannelUnavailable(_))
        ));
        assert_eq!(c.engine.connectivity(), Connectivity::LocalOnly);
    }

    #[test]
    fn test_write_failure_degrades_to_local_control() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let room = channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));
        c.engine.load_track(&track(30.0)).unwrap();
        c.engine.join_room("ROOM01").unwrap();

        channel.set_online(false);
        let dispatch = c.engine.play();
        assert_eq!(dispatch, Dispatch::AppliedLocally(PlaybackIntent::playing(0.0)));
        assert_eq!(c.engine.connectivity(), Connectivity::Degraded);
        assert!(c.engine.is_playing());

        // Record still says paused; it wins once reachable again
        channel.set_online(true);
        c.engine.pump();
        assert_eq!(c.engine.connectivity(), Connectivity::Connected);
        assert!(!c.engine.is_playing());
        assert!(!channel.read(&room).unwrap().playing);
    }

    #[test]
    fn test_join_while_offline_then_reconnect() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let room = channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));
        c.engine.load_track(&track(30.0)).unwrap();

        channel.set_online(false);
        assert_eq!(c.engine.join_room("ROOM01").unwrap(), room);
        assert_eq!(c.engine.connectivity(), Connectivity::Degraded);
        assert!(c.engine.reconnect().is_err());

        channel.set_online(true);
        channel.write(&room, PlaybackIntent::playing(3.0)).unwrap();
        c.engine.reconnect().unwrap();
        assert_eq!(c.engine.connectivity(), Connectivity::Connected);
        assert!(c.engine.is_playing());
        assert_eq!(channel.subscriber_count(&room), 1);
    }

    #[test]
    fn test_feed_loss_marks_degraded() {
        let (mut c, channel, _) = playing_client_at(0.0);
        channel.set_online(false);
        c.engine.pump();
        assert_eq!(c.engine.connectivity(), Connectivity::Degraded);
        assert!(c.engine.is_playing());
    }

    #[test]
    fn test_rejoin_same_room_keeps_single_subscription() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let room = channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));

        c.engine.join_room("ROOM01").unwrap();
        c.engine.join_room(" room01 ").unwrap();
        assert_eq!(channel.subscriber_count(&room), 1);

        c.engine.leave_room();
        assert_eq!(channel.subscriber_count(&room), 0);
        assert_eq!(c.engine.connectivity(), Connectivity::LocalOnly);
    }

    #[test]
    fn test_loading_twice_disposes_first_node() {
        let clock = ManualClock::new();
        let mut c = client(&clock, None);
        c.engine.load_track(&track(10.0)).unwrap();
        c.engine.play();
        c.engine.load_track(&track(20.0)).unwrap();

        assert_eq!(c.sink.active_nodes(), 1);
        assert_eq!(c.engine.status(), SyncStatus::Stopped { position: 0.0 });
        assert_eq!(c.engine.duration(), Some(20.0));
    }

    #[test]
    fn test_failed_load_keeps_status() {
        let clock = ManualClock::new();
        let mut c = client(&clock, None);
        c.engine.load_track(&track(10.0)).unwrap();
        c.engine.seek(4.0);

        let empty = TrackBuffer::new(Vec::new(), 48000, None);
        assert!(matches!(
            c.engine.load_track(&empty),
            Err(SyncError::TrackLoad(_))
        ));
        assert_eq!(c.engine.status(), SyncStatus::Stopped { position: 4.0 });
    }

    #[test]
    fn test_tick_settles_end_of_track() {
        let clock = ManualClock::new();
        let mut c = client(&clock, None);
        c.engine.load_track(&track(5.0)).unwrap();
        c.engine.play();

        clock.advance_secs(2.0);
        assert!((c.engine.tick() - 2.0).abs() < 1e-9);

        clock.advance_secs(10.0);
        assert_eq!(c.engine.tick(), 5.0);
        assert_eq!(c.engine.status(), SyncStatus::Stopped { position: 5.0 });
    }

    #[test]
    fn test_tick_leaves_drift_to_remote_updates() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let room = channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));
        c.engine.load_track(&track(60.0)).unwrap();
        c.engine.join_room("ROOM01").unwrap();
        c.engine.handle_remote(&record(&room, true, 10.0));
        c.sink.clear();

        // Playhead runs well past the last record with no new update
        for _ in 0..5 {
            clock.advance_secs(1.0);
            c.engine.tick();
        }
        assert!(c.sink.transport_calls().is_empty());
        assert!((c.engine.current_position() - 15.0).abs() < 1e-9);

        c.engine.handle_remote(&record(&room, true, 30.0));
        assert_eq!(
            c.sink.transport_calls(),
            vec![SinkCall::Stop(NodeId(1)), SinkCall::Start(NodeId(1), 30.0)]
        );
    }

    #[test]
    fn test_tempo_clamps_and_stays_local() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));
        c.engine.load_track(&track(30.0)).unwrap();
        c.engine.join_room("ROOM01").unwrap();

        assert_eq!(c.engine.set_tempo(3.0), 1.5);
        assert_eq!(channel.write_count(), 0);
    }

    #[test]
    fn test_non_finite_seek_is_ignored() {
        let clock = ManualClock::new();
        let mut c = client(&clock, None);
        c.engine.load_track(&track(30.0)).unwrap();

        assert_eq!(c.engine.seek(f64::NAN), Dispatch::Ignored);
        assert_eq!(c.engine.status(), SyncStatus::Stopped { position: 0.0 });

        c.engine.play();
        clock.advance_secs(3.0);
        assert!((c.engine.current_position() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_seek_is_never_published() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));
        c.engine.load_track(&track(30.0)).unwrap();
        c.engine.join_room("ROOM01").unwrap();

        assert_eq!(c.engine.seek(f64::INFINITY), Dispatch::Ignored);
        assert_eq!(channel.write_count(), 0);
        assert_eq!(c.engine.connectivity(), Connectivity::Connected);
    }

    #[test]
    fn test_remote_play_past_end_settles_and_stays_idempotent() {
        let clock = ManualClock::new();
        let channel = MemoryChannel::new();
        let room = channel.create_room("ROOM01");
        let mut c = client(&clock, Some(&channel));
        c.engine.load_track(&track(30.0)).unwrap();
        c.engine.join_room("ROOM01").unwrap();
        c.sink.clear();

        let update = record(&room, true, 45.0);
        c.engine.handle_remote(&update);
        assert_eq!(c.engine.status(), SyncStatus::Stopped { position: 30.0 });
        assert!(!c.engine.is_playing());

        c.sink.clear();
        c.engine.handle_remote(&update);
        assert!(c.sink.calls().is_empty());
        assert_eq!(c.engine.status(), SyncStatus::Stopped { position: 30.0 });
    }

    #[test]
    fn test_record_for_other_room_ignored() {
        let (mut c, _, _) = playing_client_at(10.0);
        let other = RoomKey::new("OTHER1");
        c.engine.handle_remote(&record(&other, false, 0.0));
        assert!(c.sink.calls().is_empty());
        assert!(c.engine.is_playing());
    }
}
