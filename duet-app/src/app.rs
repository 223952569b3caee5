//! Interactive session - routes prompt commands to sync, audio, and session state

use std::path::PathBuf;

use duet_audio::{AnalyzerTap, AudioCommand, AudioEngine, EffectParameter, MicMonitor};
use duet_library::FileSource;
use duet_sync::{
    Connectivity, Dispatch, PlaybackSyncEngine, SessionContext, SqliteRecordStore, SyncError,
};
use tracing::{info, warn};

use crate::commands::{Command, HELP};

/// Scope width in characters
const SCOPE_WIDTH: usize = 64;

/// Everything one client owns for the length of a session
pub struct App {
    pub sync: PlaybackSyncEngine,
    pub session: SessionContext,
    audio: AudioEngine,
    store: Option<SqliteRecordStore>,
    tap: AnalyzerTap,
    mic: Option<MicMonitor>,
    sample_rate: u32,
}

impl App {
    pub fn new(
        sync: PlaybackSyncEngine,
        session: SessionContext,
        audio: AudioEngine,
        store: Option<SqliteRecordStore>,
        tap: AnalyzerTap,
        sample_rate: u32,
    ) -> Self {
        Self {
            sync,
            session,
            audio,
            store,
            tap,
            mic: None,
            sample_rate,
        }
    }

    /// Run one command; returns false when the session should end
    pub fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Load(path) => self.load(path),
            Command::Play => {
                let dispatch = self.sync.play();
                self.report_dispatch(dispatch);
            }
            Command::Pause => {
                let dispatch = self.sync.pause();
                self.report_dispatch(dispatch);
            }
            Command::Toggle => {
                let dispatch = self.sync.toggle_playback(self.session.playing());
                self.report_dispatch(dispatch);
            }
            Command::Seek(secs) => {
                let dispatch = self.sync.seek(secs);
                self.report_dispatch(dispatch);
            }
            Command::Mic => self.toggle_mic(),
            Command::Pitch(st) => self.set_parameter(EffectParameter::Pitch(st)),
            Command::Tempo(rate) => {
                let applied = self.session.set_tempo(rate);
                self.sync.set_tempo(applied);
                println!("tempo {:.2}x", applied);
            }
            Command::Reverb(wet) => self.set_parameter(EffectParameter::ReverbWet(wet)),
            Command::Delay(wet) => self.set_parameter(EffectParameter::DelayWet(wet)),
            Command::Eq(band, db) => self.set_parameter(EffectParameter::Eq(band, db)),
            Command::Volume(db) => self.set_parameter(EffectParameter::MasterVolume(db)),
            Command::Status => println!("{}", self.status_text()),
            Command::Scope => println!(
                "[{}] peak {:.2}",
                scope_line(&self.tap.sample(), SCOPE_WIDTH),
                self.tap.peak()
            ),
            Command::Room => self.show_room(),
            Command::Reconnect => match self.sync.reconnect() {
                Ok(()) => println!("connection: {}", connectivity_label(self.sync.connectivity())),
                Err(e) => println!("Reconnect failed: {}", e),
            },
            Command::Help => println!("{}", HELP),
            Command::Quit => return false,
        }
        self.session.set_playing(self.sync.is_playing());
        true
    }

    fn load(&mut self, path: PathBuf) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match self.sync.load_track(&FileSource::new(path)) {
            Ok(duration) => println!("Loaded {} ({})", name, format_time(duration)),
            Err(SyncError::TrackLoad(e)) => println!("Could not load track: {}", e),
            Err(e) => println!("Load failed: {}", e),
        }
    }

    fn report_dispatch(&self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Ignored => println!("No track loaded"),
            Dispatch::Published(_) => {}
            Dispatch::AppliedLocally(intent) => {
                if self.sync.connectivity() == Connectivity::Degraded {
                    println!("(offline) applied locally");
                }
                tracing::debug!(?intent, "applied locally");
            }
        }
    }

    fn set_parameter(&mut self, param: EffectParameter) {
        let applied = self.session.set_parameter(param);
        self.audio.set_parameter(applied);
        match applied {
            EffectParameter::Pitch(st) => println!("pitch {:+.1} st", st),
            EffectParameter::Eq(band, db) => println!("eq {:?} {:+.1} dB", band, db),
            EffectParameter::ReverbWet(wet) => println!("reverb {:.2}", wet),
            EffectParameter::DelayWet(wet) => println!("delay {:.2}", wet),
            EffectParameter::MasterVolume(db) => println!("volume {:.1} dB", db),
        }
    }

    fn toggle_mic(&mut self) {
        if self.mic.take().is_some() {
            self.audio.send(AudioCommand::DetachMic);
            self.session.set_mic_enabled(false);
            info!("mic monitoring stopped");
            println!("mic off");
            return;
        }

        match MicMonitor::start(self.sample_rate) {
            Ok((monitor, feed)) => {
                self.audio.send(AudioCommand::AttachMic(feed));
                println!(
                    "mic on ({} Hz, {} ch)",
                    monitor.sample_rate(),
                    monitor.channels()
                );
                self.mic = Some(monitor);
                self.session.set_mic_enabled(true);
            }
            Err(e) => {
                warn!("mic unavailable: {}", e);
                self.session.set_mic_enabled(false);
                println!("Mic unavailable: {}", e);
            }
        }
    }

    fn show_room(&self) {
        let Some(room) = self.sync.room() else {
            println!("Solo session (no room)");
            return;
        };
        println!(
            "Room {} ({})",
            room,
            connectivity_label(self.sync.connectivity())
        );
        if let Some(store) = &self.store {
            match store.participants(room) {
                Ok(names) => println!("Participants: {}", names.join(", ")),
                Err(e) => println!("Participants unavailable: {}", e),
            }
        }
    }

    /// One-line transport summary
    pub fn position_line(&self) -> String {
        let duration = self.sync.duration().unwrap_or(0.0);
        format!(
            "{} {} / {}",
            self.sync.status().label(),
            format_time(self.sync.current_position()),
            format_time(duration)
        )
    }

    fn status_text(&self) -> String {
        let p = self.session.params();
        format!(
            "{}\nuser {} | room {} | {}\npitch {:+.1} st | tempo {:.2}x | reverb {:.2} | delay {:.2} | eq {:+.1}/{:+.1}/{:+.1} dB | volume {:.1} dB | mic {}",
            self.position_line(),
            self.session.user_name(),
            self.sync.room().map(|r| r.as_str()).unwrap_or("-"),
            connectivity_label(self.sync.connectivity()),
            p.pitch_semitones,
            p.tempo_rate,
            p.reverb_wet,
            p.delay_wet,
            p.eq_low_db,
            p.eq_mid_db,
            p.eq_high_db,
            p.master_volume_db,
            if self.session.mic_enabled() { "on" } else { "off" },
        )
    }

    /// Stop audio and release the mic
    pub fn shutdown(&mut self) {
        self.mic = None;
        self.audio.shutdown();
    }
}

pub fn connectivity_label(connectivity: Connectivity) -> &'static str {
    match connectivity {
        Connectivity::LocalOnly => "local only",
        Connectivity::Connected => "synced",
        Connectivity::Degraded => "offline, playing locally",
    }
}

/// mm:ss
pub fn format_time(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Render a waveform frame as a row of block characters
pub fn scope_line(samples: &[f32], width: usize) -> String {
    const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    if samples.is_empty() || width == 0 {
        return String::new();
    }
    let chunk = samples.len().div_ceil(width).max(1);
    samples
        .chunks(chunk)
        .map(|c| {
            let peak = c.iter().fold(0.0f32, |acc, s| acc.max(s.abs())).min(1.0);
            LEVELS[(peak * 8.0).round() as usize]
        })
        .collect()
}
