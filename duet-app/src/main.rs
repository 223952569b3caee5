//! Duet - shared-playback vocal studio
//!
//! Line-driven client: joins a room, keeps its local playback in step with
//! the room's shared record, and runs the mic and track through the effects
//! pipeline.

mod app;
mod audio;
mod commands;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{select, Receiver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use duet_audio::{AnalyzerTap, AudioEngine, AudioEvent, LocalTransport, MonotonicClock, ANALYZER_FRAME_SIZE};
use duet_library::SessionConfig;
use duet_sync::{PlaybackSyncEngine, SessionContext, SharedRecordChannel, SqliteRecordStore};

use app::{connectivity_label, App};
use commands::{parse_command, HELP};

/// Sample rate assumed when no output device comes up
const FALLBACK_SAMPLE_RATE: u32 = 48_000;

/// How long to wait for the output stream to report in
const AUDIO_READY_TIMEOUT: Duration = Duration::from_secs(3);

/// How often the transport is checked for reaching the end of the track
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Command-line options
#[derive(Debug, Default)]
struct CliOptions {
    /// Alternate config file
    config: Option<PathBuf>,
    /// Display name override
    name: Option<String>,
    /// Room code to join
    room: Option<String>,
    /// Create a fresh room instead of joining one
    create_room: bool,
    /// Room store override
    store: Option<PathBuf>,
    /// Skip the shared record entirely
    offline: bool,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `--config <path>`: Read and write session settings at this path
    /// - `--name <name>` or `-n <name>`: Display name in the room
    /// - `--room <code>` or `-r <code>`: Join an existing room
    /// - `--create-room` or `-c`: Create a new room and join it
    /// - `--store <path>`: Room store database
    /// - `--offline`: Play locally without a room
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut options = Self::default();
        let mut i = 1;

        let value = |i: usize, flag: &str| -> String {
            match args.get(i) {
                Some(v) => v.clone(),
                None => {
                    eprintln!("Error: {} requires an argument", flag);
                    std::process::exit(1);
                }
            }
        };

        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    i += 1;
                    options.config = Some(PathBuf::from(value(i, "--config")));
                }
                "--name" | "-n" => {
                    i += 1;
                    options.name = Some(value(i, "--name"));
                }
                "--room" | "-r" => {
                    i += 1;
                    options.room = Some(value(i, "--room"));
                }
                "--create-room" | "-c" => options.create_room = true,
                "--store" => {
                    i += 1;
                    options.store = Some(PathBuf::from(value(i, "--store")));
                }
                "--offline" => options.offline = true,
                "--help" | "-h" => {
                    eprintln!("duet - Shared-playback vocal studio");
                    eprintln!();
                    eprintln!(
                        "Usage: {} [OPTIONS]",
                        args.first().map(String::as_str).unwrap_or("duet")
                    );
                    eprintln!();
                    eprintln!("Options:");
                    eprintln!("      --config <PATH>  Session config file");
                    eprintln!("  -n, --name <NAME>    Display name in the room");
                    eprintln!("  -r, --room <CODE>    Join an existing room");
                    eprintln!("  -c, --create-room    Create a new room and join it");
                    eprintln!("      --store <PATH>   Room store database");
                    eprintln!("      --offline        Play locally without a room");
                    eprintln!("  -h, --help           Print this help message");
                    eprintln!();
                    eprintln!("Set RUST_LOG=duet=debug for diagnostics on stderr.");
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Error: unknown argument '{}'", other);
                    eprintln!("Run with --help for usage.");
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        options
    }
}

fn main() -> Result<()> {
    let cli = CliOptions::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(SessionConfig::config_path);
    let mut config = SessionConfig::load_from(&config_path)
        .unwrap_or_default()
        .clamped();
    if let Some(store) = &cli.store {
        config.store_path = Some(store.clone());
    }

    let user_name = cli
        .name
        .clone()
        .or_else(|| config.user_name.clone())
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "guest".to_string());

    // Create audio channels
    let (cmd_tx, cmd_rx, evt_tx, evt_rx) = AudioEngine::create_channels();

    // Shutdown flag
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_audio = shutdown.clone();

    let tap = AnalyzerTap::new(ANALYZER_FRAME_SIZE);
    let tap_audio = tap.clone();
    let params = config.effects;

    // Spawn audio thread
    let audio_handle = thread::Builder::new()
        .name("duet-audio".into())
        .spawn(move || audio::run_audio_thread(cmd_rx, evt_tx, shutdown_audio, params, tap_audio))?;

    let engine = AudioEngine::new(cmd_tx, evt_rx);
    let sample_rate = match engine.event_rx.recv_timeout(AUDIO_READY_TIMEOUT) {
        Ok(AudioEvent::Ready { sample_rate }) => sample_rate,
        Ok(AudioEvent::Error(e)) => {
            warn!("audio unavailable, continuing silent: {}", e);
            println!("Audio unavailable: {}", e);
            FALLBACK_SAMPLE_RATE
        }
        Err(_) => {
            warn!("audio output did not start in time");
            FALLBACK_SAMPLE_RATE
        }
    };

    let store = if cli.offline {
        None
    } else {
        let path = config.store_path();
        match SqliteRecordStore::open(&path) {
            Ok(store) => Some(store.with_poll_interval(Duration::from_millis(config.poll_interval_ms))),
            Err(e) => {
                warn!(path = %path.display(), "room store unavailable: {}", e);
                println!("Room store unavailable, playing locally: {}", e);
                None
            }
        }
    };

    let transport = LocalTransport::new(
        Box::new(engine.sink()),
        Arc::new(MonotonicClock::new()),
        sample_rate,
    );
    let channel = store
        .clone()
        .map(|s| Arc::new(s) as Arc<dyn SharedRecordChannel>);
    let mut sync = PlaybackSyncEngine::new(transport, channel)
        .with_drift_threshold(config.drift_threshold_secs);
    sync.set_tempo(config.effects.tempo_rate);

    let mut session = SessionContext::new(user_name.clone(), config.effects);

    let room_code = if cli.create_room {
        match &store {
            Some(store) => match store.create_room() {
                Ok(room) => {
                    println!("Created room {}", room);
                    Some(room.as_str().to_string())
                }
                Err(e) => {
                    println!("Could not create a room: {}", e);
                    None
                }
            },
            None => {
                println!("Cannot create a room without a room store");
                None
            }
        }
    } else {
        cli.room.clone().or_else(|| config.room_code.clone())
    };

    if let Some(code) = room_code.filter(|_| !cli.offline) {
        match sync.join_room(&code) {
            Ok(room) => {
                if let Some(store) = &store {
                    if let Err(e) = store.add_participant(&room, &user_name) {
                        warn!(room = %room, "could not register participant: {}", e);
                    }
                }
                println!("Joined room {} ({})", room, connectivity_label(sync.connectivity()));
                session.set_room(Some(room));
            }
            Err(e) => println!("Could not join room {}: {}", code, e),
        }
    }

    info!(user = %user_name, sample_rate, "session started");
    println!("{}", HELP);

    let mut app = App::new(sync, session, engine, store, tap, sample_rate);
    run_loop(&mut app, spawn_stdin_reader()?);

    // Remember who we were and where we played
    config.user_name = Some(app.session.user_name().to_string());
    config.room_code = app.sync.room().map(|r| r.as_str().to_string());
    config.effects = app.session.params();
    if let Err(e) = config.save_to(&config_path) {
        warn!(path = %config_path.display(), "could not save config: {}", e);
    }

    // Cleanup
    app.sync.leave_room();
    app.shutdown();
    shutdown.store(true, Ordering::SeqCst);

    // Wait for audio thread
    let _ = audio_handle.join();
    info!("session ended");

    Ok(())
}

/// Forward stdin lines to the main loop; the channel closes on EOF
fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = crossbeam_channel::bounded(64);
    thread::Builder::new()
        .name("duet-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Main event loop: prompt input, shared record changes, and the end-of-track tick
fn run_loop(app: &mut App, lines: Receiver<String>) {
    let ticker = crossbeam_channel::tick(TICK_INTERVAL);

    loop {
        // Membership can change on reconnect, so fetch the feed each pass
        let events = app.sync.events().unwrap_or_else(crossbeam_channel::never);

        select! {
            recv(lines) -> line => {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(command) => {
                        if !app.handle_command(command) {
                            break;
                        }
                    }
                    None => println!("Unknown command, type 'help'"),
                }
            }
            recv(events) -> event => {
                if let Ok(event) = event {
                    let was_playing = app.sync.is_playing();
                    app.sync.handle_event(event);
                    if app.sync.is_playing() != was_playing {
                        println!("{}", app.position_line());
                    }
                    app.session.set_playing(app.sync.is_playing());
                }
            }
            recv(ticker) -> _ => {
                app.sync.tick();
            }
        }
    }
}
