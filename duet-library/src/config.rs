//! Session configuration persistence for Duet
//!
//! Stores the user's name, last room, store location, sync tuning, and the
//! effects defaults a new session starts with.

use duet_audio::{EffectsParameters, EqBand};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur reading or writing the config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub const DEFAULT_DRIFT_THRESHOLD_SECS: f64 = 1.0;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Display name used when joining rooms
    pub user_name: Option<String>,
    /// Room to join on start
    pub room_code: Option<String>,
    /// Room store database; defaults to the data dir
    pub store_path: Option<PathBuf>,
    pub drift_threshold_secs: f64,
    pub poll_interval_ms: u64,
    /// Effects defaults for a new session
    pub effects: EffectsParameters,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_name: None,
            room_code: None,
            store_path: None,
            drift_threshold_secs: DEFAULT_DRIFT_THRESHOLD_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            effects: EffectsParameters::default(),
        }
    }
}

impl SessionConfig {
    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, self.serialize())?;
        Ok(())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("duet")
            .join("session.txt")
    }

    /// Get the default room store path
    pub fn default_store_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("duet")
            .join("rooms.db")
    }

    /// Configured store path, or the default
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(Self::default_store_path)
    }

    /// Parse config from simple key=value format
    ///
    /// Unknown keys are ignored; malformed values keep the default.
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warn!(line, "config line without '=' ignored");
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "user_name" => config.user_name = non_empty(value),
                "room_code" => config.room_code = non_empty(value),
                "store_path" => config.store_path = non_empty(value).map(PathBuf::from),
                "drift_threshold_secs" => set_parsed(&mut config.drift_threshold_secs, key, value),
                "poll_interval_ms" => set_parsed(&mut config.poll_interval_ms, key, value),
                "pitch" => set_parsed(&mut config.effects.pitch_semitones, key, value),
                "tempo" => set_parsed(&mut config.effects.tempo_rate, key, value),
                "reverb_wet" => set_parsed(&mut config.effects.reverb_wet, key, value),
                "delay_wet" => set_parsed(&mut config.effects.delay_wet, key, value),
                "eq_low" => set_parsed(&mut config.effects.eq_low_db, key, value),
                "eq_mid" => set_parsed(&mut config.effects.eq_mid_db, key, value),
                "eq_high" => set_parsed(&mut config.effects.eq_high_db, key, value),
                "master_volume_db" => set_parsed(&mut config.effects.master_volume_db, key, value),
                _ => {} // Ignore unknown keys
            }
        }

        config.clamped()
    }

    /// Copy with every value in its documented range
    pub fn clamped(mut self) -> Self {
        self.effects = self.effects.clamped();
        self.drift_threshold_secs = self.drift_threshold_secs.clamp(0.1, 10.0);
        self.poll_interval_ms = self.poll_interval_ms.clamp(10, 5000);
        self
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = Vec::new();
        lines.push("# Duet session configuration".to_string());

        if let Some(ref name) = self.user_name {
            lines.push(format!("user_name={}", name));
        }
        if let Some(ref room) = self.room_code {
            lines.push(format!("room_code={}", room));
        }
        if let Some(ref path) = self.store_path {
            lines.push(format!("store_path={}", path.display()));
        }
        lines.push(format!("drift_threshold_secs={}", self.drift_threshold_secs));
        lines.push(format!("poll_interval_ms={}", self.poll_interval_ms));

        let fx = &self.effects;
        lines.push(format!("pitch={}", fx.pitch_semitones));
        lines.push(format!("tempo={}", fx.tempo_rate));
        lines.push(format!("reverb_wet={}", fx.reverb_wet));
        lines.push(format!("delay_wet={}", fx.delay_wet));
        for (key, band) in [("eq_low", EqBand::Low), ("eq_mid", EqBand::Mid), ("eq_high", EqBand::High)] {
            lines.push(format!("{}={}", key, fx.eq(band)));
        }
        lines.push(format!("master_volume_db={}", fx.master_volume_db));

        lines.join("\n")
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, value: &str) {
    if value.parse::<f64>().is_ok_and(|v| !v.is_finite()) {
        warn!(key, value, "non-finite config value ignored");
        return;
    }
    match value.parse() {
        Ok(v) => *slot = v,
        Err(_) => warn!(key, value, "malformed config value ignored"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        let config = SessionConfig::parse("");
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.effects.master_volume_db, -10.0);
    }

    #[test]
    fn test_parse_values() {
        let content = "user_name=ana\nroom_code=ab12cd\npitch=3\nreverb_wet=0.5\neq_mid=-4";
        let config = SessionConfig::parse(content);
        assert_eq!(config.user_name.as_deref(), Some("ana"));
        assert_eq!(config.room_code.as_deref(), Some("ab12cd"));
        assert_eq!(config.effects.pitch_semitones, 3.0);
        assert_eq!(config.effects.reverb_wet, 0.5);
        assert_eq!(config.effects.eq_mid_db, -4.0);
    }

    #[test]
    fn test_parse_with_comments_and_unknown_keys() {
        let content = "# Comment\nuser_name=ben\nshoe_size=44\n# Another comment";
        let config = SessionConfig::parse(content);
        assert_eq!(config.user_name.as_deref(), Some("ben"));
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let config = SessionConfig::parse("pitch=50\ntempo=9\nmaster_volume_db=6\npoll_interval_ms=0");
        assert_eq!(config.effects.pitch_semitones, 12.0);
        assert_eq!(config.effects.tempo_rate, 1.5);
        assert_eq!(config.effects.master_volume_db, 0.0);
        assert_eq!(config.poll_interval_ms, 10);
    }

    #[test]
    fn test_malformed_value_keeps_default() {
        let config = SessionConfig::parse("delay_wet=lots\ndrift_threshold_secs=");
        assert_eq!(config.effects.delay_wet, 0.2);
        assert_eq!(config.drift_threshold_secs, DEFAULT_DRIFT_THRESHOLD_SECS);
    }

    #[test]
    fn test_non_finite_values_keep_default() {
        let config = SessionConfig::parse("pitch=nan\nreverb_wet=inf\ndrift_threshold_secs=-inf\neq_low=3");
        assert_eq!(config.effects.pitch_semitones, 0.0);
        assert_eq!(config.effects.reverb_wet, 0.3);
        assert_eq!(config.drift_threshold_secs, DEFAULT_DRIFT_THRESHOLD_SECS);
        assert_eq!(config.effects.eq_low_db, 3.0);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut config = SessionConfig {
            user_name: Some("ana".into()),
            store_path: Some(PathBuf::from("/tmp/rooms.db")),
            ..SessionConfig::default()
        };
        config.effects.set_eq(EqBand::High, 6.0);
        config.effects.pitch_semitones = -2.0;

        let parsed = SessionConfig::parse(&config.serialize());
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_store_path_default() {
        let config = SessionConfig::default();
        assert!(config.store_path().ends_with("duet/rooms.db"));
    }
}
