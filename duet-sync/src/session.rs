//! Per-session client context
//!
//! Created when the session starts and dropped when it ends; everything the
//! front end shows about "me" lives here instead of in global state.

use crate::record::RoomKey;
use duet_audio::{EffectParameter, EffectsParameters};
use tracing::{debug, warn};

/// What one client knows about its own session
#[derive(Debug, Clone)]
pub struct SessionContext {
    user_name: String,
    room: Option<RoomKey>,
    params: EffectsParameters,
    mic_enabled: bool,
    playing: bool,
}

impl SessionContext {
    pub fn new(user_name: impl Into<String>, params: EffectsParameters) -> Self {
        Self {
            user_name: user_name.into(),
            room: None,
            params: params.clamped(),
            mic_enabled: false,
            playing: false,
        }
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn room(&self) -> Option<&RoomKey> {
        self.room.as_ref()
    }

    pub fn set_room(&mut self, room: Option<RoomKey>) {
        self.room = room;
    }

    pub fn params(&self) -> EffectsParameters {
        self.params
    }

    pub fn mic_enabled(&self) -> bool {
        self.mic_enabled
    }

    pub fn set_mic_enabled(&mut self, enabled: bool) {
        self.mic_enabled = enabled;
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Store a parameter change, returning the value actually applied
    ///
    /// A non-finite request keeps the previous value.
    pub fn set_parameter(&mut self, param: EffectParameter) -> EffectParameter {
        if param.value().is_finite() {
            let mut params = self.params;
            match param {
                EffectParameter::Pitch(st) => params.pitch_semitones = st,
                EffectParameter::Eq(band, db) => params.set_eq(band, db),
                EffectParameter::ReverbWet(wet) => params.reverb_wet = wet,
                EffectParameter::DelayWet(wet) => params.delay_wet = wet,
                EffectParameter::MasterVolume(db) => params.master_volume_db = db,
            }
            self.params = params.clamped();
        } else {
            warn!(requested = ?param, "non-finite parameter ignored");
        }

        let applied = match param {
            EffectParameter::Pitch(_) => EffectParameter::Pitch(self.params.pitch_semitones),
            EffectParameter::Eq(band, _) => EffectParameter::Eq(band, self.params.eq(band)),
            EffectParameter::ReverbWet(_) => EffectParameter::ReverbWet(self.params.reverb_wet),
            EffectParameter::DelayWet(_) => EffectParameter::DelayWet(self.params.delay_wet),
            EffectParameter::MasterVolume(_) => {
                EffectParameter::MasterVolume(self.params.master_volume_db)
            }
        };
        if applied != param && param.value().is_finite() {
            debug!(requested = ?param, applied = ?applied, "parameter clamped");
        }
        applied
    }

    /// Store the track rate, returning the clamped value
    pub fn set_tempo(&mut self, rate: f32) -> f32 {
        if !rate.is_finite() {
            warn!(rate, "non-finite tempo ignored");
            return self.params.tempo_rate;
        }
        self.params = EffectsParameters {
            tempo_rate: rate,
            ..self.params
        }
        .clamped();
        self.params.tempo_rate
    }
}
