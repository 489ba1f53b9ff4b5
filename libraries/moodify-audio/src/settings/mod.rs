//! Audio settings
//!
//! [`AudioSettings`] is the persisted, user-adjustable audio configuration.
//! [`SettingsStore`] is the single process-wide owner of it: every setter
//! persists the new state and then notifies subscribers with a
//! [`SettingsChange`] describing what moved.

mod presets;
mod store;

pub use presets::{Preset, CUSTOM_PRESET_NAME, FLAT_PRESET_NAME, PRESETS};
pub use store::{SettingsListener, SettingsStore, SubscriptionId, SETTINGS_KEY, SETTINGS_VERSION};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Equalizer gain range in dB
pub const EQ_GAIN_RANGE: (f32, f32) = (-12.0, 12.0);

/// Accepted playback-rate multipliers
pub const PLAYBACK_RATE_RANGE: (f32, f32) = (0.25, 4.0);

/// Default dry/wet mix
pub const DEFAULT_REVERB_MIX: f32 = 0.3;

/// Equalizer band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FrequencyBand {
    /// 60 Hz
    #[serde(rename = "60")]
    Hz60,
    /// 310 Hz
    #[serde(rename = "310")]
    Hz310,
    /// 1 kHz
    #[serde(rename = "1000")]
    Hz1000,
    /// 3 kHz
    #[serde(rename = "3000")]
    Hz3000,
    /// 6 kHz
    #[serde(rename = "6000")]
    Hz6000,
    /// 12 kHz
    #[serde(rename = "12000")]
    Hz12000,
}

impl FrequencyBand {
    /// Every band, low to high. This is also the order filters are chained in.
    pub const ALL: [FrequencyBand; 6] = [
        Self::Hz60,
        Self::Hz310,
        Self::Hz1000,
        Self::Hz3000,
        Self::Hz6000,
        Self::Hz12000,
    ];

    /// Center frequency in Hz
    pub fn hz(self) -> f32 {
        match self {
            Self::Hz60 => 60.0,
            Self::Hz310 => 310.0,
            Self::Hz1000 => 1000.0,
            Self::Hz3000 => 3000.0,
            Self::Hz6000 => 6000.0,
            Self::Hz12000 => 12000.0,
        }
    }

    /// Position in [`FrequencyBand::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Band with the given center frequency
    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.hz() as u32 == hz)
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hz() as u32)
    }
}

impl FromStr for FrequencyBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hz: u32 = s
            .trim()
            .trim_end_matches("Hz")
            .parse()
            .map_err(|_| format!("invalid frequency band: {s}"))?;
        Self::from_hz(hz).ok_or_else(|| format!("no equalizer band at {hz} Hz"))
    }
}

/// Loudness normalization curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMode {
    /// Compressor bypassed
    #[default]
    Off,
    /// Aggressive: -18 dB threshold
    Loud,
    /// Moderate: -24 dB threshold
    Normal,
    /// Gentle on peaks, heavy ratio: -30 dB threshold
    Quiet,
}

impl NormalizationMode {
    /// All modes
    pub const ALL: [NormalizationMode; 4] = [Self::Off, Self::Loud, Self::Normal, Self::Quiet];

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Loud => "loud",
            Self::Normal => "normal",
            Self::Quiet => "quiet",
        }
    }
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown normalization mode: {s}"))
    }
}

/// Reverb room, selects the impulse response asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomSize {
    /// Small room
    Small,
    /// Medium hall
    #[default]
    Medium,
    /// Large hall
    Large,
}

impl RoomSize {
    /// All sizes
    pub const ALL: [RoomSize; 3] = [Self::Small, Self::Medium, Self::Large];

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl fmt::Display for RoomSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|size| size.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown room size: {s}"))
    }
}

/// What a settings mutation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsChange {
    /// Equalizer toggle, a band gain, or a preset
    Equalizer,
    /// Normalization mode
    Normalization,
    /// Wave analyzer toggle (tap only, no rebuild)
    WaveAnalyzer,
    /// Reverb toggle or mix
    Reverb,
    /// Room size; the impulse for it must be loaded
    ReverbRoom(RoomSize),
    /// Playback-rate fields (display only)
    PlaybackRate,
    /// Everything back to defaults
    Reset,
}

/// Persisted audio configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    pub equalizer_enabled: bool,
    pub equalizer_gains: BTreeMap<FrequencyBand, f32>,
    /// Last applied preset, or "Custom" once a band is edited by hand
    pub active_preset_name: String,
    pub normalization_mode: NormalizationMode,
    pub wave_analyzer_enabled: bool,
    pub reverb_enabled: bool,
    /// Wet share of the dry/wet blend, 0.0 to 1.0
    pub reverb_mix: f32,
    pub reverb_room_size: RoomSize,
    pub playback_rate_enabled: bool,
    /// UI-facing multiplier; never changes the engine clock
    pub playback_rate: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            equalizer_enabled: true,
            equalizer_gains: FrequencyBand::ALL.into_iter().map(|band| (band, 0.0)).collect(),
            active_preset_name: FLAT_PRESET_NAME.to_string(),
            normalization_mode: NormalizationMode::Off,
            wave_analyzer_enabled: true,
            reverb_enabled: false,
            reverb_mix: DEFAULT_REVERB_MIX,
            reverb_room_size: RoomSize::Medium,
            playback_rate_enabled: false,
            playback_rate: 1.0,
        }
    }
}

impl AudioSettings {
    /// Gain of one band (0 dB if missing)
    pub fn gain(&self, band: FrequencyBand) -> f32 {
        self.equalizer_gains.get(&band).copied().unwrap_or(0.0)
    }

    /// Gains in [`FrequencyBand::ALL`] order
    pub fn gains(&self) -> [f32; 6] {
        FrequencyBand::ALL.map(|band| self.gain(band))
    }

    /// Rate that time-math consumers should use (1.0 when disabled)
    pub fn effective_playback_rate(&self) -> f32 {
        if self.playback_rate_enabled {
            self.playback_rate
        } else {
            1.0
        }
    }

    /// Scale wall-clock elapsed time into track time, e.g. for lyric sync
    pub fn scaled_position(&self, elapsed: Duration) -> Duration {
        elapsed.mul_f32(self.effective_playback_rate())
    }

    /// Fill missing bands and clamp everything into range
    ///
    /// Returns true if anything changed.
    pub fn sanitize(&mut self) -> bool {
        let before = self.clone();

        for band in FrequencyBand::ALL {
            let gain = self.equalizer_gains.entry(band).or_insert(0.0);
            *gain = clamp_gain(*gain);
        }
        self.reverb_mix = if self.reverb_mix.is_finite() {
            self.reverb_mix.clamp(0.0, 1.0)
        } else {
            DEFAULT_REVERB_MIX
        };
        self.playback_rate = clamp_rate(self.playback_rate);
        if self.active_preset_name.trim().is_empty() {
            self.active_preset_name = CUSTOM_PRESET_NAME.to_string();
        }

        *self != before
    }
}

pub(crate) fn clamp_gain(db: f32) -> f32 {
    if db.is_finite() {
        db.clamp(EQ_GAIN_RANGE.0, EQ_GAIN_RANGE.1)
    } else {
        0.0
    }
}

pub(crate) fn clamp_rate(rate: f32) -> f32 {
    if rate.is_finite() {
        rate.clamp(PLAYBACK_RATE_RANGE.0, PLAYBACK_RATE_RANGE.1)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = AudioSettings::default();
        assert!(settings.equalizer_enabled);
        assert_eq!(settings.gains(), [0.0; 6]);
        assert_eq!(settings.active_preset_name, "Flat");
        assert_eq!(settings.normalization_mode, NormalizationMode::Off);
        assert!(settings.wave_analyzer_enabled);
        assert!(!settings.reverb_enabled);
        assert_eq!(settings.reverb_mix, 0.3);
        assert_eq!(settings.reverb_room_size, RoomSize::Medium);
        assert!(!settings.playback_rate_enabled);
        assert_eq!(settings.playback_rate, 1.0);
    }

    #[test]
    fn serializes_bands_as_frequencies() {
        let json = serde_json::to_value(AudioSettings::default()).unwrap();
        assert_eq!(json["equalizerGains"]["1000"], 0.0);
        assert_eq!(json["normalizationMode"], "off");
        assert_eq!(json["reverbRoomSize"], "medium");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: AudioSettings =
            serde_json::from_str(r#"{"reverbEnabled": true, "reverbRoomSize": "large"}"#).unwrap();
        assert!(settings.reverb_enabled);
        assert_eq!(settings.reverb_room_size, RoomSize::Large);
        assert_eq!(settings.reverb_mix, 0.3);
        assert!(settings.equalizer_enabled);
    }

    #[test]
    fn sanitize_clamps_and_fills() {
        let mut settings = AudioSettings::default();
        settings.equalizer_gains.clear();
        settings.equalizer_gains.insert(FrequencyBand::Hz60, 40.0);
        settings.reverb_mix = 3.0;
        settings.playback_rate = f32::NAN;

        assert!(settings.sanitize());
        assert_eq!(settings.gain(FrequencyBand::Hz60), 12.0);
        assert_eq!(settings.equalizer_gains.len(), 6);
        assert_eq!(settings.reverb_mix, 1.0);
        assert_eq!(settings.playback_rate, 1.0);
        assert!(!settings.sanitize());
    }

    #[test]
    fn playback_rate_is_display_only_math() {
        let mut settings = AudioSettings::default();
        settings.playback_rate = 1.5;
        assert_eq!(settings.effective_playback_rate(), 1.0);
        assert_eq!(settings.scaled_position(Duration::from_secs(10)), Duration::from_secs(10));

        settings.playback_rate_enabled = true;
        assert_eq!(settings.effective_playback_rate(), 1.5);
        assert_eq!(settings.scaled_position(Duration::from_secs(10)), Duration::from_secs(15));
    }

    #[test]
    fn parse_enums() {
        assert_eq!("LOUD".parse::<NormalizationMode>().unwrap(), NormalizationMode::Loud);
        assert_eq!("small".parse::<RoomSize>().unwrap(), RoomSize::Small);
        assert_eq!("1000".parse::<FrequencyBand>().unwrap(), FrequencyBand::Hz1000);
        assert_eq!("60Hz".parse::<FrequencyBand>().unwrap(), FrequencyBand::Hz60);
        assert!("440".parse::<FrequencyBand>().is_err());
        assert!("huge".parse::<RoomSize>().is_err());
    }
}
