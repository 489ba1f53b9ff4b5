//! Process-wide settings store with change notification

use super::{
    clamp_gain, clamp_rate, AudioSettings, FrequencyBand, NormalizationMode, Preset, RoomSize,
    SettingsChange, CUSTOM_PRESET_NAME,
};
use moodify_core::{KeyValueStore, Versioned};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Storage key of the settings blob
pub const SETTINGS_KEY: &str = "audio-settings";

/// Current schema version
///
/// - v1: `equalizerGains` was an array of six gains in band order
/// - v2: `equalizerGains` is a map keyed by band frequency
pub const SETTINGS_VERSION: u32 = 2;

/// Callback invoked after every mutation with the new state
pub type SettingsListener = Arc<dyn Fn(SettingsChange, &AudioSettings) + Send + Sync>;

/// Handle returned by [`SettingsStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Inner {
    state: Mutex<AudioSettings>,
    storage: Option<Arc<dyn KeyValueStore>>,
    listeners: Mutex<Vec<(SubscriptionId, SettingsListener)>>,
    next_subscription: AtomicU64,
}

/// Owner of the live [`AudioSettings`]
///
/// Cheap to clone; clones share the same state and subscribers. Setters
/// update the state, write it to storage (if any) and then notify
/// subscribers outside of any lock, so a listener may read the store back.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("state", &*self.state())
            .field("persistent", &self.inner.storage.is_some())
            .finish()
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore {
    /// Store with default settings and no persistence
    pub fn new() -> Self {
        Self::with_state(AudioSettings::default(), None)
    }

    fn with_state(state: AudioSettings, storage: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                storage,
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(0),
            }),
        }
    }

    /// Load persisted settings, migrating older layouts
    ///
    /// Never fails: a missing blob yields defaults, a corrupt one yields
    /// defaults with a warning. Later mutations are written back.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let state = match Versioned::<Value>::load(storage.as_ref(), SETTINGS_KEY) {
            Ok(Some(envelope)) => match migrate(envelope.version, envelope.state) {
                Ok(mut settings) => {
                    if settings.sanitize() {
                        warn!("Persisted audio settings were out of range and have been clamped");
                    }
                    info!(version = envelope.version, "Loaded audio settings");
                    settings
                }
                Err(e) => {
                    warn!(error = %e, "Persisted audio settings unreadable, using defaults");
                    AudioSettings::default()
                }
            },
            Ok(None) => {
                debug!("No persisted audio settings, using defaults");
                AudioSettings::default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to read audio settings, using defaults");
                AudioSettings::default()
            }
        };
        Self::with_state(state, Some(storage))
    }

    fn state(&self) -> MutexGuard<'_, AudioSettings> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> AudioSettings {
        self.state().clone()
    }

    /// Read a single value without cloning the whole state
    pub fn read<R>(&self, f: impl FnOnce(&AudioSettings) -> R) -> R {
        f(&self.state())
    }

    /// Register a listener; it runs after every mutation
    pub fn subscribe(&self, listener: SettingsListener) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Remove a listener (unknown ids are ignored)
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }

    fn update(&self, change: SettingsChange, mutate: impl FnOnce(&mut AudioSettings)) {
        let snapshot = {
            let mut state = self.state();
            mutate(&mut state);
            state.clone()
        };
        debug!(?change, "Audio settings changed");
        self.persist(&snapshot);
        self.notify(change, &snapshot);
    }

    fn persist(&self, settings: &AudioSettings) {
        let Some(storage) = &self.inner.storage else {
            return;
        };
        let envelope = Versioned {
            version: SETTINGS_VERSION,
            state: settings,
        };
        if let Err(e) = envelope.save(storage.as_ref(), SETTINGS_KEY) {
            warn!(error = %e, "Failed to persist audio settings");
        }
    }

    fn notify(&self, change: SettingsChange, settings: &AudioSettings) {
        let listeners: Vec<SettingsListener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(change, settings);
        }
    }

    /// Turn the equalizer stage on or off
    pub fn set_equalizer_enabled(&self, enabled: bool) {
        self.update(SettingsChange::Equalizer, |s| s.equalizer_enabled = enabled);
    }

    /// Set one band (clamped to ±12 dB); marks the preset as "Custom"
    pub fn set_equalizer_gain(&self, band: FrequencyBand, gain_db: f32) {
        self.update(SettingsChange::Equalizer, |s| {
            s.equalizer_gains.insert(band, clamp_gain(gain_db));
            s.active_preset_name = CUSTOM_PRESET_NAME.to_string();
        });
    }

    /// Set every band from a preset and record its name
    pub fn apply_preset(&self, preset: &Preset) {
        self.update(SettingsChange::Equalizer, |s| {
            for band in FrequencyBand::ALL {
                s.equalizer_gains.insert(band, clamp_gain(preset.gain(band)));
            }
            s.active_preset_name = preset.name.to_string();
        });
    }

    /// Select the normalization curve
    pub fn set_normalization_mode(&self, mode: NormalizationMode) {
        self.update(SettingsChange::Normalization, |s| s.normalization_mode = mode);
    }

    /// Show or hide the spectrum visualizer (only toggles the analyser tap)
    pub fn set_wave_analyzer_enabled(&self, enabled: bool) {
        self.update(SettingsChange::WaveAnalyzer, |s| s.wave_analyzer_enabled = enabled);
    }

    /// Turn reverb on or off
    pub fn set_reverb_enabled(&self, enabled: bool) {
        self.update(SettingsChange::Reverb, |s| s.reverb_enabled = enabled);
    }

    /// Set the wet share (clamped to 0..=1)
    pub fn set_reverb_mix(&self, mix: f32) {
        let mix = if mix.is_finite() { mix.clamp(0.0, 1.0) } else { 0.0 };
        self.update(SettingsChange::Reverb, |s| s.reverb_mix = mix);
    }

    /// Select the reverb room; the graph loads its impulse asynchronously
    pub fn set_reverb_room_size(&self, size: RoomSize) {
        self.update(SettingsChange::ReverbRoom(size), |s| s.reverb_room_size = size);
    }

    /// Enable the display playback-rate multiplier
    pub fn set_playback_rate_enabled(&self, enabled: bool) {
        self.update(SettingsChange::PlaybackRate, |s| s.playback_rate_enabled = enabled);
    }

    /// Set the display playback-rate multiplier (clamped to 0.25..=4)
    pub fn set_playback_rate(&self, rate: f32) {
        let rate = clamp_rate(rate);
        self.update(SettingsChange::PlaybackRate, |s| s.playback_rate = rate);
    }

    /// Restore defaults; the wave analyzer is left enabled
    pub fn reset_audio_settings(&self) {
        self.update(SettingsChange::Reset, |s| {
            *s = AudioSettings {
                wave_analyzer_enabled: true,
                ..AudioSettings::default()
            };
        });
    }
}

/// Bring a persisted blob of any known version up to the current layout
fn migrate(version: u32, mut state: Value) -> serde_json::Result<AudioSettings> {
    if version > SETTINGS_VERSION {
        warn!(
            version,
            current = SETTINGS_VERSION,
            "Audio settings written by a newer version, reading what we can"
        );
    }

    if version < 2 {
        if let Some(gains) = state.get("equalizerGains").and_then(Value::as_array).cloned() {
            let map: serde_json::Map<String, Value> = FrequencyBand::ALL
                .iter()
                .zip(gains)
                .map(|(band, gain)| (band.to_string(), gain))
                .collect();
            state["equalizerGains"] = Value::Object(map);
        }
    }

    serde_json::from_value(state)
}
