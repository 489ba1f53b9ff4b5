//! Integration tests for the audio settings store
//!
//! Tests cover:
//! - Preset application and the "Custom" transition
//! - Range clamping on write and on load
//! - Persistence through a directory-backed store
//! - Change notifications

use moodify_audio::{
    AudioSettings, FrequencyBand, NormalizationMode, Preset, RoomSize, SettingsChange,
    SettingsStore,
};
use moodify_core::{FileStore, KeyValueStore, MemoryStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn recorded(store: &SettingsStore) -> Arc<Mutex<Vec<SettingsChange>>> {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    store.subscribe(Arc::new(move |change, _| sink.lock().unwrap().push(change)));
    changes
}

// ============================================================================
// PRESETS
// ============================================================================

#[test]
fn test_every_preset_applies_exactly() {
    let store = SettingsStore::new();

    for preset in moodify_audio::settings::PRESETS {
        store.apply_preset(preset);
        let settings = store.snapshot();
        assert_eq!(settings.active_preset_name, preset.name);
        for band in FrequencyBand::ALL {
            assert_eq!(settings.gain(band), preset.gain(band), "{} {band}", preset.name);
        }
    }
}

#[test]
fn test_manual_edit_after_preset_becomes_custom() {
    let store = SettingsStore::new();
    store.apply_preset(Preset::find("Jazz").unwrap());
    store.set_equalizer_gain(FrequencyBand::Hz3000, 1.5);

    let settings = store.snapshot();
    assert_eq!(settings.active_preset_name, "Custom");
    assert_eq!(settings.gain(FrequencyBand::Hz3000), 1.5);
    // Other bands keep the preset values
    let jazz = Preset::find("Jazz").unwrap();
    assert_eq!(settings.gain(FrequencyBand::Hz60), jazz.gain(FrequencyBand::Hz60));
}

#[test]
fn test_preset_lookup_is_case_insensitive() {
    assert_eq!(Preset::find("bass boost").unwrap().name, "Bass Boost");
    assert!(Preset::find("Polka").is_none());
}

// ============================================================================
// CLAMPING
// ============================================================================

#[test]
fn test_writes_are_clamped() {
    let store = SettingsStore::new();
    store.set_equalizer_gain(FrequencyBand::Hz310, 40.0);
    store.set_equalizer_gain(FrequencyBand::Hz1000, -40.0);
    store.set_reverb_mix(3.0);
    store.set_playback_rate(10.0);

    let settings = store.snapshot();
    assert_eq!(settings.gain(FrequencyBand::Hz310), 12.0);
    assert_eq!(settings.gain(FrequencyBand::Hz1000), -12.0);
    assert_eq!(settings.reverb_mix, 1.0);
    assert_eq!(settings.playback_rate, 4.0);

    store.set_playback_rate(0.0);
    store.set_reverb_mix(-1.0);
    let settings = store.snapshot();
    assert_eq!(settings.playback_rate, 0.25);
    assert_eq!(settings.reverb_mix, 0.0);
}

#[test]
fn test_playback_rate_only_scales_when_enabled() {
    let store = SettingsStore::new();
    store.set_playback_rate(2.0);
    let elapsed = Duration::from_secs(10);

    assert_eq!(store.snapshot().scaled_position(elapsed), elapsed);
    store.set_playback_rate_enabled(true);
    assert_eq!(
        store.snapshot().scaled_position(elapsed),
        Duration::from_secs(20)
    );
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[test]
fn test_settings_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let storage = Arc::new(FileStore::open(dir.path()).unwrap());
        let store = SettingsStore::load(storage);
        store.apply_preset(Preset::find("Electronic").unwrap());
        store.set_normalization_mode(NormalizationMode::Loud);
        store.set_reverb_enabled(true);
        store.set_reverb_room_size(RoomSize::Large);
        store.set_wave_analyzer_enabled(false);
    }

    let storage = Arc::new(FileStore::open(dir.path()).unwrap());
    let settings = SettingsStore::load(storage).snapshot();
    assert_eq!(settings.active_preset_name, "Electronic");
    assert_eq!(settings.normalization_mode, NormalizationMode::Loud);
    assert!(settings.reverb_enabled);
    assert_eq!(settings.reverb_room_size, RoomSize::Large);
    assert!(!settings.wave_analyzer_enabled);
}

#[test]
fn test_reset_is_persisted() {
    let storage = Arc::new(MemoryStore::new());
    let store = SettingsStore::load(storage.clone());
    store.set_wave_analyzer_enabled(false);
    store.set_reverb_enabled(true);
    store.reset_audio_settings();

    let reloaded = SettingsStore::load(storage).snapshot();
    assert_eq!(reloaded, AudioSettings::default());
    assert!(reloaded.wave_analyzer_enabled);
}

#[test]
fn test_out_of_range_blob_is_clamped_on_load() {
    let storage = Arc::new(MemoryStore::new());
    storage
        .set(
            "audio-settings",
            r#"{"version":2,"state":{"equalizerGains":{"60":99.0},"reverbMix":7.5,"playbackRate":0.01}}"#,
        )
        .unwrap();

    let settings = SettingsStore::load(storage).snapshot();
    assert_eq!(settings.gain(FrequencyBand::Hz60), 12.0);
    assert_eq!(settings.gain(FrequencyBand::Hz12000), 0.0);
    assert_eq!(settings.reverb_mix, 1.0);
    assert_eq!(settings.playback_rate, 0.25);
}

#[test]
fn test_garbage_blob_falls_back_to_defaults() {
    let storage = Arc::new(MemoryStore::new());
    storage.set("audio-settings", "not json at all").unwrap();

    let store = SettingsStore::load(storage.clone());
    assert_eq!(store.snapshot(), AudioSettings::default());

    // The next write replaces the corrupt blob
    store.set_reverb_enabled(true);
    assert!(SettingsStore::load(storage).snapshot().reverb_enabled);
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

#[test]
fn test_reset_notifies_with_defaults() {
    let store = SettingsStore::new();
    store.set_reverb_enabled(true);
    let changes = recorded(&store);
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    store.subscribe(Arc::new(move |_, settings| {
        *sink.lock().unwrap() = Some(settings.clone());
    }));

    store.reset_audio_settings();

    assert_eq!(*changes.lock().unwrap(), vec![SettingsChange::Reset]);
    assert_eq!(seen.lock().unwrap().clone(), Some(AudioSettings::default()));
}

#[test]
fn test_listener_sees_post_mutation_state() {
    let store = SettingsStore::new();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    store.subscribe(Arc::new(move |_, settings| {
        *sink.lock().unwrap() = Some(settings.reverb_room_size);
    }));

    store.set_reverb_room_size(RoomSize::Large);
    assert_eq!(*seen.lock().unwrap(), Some(RoomSize::Large));
}
