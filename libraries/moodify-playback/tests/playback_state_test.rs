//! End-to-end tests for the playback state machine
//!
//! Covers:
//! - Repeat-all wraparound and repeat-off termination
//! - The full "play an album through" scenario
//! - Rehydration safety and persistence of every mutation

use moodify_core::{KeyValueStore, MemoryStore, NoopPlayCounter, PlayCountRecorder, Track, Versioned};
use moodify_playback::{
    PersistedPlayback, PlaybackEvent, PlaybackManager, PlaybackStatus, RepeatMode, PLAYBACK_KEY,
    PLAYBACK_VERSION,
};
use std::sync::{Arc, Mutex};

// ============================================================================
// Test Infrastructure
// ============================================================================

fn track(id: &str) -> Track {
    Track::new(id, format!("Song {id}"), "Test Artist")
}

fn abc() -> Vec<Track> {
    vec![track("A"), track("B"), track("C")]
}

fn current_id(manager: &PlaybackManager) -> Option<String> {
    manager.current_track().map(|t| t.id.clone())
}

#[derive(Default)]
struct CountingRecorder {
    plays: Mutex<Vec<String>>,
}

impl PlayCountRecorder for CountingRecorder {
    fn record_play(&self, track_id: &str) {
        self.plays.lock().unwrap().push(track_id.to_string());
    }
}

fn store_snapshot(storage: &MemoryStore, snapshot: PersistedPlayback) {
    Versioned {
        version: PLAYBACK_VERSION,
        state: snapshot,
    }
    .save(storage, PLAYBACK_KEY)
    .unwrap();
}

// ============================================================================
// Repeat Modes
// ============================================================================

#[test]
fn test_repeat_all_wraps_to_start() {
    let mut manager = PlaybackManager::new();
    manager.set_repeat_mode(RepeatMode::All);
    manager.play_collection(abc(), 2);

    manager.play_next();

    assert_eq!(manager.current_index(), 0);
    assert_eq!(current_id(&manager).as_deref(), Some("A"));
    assert!(manager.is_playing());
}

#[test]
fn test_repeat_off_stops_at_end() {
    let mut manager = PlaybackManager::new();
    manager.play_collection(abc(), 2);

    manager.play_next();

    assert_eq!(manager.current_index(), 2);
    assert!(!manager.is_playing());
    assert_eq!(manager.status(), PlaybackStatus::Paused);
}

#[test]
fn test_repeat_all_under_shuffle_regenerates_order() {
    let mut manager = PlaybackManager::new().with_seed(11);
    manager.set_repeat_mode(RepeatMode::All);
    manager.play_collection(abc(), 0);
    manager.toggle_shuffle();

    for _ in 0..2 {
        manager.play_next();
    }
    assert_eq!(manager.shuffle_pointer(), 2);

    manager.play_next();
    assert_eq!(manager.shuffle_pointer(), 0);
    assert!(manager.is_playing());
    assert_eq!(
        manager.current_index(),
        manager.shuffle_history()[0],
        "restarted at the head of the new order"
    );
}

#[test]
fn test_cycle_repeat_mode_emits_events() {
    let mut manager = PlaybackManager::new();
    manager.cycle_repeat_mode();
    manager.cycle_repeat_mode();
    manager.cycle_repeat_mode();

    assert_eq!(manager.repeat_mode(), RepeatMode::Off);
    assert_eq!(
        manager.drain_events(),
        vec![
            PlaybackEvent::RepeatChanged { mode: RepeatMode::All },
            PlaybackEvent::RepeatChanged { mode: RepeatMode::One },
            PlaybackEvent::RepeatChanged { mode: RepeatMode::Off },
        ]
    );
}

// ============================================================================
// Scenario
// ============================================================================

#[test]
fn test_album_plays_through_and_stops() {
    let recorder = Arc::new(CountingRecorder::default());
    let mut manager = PlaybackManager::new().with_recorder(recorder.clone());

    manager.play_collection(abc(), 0);
    assert_eq!(current_id(&manager).as_deref(), Some("A"));

    manager.play_next();
    assert_eq!(current_id(&manager).as_deref(), Some("B"));

    manager.play_next();
    assert_eq!(current_id(&manager).as_deref(), Some("C"));

    manager.play_next();
    assert!(!manager.is_playing());
    assert_eq!(current_id(&manager).as_deref(), Some("C"));

    assert_eq!(*recorder.plays.lock().unwrap(), vec!["A", "B", "C"]);
}

#[test]
fn test_new_collection_while_shuffled_gets_fresh_order() {
    let mut manager = PlaybackManager::new().with_seed(5);
    manager.toggle_shuffle();
    manager.play_collection(abc(), 1);

    assert_eq!(manager.shuffle_history()[0], 1);
    assert_eq!(manager.shuffle_pointer(), 0);

    let five: Vec<Track> = ["v", "w", "x", "y", "z"].iter().map(|id| track(id)).collect();
    manager.play_collection(five, 3);
    assert_eq!(manager.shuffle_history().len(), 5);
    assert_eq!(manager.shuffle_history()[0], 3);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_rehydration_never_resumes_playback() {
    let storage = Arc::new(MemoryStore::new());
    store_snapshot(
        &storage,
        PersistedPlayback {
            queue: abc(),
            current_index: 1,
            current_track: Some(track("B")),
            repeat_mode: RepeatMode::All,
            is_shuffle: true,
            shuffle_history: vec![1, 2, 0],
            shuffle_pointer: 0,
            is_playing: true,
            is_fullscreen: true,
        },
    );

    let manager = PlaybackManager::load(storage, Arc::new(NoopPlayCounter));

    assert!(!manager.is_playing());
    assert!(!manager.is_fullscreen());
    assert_eq!(manager.queue(), abc().as_slice());
    assert_eq!(manager.current_index(), 1);
    assert_eq!(manager.repeat_mode(), RepeatMode::All);
    assert!(manager.is_shuffle());
    assert_eq!(manager.shuffle_history(), &[1, 2, 0]);
    assert_eq!(manager.status(), PlaybackStatus::Paused);
}

#[test]
fn test_every_mutation_is_persisted() {
    let storage = Arc::new(MemoryStore::new());

    {
        let mut manager = PlaybackManager::load(storage.clone(), Arc::new(NoopPlayCounter));
        manager.play_collection(abc(), 0);
        manager.play_next();
        manager.set_repeat_mode(RepeatMode::One);
        manager.set_fullscreen(true);
        manager.toggle_shuffle();
    }

    let restored = PlaybackManager::load(storage.clone(), Arc::new(NoopPlayCounter));
    assert_eq!(restored.current_index(), 1);
    assert_eq!(current_id(&restored).as_deref(), Some("B"));
    assert_eq!(restored.repeat_mode(), RepeatMode::One);
    assert!(restored.is_shuffle());
    assert_eq!(restored.shuffle_history()[0], 1);

    let raw = storage.get(PLAYBACK_KEY).unwrap().unwrap();
    assert!(raw.contains(r#""version":1"#));
}

#[test]
fn test_restored_shuffle_walks_persisted_order() {
    let storage = Arc::new(MemoryStore::new());
    store_snapshot(
        &storage,
        PersistedPlayback {
            queue: abc(),
            current_index: 2,
            current_track: Some(track("C")),
            is_shuffle: true,
            shuffle_history: vec![2, 0, 1],
            ..PersistedPlayback::default()
        },
    );

    let mut manager = PlaybackManager::load(storage, Arc::new(NoopPlayCounter));
    manager.play_next();
    assert_eq!(current_id(&manager).as_deref(), Some("A"));
    manager.play_next();
    assert_eq!(current_id(&manager).as_deref(), Some("B"));
}

#[test]
fn test_inconsistent_snapshot_is_repaired() {
    let storage = Arc::new(MemoryStore::new());
    store_snapshot(
        &storage,
        PersistedPlayback {
            queue: abc(),
            current_index: 1,
            is_shuffle: true,
            shuffle_history: vec![0, 1, 2],
            shuffle_pointer: 40,
            ..PersistedPlayback::default()
        },
    );

    let manager = PlaybackManager::load(storage, Arc::new(NoopPlayCounter));
    assert_eq!(manager.shuffle_history(), &[0, 1, 2]);
    assert_eq!(manager.shuffle_pointer(), 1);
}

#[test]
fn test_missing_blob_starts_idle() {
    let manager = PlaybackManager::load(Arc::new(MemoryStore::new()), Arc::new(NoopPlayCounter));
    assert_eq!(manager.status(), PlaybackStatus::Idle);
    assert_eq!(manager.repeat_mode(), RepeatMode::Off);
}
