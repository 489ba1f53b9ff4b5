//! Persisted playback snapshot

use crate::types::RepeatMode;
use moodify_core::Track;
use serde::{Deserialize, Serialize};

/// Storage key of the playback blob
pub const PLAYBACK_KEY: &str = "playback-state";

/// Current layout version of the playback blob
pub const PLAYBACK_VERSION: u32 = 1;

/// What survives a reload
///
/// The live flags are written as-is and forced off again on rehydration,
/// so a reload never resumes audible playback.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedPlayback {
    pub queue: Vec<Track>,
    pub current_index: usize,
    pub current_track: Option<Track>,
    pub repeat_mode: RepeatMode,
    pub is_shuffle: bool,
    pub shuffle_history: Vec<usize>,
    pub shuffle_pointer: usize,
    pub is_playing: bool,
    pub is_fullscreen: bool,
}
