//! Playback manager - queue, shuffle and repeat orchestration
//!
//! Owns the play/pause/queue state independent of the audio graph. It only
//! decides which track is current; an external audio element streams it.

use crate::{
    error::{PlaybackError, Result},
    events::PlaybackEvent,
    persistence::{PersistedPlayback, PLAYBACK_KEY, PLAYBACK_VERSION},
    shuffle::{fresh_history, history_starting_at, is_permutation},
    types::{PlaybackStatus, RepeatMode},
};
use moodify_core::{KeyValueStore, NoopPlayCounter, PlayCountRecorder, Track, Versioned};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Playback state machine
///
/// Invariants, held after every public call:
/// - `current_index < queue.len()` whenever the queue is non-empty
/// - with shuffle on and a non-empty queue, `shuffle_history` is a
///   permutation of the queue indices and `shuffle_pointer` indexes it
pub struct PlaybackManager {
    queue: Vec<Track>,
    current_index: usize,
    current_track: Option<Track>,
    is_playing: bool,
    repeat_mode: RepeatMode,
    is_shuffle: bool,
    shuffle_history: Vec<usize>,
    shuffle_pointer: usize,
    is_fullscreen: bool,

    events: Vec<PlaybackEvent>,
    rng: StdRng,
    recorder: Arc<dyn PlayCountRecorder>,
    storage: Option<Arc<dyn KeyValueStore>>,
}

impl std::fmt::Debug for PlaybackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackManager")
            .field("queue_len", &self.queue.len())
            .field("current_index", &self.current_index)
            .field("is_playing", &self.is_playing)
            .field("repeat_mode", &self.repeat_mode)
            .field("is_shuffle", &self.is_shuffle)
            .field("shuffle_pointer", &self.shuffle_pointer)
            .finish_non_exhaustive()
    }
}

impl Default for PlaybackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackManager {
    /// Create an idle manager with no persistence and no play recording
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            current_index: 0,
            current_track: None,
            is_playing: false,
            repeat_mode: RepeatMode::Off,
            is_shuffle: false,
            shuffle_history: Vec::new(),
            shuffle_pointer: 0,
            is_fullscreen: false,
            events: Vec::new(),
            rng: StdRng::from_entropy(),
            recorder: Arc::new(NoopPlayCounter),
            storage: None,
        }
    }

    /// Rehydrate from `storage`; later mutations are written back
    ///
    /// The live flags (`is_playing`, `is_fullscreen`) always come back off.
    /// A snapshot that breaks the invariants is repaired. A missing or
    /// unreadable blob yields an idle manager.
    pub fn load(storage: Arc<dyn KeyValueStore>, recorder: Arc<dyn PlayCountRecorder>) -> Self {
        let mut manager = Self::new().with_recorder(recorder);

        match Versioned::<PersistedPlayback>::load(storage.as_ref(), PLAYBACK_KEY) {
            Ok(Some(envelope)) => {
                if envelope.version > PLAYBACK_VERSION {
                    warn!(
                        version = envelope.version,
                        current = PLAYBACK_VERSION,
                        "Playback state written by a newer version, reading what we can"
                    );
                }
                manager.restore(envelope.state);
                if manager.repair() {
                    warn!("Persisted playback state was inconsistent and has been repaired");
                }
                info!(
                    queue_len = manager.queue.len(),
                    index = manager.current_index,
                    shuffle = manager.is_shuffle,
                    repeat = %manager.repeat_mode,
                    "Restored playback state"
                );
            }
            Ok(None) => debug!("No persisted playback state"),
            Err(e) => warn!(error = %e, "Persisted playback state unreadable, starting idle"),
        }

        manager.storage = Some(storage);
        manager
    }

    /// Use `recorder` for play counts
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn PlayCountRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Seed the shuffle RNG (deterministic orders in tests)
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn restore(&mut self, snapshot: PersistedPlayback) {
        self.queue = snapshot.queue;
        self.current_index = snapshot.current_index;
        self.current_track = snapshot.current_track;
        self.repeat_mode = snapshot.repeat_mode;
        self.is_shuffle = snapshot.is_shuffle;
        self.shuffle_history = snapshot.shuffle_history;
        self.shuffle_pointer = snapshot.shuffle_pointer;
        self.is_playing = false;
        self.is_fullscreen = false;
    }

    /// Bring fields back within the invariants; true if anything changed
    fn repair(&mut self) -> bool {
        let mut changed = false;

        if self.queue.is_empty() {
            changed |= self.current_index != 0 || !self.shuffle_history.is_empty();
            self.current_index = 0;
            self.shuffle_history.clear();
            self.shuffle_pointer = 0;
            return changed;
        }

        if self.current_index >= self.queue.len() {
            self.current_index = self.queue.len() - 1;
            changed = true;
        }

        if self.is_shuffle {
            if !is_permutation(&self.shuffle_history, self.queue.len()) {
                self.regenerate_history();
                changed = true;
            } else if self.shuffle_pointer >= self.shuffle_history.len() {
                self.shuffle_pointer = self.history_position(self.current_index);
                changed = true;
            }
        } else if !self.shuffle_history.is_empty() {
            self.shuffle_history.clear();
            self.shuffle_pointer = 0;
            changed = true;
        }

        changed
    }

    // ===== Queue =====

    /// Replace the queue, unless something is already playing
    ///
    /// The current index follows the current track into the new queue, or
    /// falls back to 0. A current track missing from the new queue is
    /// dropped.
    pub fn initialize_queue(&mut self, tracks: Vec<Track>) {
        if self.is_playing {
            debug!("Queue initialization ignored while playing");
            return;
        }

        self.queue = tracks;
        self.current_index = self
            .current_track
            .as_ref()
            .and_then(|current| self.position_of(&current.id))
            .unwrap_or(0);
        if self.current_track.is_some() && self.position_of_current().is_none() {
            self.current_track = None;
        }

        if self.is_shuffle {
            self.regenerate_history();
        } else {
            self.shuffle_history.clear();
            self.shuffle_pointer = 0;
        }

        debug!(len = self.queue.len(), index = self.current_index, "Queue initialized");
        self.emit(PlaybackEvent::QueueChanged {
            length: self.queue.len(),
        });
        self.persist();
    }

    /// Replace the queue and start playing `start_index` (clamped)
    ///
    /// An empty collection leaves the manager idle.
    pub fn play_collection(&mut self, tracks: Vec<Track>, start_index: usize) {
        if tracks.is_empty() {
            debug!("Empty collection, clearing queue");
            self.clear_queue();
            return;
        }

        let index = start_index.min(tracks.len() - 1);
        self.queue = tracks;
        self.current_index = index;
        if self.is_shuffle {
            self.regenerate_history();
        }

        self.emit(PlaybackEvent::QueueChanged {
            length: self.queue.len(),
        });
        self.land_on(index);
    }

    /// Append a track; under shuffle it is walked last
    pub fn add_to_queue(&mut self, track: Track) {
        self.queue.push(track);
        if self.is_shuffle {
            self.shuffle_history.push(self.queue.len() - 1);
        }
        self.emit(PlaybackEvent::QueueChanged {
            length: self.queue.len(),
        });
        self.persist();
    }

    /// Drop the queue and stop (back to idle)
    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.current_index = 0;
        self.current_track = None;
        self.shuffle_history.clear();
        self.shuffle_pointer = 0;
        self.set_playing_flag(false);
        self.emit(PlaybackEvent::QueueChanged { length: 0 });
        self.persist();
    }

    /// Jump to a queue index and play it
    pub fn skip_to_index(&mut self, index: usize) -> Result<()> {
        if self.queue.is_empty() {
            return Err(PlaybackError::QueueEmpty);
        }
        if index >= self.queue.len() {
            return Err(PlaybackError::IndexOutOfBounds(index));
        }
        if self.is_shuffle {
            self.shuffle_pointer = self.history_position(index);
        }
        self.land_on(index);
        Ok(())
    }

    // ===== Transport =====

    /// Play `track`, selecting it in the queue when present
    ///
    /// A track not in the queue keeps the current index; on an empty queue
    /// it becomes the whole queue.
    pub fn set_current_track(&mut self, track: Track) {
        if let Some(index) = self.position_of(&track.id) {
            if self.is_shuffle {
                self.shuffle_pointer = self.history_position(index);
            }
            self.land_on(index);
            return;
        }

        if self.queue.is_empty() {
            self.queue.push(track);
            self.current_index = 0;
            if self.is_shuffle {
                self.regenerate_history();
            }
            self.emit(PlaybackEvent::QueueChanged { length: 1 });
            self.land_on(0);
            return;
        }

        debug!(track_id = %track.id, "Track not in queue, keeping current index");
        self.recorder.record_play(&track.id);
        self.emit(PlaybackEvent::TrackChanged {
            track_id: track.id.clone(),
            index: self.current_index,
        });
        self.current_track = Some(track);
        self.set_playing_flag(true);
        self.persist();
    }

    /// Flip the playing flag; the queue is untouched
    pub fn toggle_play(&mut self) {
        self.set_playing_flag(!self.is_playing);
    }

    /// Set the playing flag explicitly
    pub fn set_playing(&mut self, playing: bool) {
        self.set_playing_flag(playing);
    }

    /// Advance to the next track
    ///
    /// At the end of the order: wraps with repeat All (a fresh permutation
    /// under shuffle), stops without advancing with repeat Off.
    pub fn play_next(&mut self) {
        if self.queue.is_empty() {
            debug!("Next requested on an empty queue");
            return;
        }
        self.escape_repeat_one();

        if self.is_shuffle {
            self.ensure_history();
            if self.shuffle_pointer + 1 < self.shuffle_history.len() {
                self.shuffle_pointer += 1;
            } else if self.repeat_mode == RepeatMode::All {
                self.shuffle_history = fresh_history(self.queue.len(), &mut self.rng);
                self.shuffle_pointer = 0;
                debug!("Shuffle order exhausted, new permutation generated");
            } else {
                debug!("End of shuffle order, stopping");
                self.set_playing_flag(false);
                return;
            }
            let index = self.shuffle_history[self.shuffle_pointer];
            self.land_on(index);
            return;
        }

        let next = if self.current_index + 1 < self.queue.len() {
            self.current_index + 1
        } else if self.repeat_mode == RepeatMode::All {
            0
        } else {
            debug!("End of queue, stopping");
            self.set_playing_flag(false);
            return;
        };
        self.land_on(next);
    }

    /// Go back one track
    ///
    /// At the start of the order: wraps to the end with repeat All, stays on
    /// the current track with repeat Off.
    pub fn play_previous(&mut self) {
        if self.queue.is_empty() {
            debug!("Previous requested on an empty queue");
            return;
        }
        self.escape_repeat_one();

        if self.is_shuffle {
            self.ensure_history();
            if self.shuffle_pointer > 0 {
                self.shuffle_pointer -= 1;
            } else if self.repeat_mode == RepeatMode::All {
                self.shuffle_pointer = self.shuffle_history.len() - 1;
            } else {
                debug!("Start of shuffle order, staying on current track");
                return;
            }
            let index = self.shuffle_history[self.shuffle_pointer];
            self.land_on(index);
            return;
        }

        let previous = if self.current_index > 0 {
            self.current_index - 1
        } else if self.repeat_mode == RepeatMode::All {
            self.queue.len() - 1
        } else {
            debug!("Start of queue, staying on current track");
            return;
        };
        self.land_on(previous);
    }

    // ===== Modes =====

    /// Turn shuffle on (fresh order starting at the current track) or off
    pub fn toggle_shuffle(&mut self) {
        self.is_shuffle = !self.is_shuffle;
        if self.is_shuffle {
            self.regenerate_history();
        } else {
            self.shuffle_history.clear();
            self.shuffle_pointer = 0;
        }
        debug!(enabled = self.is_shuffle, "Shuffle toggled");
        self.emit(PlaybackEvent::ShuffleChanged {
            enabled: self.is_shuffle,
        });
        self.persist();
    }

    /// Set the repeat mode
    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        if self.repeat_mode == mode {
            return;
        }
        self.repeat_mode = mode;
        self.emit(PlaybackEvent::RepeatChanged { mode });
        self.persist();
    }

    /// Advance Off -> All -> One -> Off
    pub fn cycle_repeat_mode(&mut self) {
        self.set_repeat_mode(self.repeat_mode.cycle());
    }

    /// Full-screen player flag (never persisted as on)
    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.is_fullscreen = fullscreen;
    }

    // ===== Accessors =====

    /// Derived playback status
    pub fn status(&self) -> PlaybackStatus {
        if self.queue.is_empty() && self.current_track.is_none() {
            PlaybackStatus::Idle
        } else if self.is_playing {
            PlaybackStatus::Playing
        } else if self.current_track.is_some() {
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::Loaded
        }
    }

    pub fn queue(&self) -> &[Track] {
        &self.queue
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn is_shuffle(&self) -> bool {
        self.is_shuffle
    }

    pub fn shuffle_history(&self) -> &[usize] {
        &self.shuffle_history
    }

    pub fn shuffle_pointer(&self) -> usize {
        self.shuffle_pointer
    }

    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    /// Take all pending events
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.events)
    }

    /// Snapshot of the persisted subset
    pub fn snapshot(&self) -> PersistedPlayback {
        PersistedPlayback {
            queue: self.queue.clone(),
            current_index: self.current_index,
            current_track: self.current_track.clone(),
            repeat_mode: self.repeat_mode,
            is_shuffle: self.is_shuffle,
            shuffle_history: self.shuffle_history.clone(),
            shuffle_pointer: self.shuffle_pointer,
            is_playing: self.is_playing,
            is_fullscreen: self.is_fullscreen,
        }
    }

    // ===== Internals =====

    /// Make `index` current and playing, record the play
    fn land_on(&mut self, index: usize) {
        let Some(track) = self.queue.get(index).cloned() else {
            warn!(index, len = self.queue.len(), "Refusing to land outside the queue");
            return;
        };

        self.current_index = index;
        self.recorder.record_play(&track.id);
        debug!(track_id = %track.id, index, "Current track changed");
        self.emit(PlaybackEvent::TrackChanged {
            track_id: track.id.clone(),
            index,
        });
        self.current_track = Some(track);
        self.set_playing_flag(true);
        self.persist();
    }

    fn set_playing_flag(&mut self, playing: bool) {
        if self.is_playing != playing {
            self.is_playing = playing;
            self.emit(PlaybackEvent::PlayStateChanged {
                is_playing: playing,
            });
        }
    }

    /// A manual skip escapes single-track repeat
    fn escape_repeat_one(&mut self) {
        if self.repeat_mode == RepeatMode::One {
            debug!("Manual skip, repeat one downgraded to all");
            self.set_repeat_mode(RepeatMode::All);
        }
    }

    fn regenerate_history(&mut self) {
        self.shuffle_history =
            history_starting_at(self.queue.len(), self.current_index, &mut self.rng);
        self.shuffle_pointer = 0;
    }

    fn ensure_history(&mut self) {
        if !is_permutation(&self.shuffle_history, self.queue.len())
            || self.shuffle_pointer >= self.shuffle_history.len()
        {
            warn!("Shuffle history inconsistent with queue, regenerating");
            self.regenerate_history();
        }
    }

    fn history_position(&self, index: usize) -> usize {
        self.shuffle_history
            .iter()
            .position(|&i| i == index)
            .unwrap_or(0)
    }

    fn position_of(&self, track_id: &str) -> Option<usize> {
        self.queue.iter().position(|t| t.id == track_id)
    }

    fn position_of_current(&self) -> Option<usize> {
        self.current_track
            .as_ref()
            .and_then(|current| self.position_of(&current.id))
    }

    fn emit(&mut self, event: PlaybackEvent) {
        self.events.push(event);
    }

    fn persist(&self) {
        let Some(storage) = &self.storage else {
            return;
        };
        let envelope = Versioned {
            version: PLAYBACK_VERSION,
            state: self.snapshot(),
        };
        if let Err(e) = envelope.save(storage.as_ref(), PLAYBACK_KEY) {
            warn!(error = %e, "Failed to persist playback state");
        }
    }
}
