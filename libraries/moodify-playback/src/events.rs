//! Playback Events
//!
//! Emitted by [`PlaybackManager`](crate::PlaybackManager) on every state
//! change so the UI layer can sync without polling. Drain them with
//! `drain_events`.

use crate::types::RepeatMode;
use serde::{Deserialize, Serialize};

/// Events emitted by the playback state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    /// Playback landed on a track
    TrackChanged {
        /// ID of the new current track
        track_id: String,
        /// Queue index of the new current track
        index: usize,
    },

    /// Playing flag flipped
    PlayStateChanged {
        /// New value of the playing flag
        is_playing: bool,
    },

    /// Queue replaced, extended or cleared
    QueueChanged {
        /// New queue length
        length: usize,
    },

    /// Shuffle toggled
    ShuffleChanged {
        /// Whether shuffle is now on
        enabled: bool,
    },

    /// Repeat mode changed (including the automatic One -> All downgrade)
    RepeatChanged {
        /// New repeat mode
        mode: RepeatMode,
    },
}
