//! Moodify - Playback State Machine
//!
//! Decides which track plays next under shuffle and repeat, and keeps that
//! state across sessions. Track audio itself is streamed elsewhere; this
//! crate only publishes "the current track".
//!
//! This crate provides:
//! - Queue management (collections, single tracks, appends)
//! - Replayable shuffle: a fixed permutation walked back and forth
//! - Repeat modes (Off, All, One)
//! - Persistence with live flags reset on reload
//! - Play-count recording (fire-and-forget HTTP)
//!
//! # Example
//!
//! ```rust
//! use moodify_core::Track;
//! use moodify_playback::{PlaybackManager, RepeatMode};
//!
//! let mut manager = PlaybackManager::new().with_seed(1);
//! manager.set_repeat_mode(RepeatMode::All);
//! manager.play_collection(
//!     vec![
//!         Track::new("a", "First", "Artist"),
//!         Track::new("b", "Second", "Artist"),
//!     ],
//!     1,
//! );
//!
//! manager.play_next();
//! assert_eq!(manager.current_track().map(|t| t.id.as_str()), Some("a"));
//! assert!(manager.is_playing());
//! ```

mod error;
mod events;
mod manager;
mod persistence;
mod play_count;
pub mod shuffle;
pub mod types;

pub use error::{PlaybackError, Result};
pub use events::PlaybackEvent;
pub use manager::PlaybackManager;
pub use persistence::{PersistedPlayback, PLAYBACK_KEY, PLAYBACK_VERSION};
pub use play_count::HttpPlayCounter;
pub use types::{PlaybackStatus, RepeatMode};
