//! Moodify Core
//!
//! Platform-agnostic building blocks shared by the Moodify audio crates.
//!
//! This crate provides:
//! - **Domain Types**: [`Track`]
//! - **Persistence**: the [`KeyValueStore`] blob store and its implementations
//! - **Side Channels**: [`PlayCountRecorder`] for fire-and-forget play reporting
//! - **Error Handling**: unified [`MoodifyError`] and [`Result`] types
//!
//! # Example
//!
//! ```rust
//! use moodify_core::{KeyValueStore, MemoryStore, Track};
//!
//! let store = MemoryStore::new();
//! store.set("greeting", "hello").unwrap();
//! assert_eq!(store.get("greeting").unwrap().as_deref(), Some("hello"));
//!
//! let track = Track::new("t1", "Intro", "Some Artist");
//! assert_eq!(track.id, "t1");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod storage;
pub mod traits;
pub mod types;

pub use error::{MoodifyError, Result};
pub use storage::{FileStore, KeyValueStore, MemoryStore, Versioned};
pub use traits::{NoopPlayCounter, PlayCountRecorder};
pub use types::Track;
