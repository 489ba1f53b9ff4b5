//! Error types for playback management

use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Queue is empty
    #[error("Queue is empty")]
    QueueEmpty,

    /// Index out of bounds
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// Play-count endpoint is not a usable base URL
    #[error("Invalid play-count endpoint: {0}")]
    InvalidEndpoint(String),

    /// Storage or serialization failure
    #[error(transparent)]
    Core(#[from] moodify_core::MoodifyError),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
