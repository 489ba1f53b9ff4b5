/// Audio-specific errors
use crate::context::NodeId;
use thiserror::Error;

/// Result type alias using `AudioError`
pub type Result<T> = std::result::Result<T, AudioError>;

/// Audio error types
#[derive(Error, Debug)]
pub enum AudioError {
    /// Node id does not exist in the context (never created or removed)
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// Node exists but is of a different kind than requested
    #[error("Node {id} is a {actual}, expected {expected}")]
    WrongNodeKind {
        /// Offending node
        id: NodeId,
        /// Kind the caller asked for
        expected: &'static str,
        /// Kind actually stored
        actual: &'static str,
    },

    /// A node cannot feed itself
    #[error("Cannot connect node {0} to itself")]
    SelfConnection(NodeId),

    /// The connection would close a feedback loop
    #[error("Connecting {from} -> {to} would create a cycle")]
    WouldCycle {
        /// Upstream node
        from: NodeId,
        /// Downstream node
        to: NodeId,
    },

    /// `disconnect_from` on an edge that does not exist
    #[error("Node {from} is not connected to {to}")]
    NotConnected {
        /// Upstream node
        from: NodeId,
        /// Downstream node
        to: NodeId,
    },

    /// Invalid audio buffer
    #[error("Invalid audio buffer: {0}")]
    InvalidBuffer(String),

    /// Impulse-response decoding error
    #[error("Decode error: {0}")]
    Decode(String),

    /// Network fetch of an asset failed
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Persistent asset cache failed
    #[error("Asset cache error: {0}")]
    AssetCache(String),

    /// Core (storage) error
    #[error(transparent)]
    Core(#[from] moodify_core::MoodifyError),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for AudioError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch(err.to_string())
    }
}
