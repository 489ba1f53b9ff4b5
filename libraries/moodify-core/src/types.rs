//! Domain types shared across the Moodify crates

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A playable track as seen by the audio core
///
/// Catalog data is owned by the backend; the core only needs enough to
/// identify, display and stream the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Unique track identifier from the catalog
    pub id: String,

    /// Track title
    pub title: String,

    /// Artist name
    pub artist: String,

    /// Album name (optional)
    #[serde(default)]
    pub album: Option<String>,

    /// Track duration
    #[serde(default)]
    pub duration: Duration,

    /// URL the audio element streams from
    #[serde(default)]
    pub stream_url: String,

    /// Artwork URL (optional)
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl Track {
    /// Create a track with only the identifying fields set
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration: Duration::ZERO,
            stream_url: String::new(),
            cover_url: None,
        }
    }

    /// Builder-style setter for the stream URL
    #[must_use]
    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = url.into();
        self
    }

    /// Builder-style setter for the duration
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}
