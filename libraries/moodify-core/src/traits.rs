/// Core traits for Moodify

/// Play-count side channel
///
/// Invoked every time playback lands on a new current track. Implementations
/// must not block the caller and must swallow their own failures: the
/// playback state machine never learns whether the play was recorded.
pub trait PlayCountRecorder: Send + Sync {
    /// Record one play of the given track
    fn record_play(&self, track_id: &str);
}

/// Recorder that drops every play (default when no backend is configured)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlayCounter;

impl PlayCountRecorder for NoopPlayCounter {
    fn record_play(&self, track_id: &str) {
        tracing::trace!(track_id, "play count recording disabled");
    }
}
