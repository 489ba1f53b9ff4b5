//! HTTP play-count recorder
//!
//! Fire-and-forget `POST {endpoint}/songs/{id}/play`. Each request runs on
//! its own tokio task; failures are logged and never reach the caller.

use crate::error::{PlaybackError, Result};
use moodify_core::PlayCountRecorder;
use reqwest::Client;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// Records plays against the backend API
#[derive(Debug)]
pub struct HttpPlayCounter {
    http: Client,
    endpoint: Url,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpPlayCounter {
    /// Recorder posting to `endpoint` (the API base URL)
    pub fn new(endpoint: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PlaybackError::InvalidEndpoint(e.to_string()))?;
        Self::with_client(http, endpoint)
    }

    /// Recorder over an existing client
    pub fn with_client(http: Client, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| PlaybackError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(PlaybackError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self {
            http,
            endpoint,
            pending: Mutex::new(Vec::new()),
        })
    }

    /// URL a play of `track_id` is posted to
    pub fn play_url(&self, track_id: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["songs", track_id, "play"]);
        }
        url
    }

    /// Wait for every request issued so far
    pub async fn flush(&self) {
        let pending = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in pending {
            if let Err(e) = task.await {
                warn!(error = %e, "Play-count task failed");
            }
        }
    }
}

impl PlayCountRecorder for HttpPlayCounter {
    fn record_play(&self, track_id: &str) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(track_id, "No async runtime, play not recorded");
            return;
        };

        let url = self.play_url(track_id);
        let http = self.http.clone();
        let track_id = track_id.to_string();
        let task = runtime.spawn(async move {
            match http.post(url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(track_id = %track_id, "Play recorded");
                }
                Ok(response) => {
                    warn!(track_id = %track_id, status = %response.status(), "Play count rejected");
                }
                Err(e) => warn!(track_id = %track_id, error = %e, "Failed to record play"),
            }
        });

        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.retain(|t| !t.is_finished());
        pending.push(task);
    }
}
