//! Construction of the library services from a loaded [`MoodifyConfig`]

use crate::config::MoodifyConfig;
use crate::error::Result;
use moodify_audio::{FileAssetCache, HttpFetcher, ImpulseLoader, SettingsStore};
use moodify_core::{FileStore, KeyValueStore, NoopPlayCounter, PlayCountRecorder};
use moodify_playback::{HttpPlayCounter, PlaybackManager};
use std::sync::Arc;
use tracing::info;

/// Key-value storage rooted at `storage.data_dir`
pub fn open_storage(config: &MoodifyConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store = FileStore::open(&config.storage.data_dir)?;
    Ok(Arc::new(store))
}

/// Settings store hydrated from disk
pub fn open_settings(config: &MoodifyConfig) -> Result<SettingsStore> {
    Ok(SettingsStore::load(open_storage(config)?))
}

/// HTTP impulse loader with an on-disk asset cache
pub fn impulse_loader(config: &MoodifyConfig) -> Result<ImpulseLoader> {
    let fetcher = HttpFetcher::new()?;
    let cache = FileAssetCache::new(&config.storage.asset_cache_dir);
    Ok(ImpulseLoader::new(
        config.impulse.clone(),
        Arc::new(fetcher),
        Arc::new(cache),
    ))
}

/// Playback manager hydrated from disk
///
/// Returns the HTTP counter too when one is configured so the caller can
/// flush outstanding requests before exiting.
pub fn open_playback(
    config: &MoodifyConfig,
) -> Result<(PlaybackManager, Option<Arc<HttpPlayCounter>>)> {
    let storage = open_storage(config)?;

    let (recorder, counter): (Arc<dyn PlayCountRecorder>, _) = match &config.play_count.endpoint {
        Some(endpoint) => {
            let counter = Arc::new(HttpPlayCounter::new(endpoint)?);
            info!(endpoint = %endpoint, "Recording plays");
            (counter.clone(), Some(counter))
        }
        None => (Arc::new(NoopPlayCounter), None),
    };

    Ok((PlaybackManager::load(storage, recorder), counter))
}
