//! Impulse-response loading
//!
//! One static asset per room size. Loading goes persistent cache first,
//! network second, and the decoded buffers are memoized in [`IrCache`] for
//! the life of the process.

use crate::error::{AudioError, Result};
use crate::node::ImpulseResponse;
use crate::settings::RoomSize;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Impulse files above this size are rejected
const MAX_ASSET_BYTES: usize = 32 * 1024 * 1024;

fn default_small_url() -> String {
    "https://cdn.moodify.app/impulses/small.wav".to_string()
}

fn default_medium_url() -> String {
    "https://cdn.moodify.app/impulses/medium.wav".to_string()
}

fn default_large_url() -> String {
    "https://cdn.moodify.app/impulses/large.wav".to_string()
}

/// Where each room's impulse response lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpulseAssets {
    #[serde(default = "default_small_url")]
    pub small: String,
    #[serde(default = "default_medium_url")]
    pub medium: String,
    #[serde(default = "default_large_url")]
    pub large: String,
}

impl Default for ImpulseAssets {
    fn default() -> Self {
        Self {
            small: default_small_url(),
            medium: default_medium_url(),
            large: default_large_url(),
        }
    }
}

impl ImpulseAssets {
    /// Asset URL for a room; also the persistent cache key
    pub fn url_for(&self, size: RoomSize) -> &str {
        match size {
            RoomSize::Small => &self.small,
            RoomSize::Medium => &self.medium,
            RoomSize::Large => &self.large,
        }
    }
}

/// Fetches raw asset bytes
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download the asset at `url`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP(S) fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    max_bytes: usize,
}

impl HttpFetcher {
    /// Create a fetcher with default timeouts
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("Moodify/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http))
    }

    /// Wrap an existing client
    pub fn with_client(http: Client) -> Self {
        Self {
            http,
            max_bytes: MAX_ASSET_BYTES,
        }
    }

    /// Override the size limit
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url = %url, "Fetching asset");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AudioError::Fetch(format!("{url} returned {status}")));
        }

        let declared = response.content_length().unwrap_or(0);
        if declared > self.max_bytes as u64 {
            return Err(AudioError::Fetch(format!(
                "{url} declares {declared} bytes, limit is {}",
                self.max_bytes
            )));
        }

        let mut bytes = Vec::with_capacity((declared as usize).min(self.max_bytes));
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(AudioError::Fetch(format!(
                    "{url} exceeds {} bytes",
                    self.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(url = %url, bytes = bytes.len(), "Asset fetched");
        Ok(bytes)
    }
}

/// Persistent byte cache keyed by asset URL
#[async_trait]
pub trait AssetCache: Send + Sync {
    /// Cached bytes for `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes under `key`
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// In-memory asset cache
#[derive(Debug, Default)]
pub struct MemoryAssetCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAssetCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached assets
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AssetCache for MemoryAssetCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Directory-backed asset cache, one file per asset
#[derive(Debug, Clone)]
pub struct FileAssetCache {
    dir: PathBuf,
}

impl FileAssetCache {
    /// Use `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the asset for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .take(200)
            .collect();
        self.dir.join(format!("{name}.asset"))
    }
}

#[async_trait]
impl AssetCache for FileAssetCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AudioError::AssetCache(e.to_string())),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("part");
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AudioError::AssetCache(e.to_string()))?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| AudioError::AssetCache(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AudioError::AssetCache(e.to_string()))?;
        Ok(())
    }
}

/// Decode WAV bytes (integer or float PCM, mono or stereo)
///
/// Files with more than two channels keep their first two.
pub fn decode_impulse(bytes: &[u8]) -> Result<ImpulseResponse> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let source_channels = spec.channels as usize;
    if source_channels == 0 {
        return Err(AudioError::Decode("WAV declares zero channels".into()));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let channels = source_channels.min(2);
    let samples = if source_channels > 2 {
        samples
            .chunks_exact(source_channels)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect()
    } else {
        samples
    };

    ImpulseResponse::new(samples, spec.sample_rate, channels)
}

/// Loads and decodes impulse responses for each room size
#[derive(Clone)]
pub struct ImpulseLoader {
    assets: ImpulseAssets,
    fetcher: Arc<dyn AssetFetcher>,
    cache: Arc<dyn AssetCache>,
}

impl std::fmt::Debug for ImpulseLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImpulseLoader")
            .field("assets", &self.assets)
            .finish_non_exhaustive()
    }
}

impl ImpulseLoader {
    /// Loader over an explicit fetcher and cache
    pub fn new(
        assets: ImpulseAssets,
        fetcher: Arc<dyn AssetFetcher>,
        cache: Arc<dyn AssetCache>,
    ) -> Self {
        Self {
            assets,
            fetcher,
            cache,
        }
    }

    /// Asset URLs in use
    pub fn assets(&self) -> &ImpulseAssets {
        &self.assets
    }

    /// Fetch (or read from the persistent cache) and decode
    pub async fn load(&self, size: RoomSize) -> Result<Arc<ImpulseResponse>> {
        let url = self.assets.url_for(size);

        match self.cache.get(url).await {
            Ok(Some(bytes)) => match decode_impulse(&bytes) {
                Ok(ir) => {
                    debug!(room = %size, "Impulse response served from asset cache");
                    return Ok(Arc::new(ir));
                }
                Err(e) => {
                    warn!(room = %size, error = %e, "Cached impulse response is corrupt, refetching");
                }
            },
            Ok(None) => {}
            Err(e) => warn!(room = %size, error = %e, "Asset cache read failed"),
        }

        let bytes = self.fetcher.fetch(url).await?;
        let ir = decode_impulse(&bytes)?;
        if let Err(e) = self.cache.put(url, &bytes).await {
            warn!(room = %size, error = %e, "Failed to store impulse response in asset cache");
        }

        info!(
            room = %size,
            frames = ir.frames(),
            channels = ir.channels(),
            sample_rate = ir.sample_rate(),
            "Impulse response loaded"
        );
        Ok(Arc::new(ir))
    }
}

/// Process-lifetime memo of decoded impulses
///
/// Concurrent loads for the same room share a single fetch and decode.
/// A failed load leaves the slot empty so a later call can retry.
#[derive(Debug, Default)]
pub struct IrCache {
    slots: Mutex<HashMap<RoomSize, Arc<OnceCell<Arc<ImpulseResponse>>>>>,
}

impl IrCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, size: RoomSize) -> Arc<OnceCell<Arc<ImpulseResponse>>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(size).or_default())
    }

    /// Memoized impulse for a room
    pub fn get(&self, size: RoomSize) -> Option<Arc<ImpulseResponse>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&size)
            .and_then(|cell| cell.get().cloned())
    }

    /// Whether a room's impulse is memoized
    pub fn contains(&self, size: RoomSize) -> bool {
        self.get(size).is_some()
    }

    /// Return the memoized impulse or run `load` to produce it
    pub async fn get_or_load<F, Fut>(&self, size: RoomSize, load: F) -> Result<Arc<ImpulseResponse>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<ImpulseResponse>>>,
    {
        let cell = self.slot(size);
        cell.get_or_try_init(load).await.map(Arc::clone)
    }
}
