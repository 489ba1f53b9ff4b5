/// CLI configuration
use crate::error::{CliError, Result};
use moodify_audio::{ImpulseAssets, RoomSize};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "moodify.toml";
const ENV_PREFIX: &str = "MOODIFY";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MoodifyConfig {
    #[serde(default = "default_storage")]
    pub storage: StorageSettings,

    #[serde(default)]
    pub impulse: ImpulseAssets,

    #[serde(default)]
    pub play_count: PlayCountSettings,

    #[serde(default = "default_render")]
    pub render: RenderSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Persisted settings and playback blobs
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Downloaded impulse responses
    #[serde(default = "default_asset_cache_dir")]
    pub asset_cache_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlayCountSettings {
    /// API base URL; plays are not recorded when unset
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderSettings {
    /// Frames pulled through the graph per block
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// How long to wait for the impulse response before rendering dry
    #[serde(default = "default_settle_timeout_secs")]
    pub settle_timeout_secs: u64,
}

impl RenderSettings {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_secs)
    }
}

impl MoodifyConfig {
    /// Load from `moodify.toml` (or `path`) then `MOODIFY_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) if !path.exists() => {
                return Err(CliError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        // e.g. MOODIFY_RENDER__BLOCK_SIZE=2048
        settings = settings.add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for size in RoomSize::ALL {
            let url = self.impulse.url_for(size);
            Url::parse(url)
                .map_err(|e| CliError::Config(format!("impulse.{size} is not a URL ({url}): {e}")))?;
        }

        if let Some(endpoint) = &self.play_count.endpoint {
            Url::parse(endpoint)
                .map_err(|e| CliError::Config(format!("play_count.endpoint ({endpoint}): {e}")))?;
        }

        if self.render.block_size == 0 {
            return Err(CliError::Config(
                "render.block_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

// Default values
fn default_storage() -> StorageSettings {
    StorageSettings {
        data_dir: default_data_dir(),
        asset_cache_dir: default_asset_cache_dir(),
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_asset_cache_dir() -> PathBuf {
    PathBuf::from("./data/assets")
}

fn default_render() -> RenderSettings {
    RenderSettings {
        block_size: default_block_size(),
        settle_timeout_secs: default_settle_timeout_secs(),
    }
}

fn default_block_size() -> usize {
    1024
}

fn default_settle_timeout_secs() -> u64 {
    30
}

impl Default for MoodifyConfig {
    fn default() -> Self {
        Self {
            storage: default_storage(),
            impulse: ImpulseAssets::default(),
            play_count: PlayCountSettings::default(),
            render: default_render(),
        }
    }
}
