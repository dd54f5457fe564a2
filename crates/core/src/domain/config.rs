//! Router configuration
//!
//! Read once at startup from `config.toml`. Every key is optional:
//!
//! ```toml
//! [filters]
//! input = "Virtual Audio Cable"
//! primary = "Headphones"
//! fallback = "Speakers"
//!
//! [audio]
//! block_frames = 1024
//! output_queue_blocks = 8
//!
//! [engine]
//! boost = false
//! device_poll_interval_ms = 500
//! fault_rebuild_limit = 5
//!
//! [ipc]
//! endpoint = "AutoAudioPipe"
//! ```
//!
//! Settings are never written back.

use crate::domain::selector::{
    FilterSet, DEFAULT_FALLBACK_FILTER, DEFAULT_INPUT_FILTER, DEFAULT_PRIMARY_FILTER,
};
use crate::domain::stream::DEFAULT_BLOCK_FRAMES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Name of the local control endpoint
pub const DEFAULT_ENDPOINT: &str = "AutoAudioPipe";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Initial device filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub input: String,
    pub primary: String,
    pub fallback: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            input: DEFAULT_INPUT_FILTER.to_string(),
            primary: DEFAULT_PRIMARY_FILTER.to_string(),
            fallback: DEFAULT_FALLBACK_FILTER.to_string(),
        }
    }
}

/// Pump sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Frames per pumped block
    pub block_frames: usize,

    /// Blocks the playback stream may hold before new ones are dropped
    pub output_queue_blocks: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            block_frames: DEFAULT_BLOCK_FRAMES,
            output_queue_blocks: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Start with the gain stage enabled
    pub boost: bool,

    /// How often the output device list is polled for changes
    pub device_poll_interval_ms: u64,

    /// Rebuilds tolerated per stream within a burst of faults
    pub fault_rebuild_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            boost: false,
            device_poll_interval_ms: 500,
            fault_rebuild_limit: 5,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.device_poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Pipe name on Windows, socket file stem elsewhere
    pub endpoint: String,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// Complete router configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub filters: FilterConfig,
    pub audio: AudioConfig,
    pub engine: EngineConfig,
    pub ipc: IpcConfig,
}

impl RouterConfig {
    /// Load configuration from a TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Load from `path`, falling back to defaults
    ///
    /// A missing file is expected. An unreadable or invalid one is logged and
    /// ignored, and the file is left as it is.
    #[instrument]
    pub async fn load_or_default(path: &Path) -> Self {
        if !fs::try_exists(path).await.unwrap_or(false) {
            info!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }

        match Self::load_from_file(path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load config, using defaults"
                );
                Self::default()
            }
        }
    }

    /// `<config dir>/autoaudio/config.toml`
    ///
    /// `~/.config/autoaudio` on Linux, `%APPDATA%\autoaudio` on Windows
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("autoaudio").join("config.toml"))
            .ok_or_else(|| {
                ConfigError::Invalid("Could not determine config directory".to_string())
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.block_frames == 0 {
            return Err(ConfigError::Invalid("audio.block_frames must be > 0".to_string()));
        }
        if self.audio.output_queue_blocks == 0 {
            return Err(ConfigError::Invalid(
                "audio.output_queue_blocks must be > 0".to_string(),
            ));
        }
        if self.engine.device_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.device_poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.ipc.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("ipc.endpoint must not be empty".to_string()));
        }
        Ok(())
    }

    /// Initial filters for the engine
    pub fn filter_set(&self) -> FilterSet {
        FilterSet::new(
            self.filters.input.clone(),
            self.filters.primary.clone(),
            self.filters.fallback.clone(),
        )
    }
}
