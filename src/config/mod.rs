//! Configuration for harvests and streams.
//!
//! Read from `~/.config/weir/config.toml` unless a path is given. If the
//! default file doesn't exist, one with comments is created. Missing keys
//! fall back to their defaults.

pub mod duration;

pub use duration::{format_duration, parse_duration};

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::domain::Seed;
use crate::harvest::DepthStrategy;
use crate::store::StateBackend;
use crate::stream::StreamConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name recorded in every capture file and used in file names.
    pub collection: String,
    /// Root for capture files, aliases and state. Defaults to the
    /// platform data directory.
    pub data_path: Option<PathBuf>,
    pub dry_run: bool,
    /// Pause between fetched items, in milliseconds.
    pub wait_ms: u64,
    /// Item kinds never fetched.
    pub exclude: Vec<String>,
    pub strategy: DepthStrategy,
    pub state: StateConfig,
    pub seeds: Vec<Seed>,
    pub streams: HashMap<String, StreamSettings>,
    pub services: HashMap<String, ServiceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection: "weir".to_string(),
            data_path: None,
            dry_run: false,
            wait_ms: 0,
            exclude: Vec::new(),
            strategy: DepthStrategy::default(),
            state: StateConfig::default(),
            seeds: Vec::new(),
            streams: HashMap::new(),
            services: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub backend: StateBackend,
    /// Read the previous snapshot at start.
    pub load: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::Json,
            load: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub url: String,
    pub seed: bool,
    pub rotate_every: String,
    pub units_per_record: usize,
    pub service: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            seed: false,
            rotate_every: "15m".to_string(),
            units_per_record: 100,
            service: "twitter".to_string(),
        }
    }
}

/// Endpoint and credentials for one upstream API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub api_root: String,
    pub bearer_token: Option<String>,
    pub api_key: Option<String>,
    pub user_agent: Option<String>,
}

impl ServiceConfig {
    /// Defaults for the services weir knows about.
    pub fn builtin(name: &str) -> Option<Self> {
        let api_root = match name {
            "twitter" => "https://api.twitter.com/1.1",
            "tumblr" => "https://api.tumblr.com/v2",
            _ => return None,
        };
        Some(Self {
            api_root: api_root.to_string(),
            ..Self::default()
        })
    }
}

impl Config {
    /// Loads `path`, or the default file when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None => {
                let config_path = Self::default_config_path()?;
                if !config_path.exists() {
                    Self::create_default_config(&config_path)?;
                    return Ok(Self::default());
                }
                Self::from_path(&config_path)
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// `~/.config/weir/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("weir").join("config.toml"))
    }

    pub fn data_path(&self) -> Result<PathBuf, ConfigError> {
        match self.data_path {
            Some(ref path) => Ok(path.clone()),
            None => {
                let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
                Ok(data_dir.join("weir"))
            }
        }
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Settings for a named service, falling back to its built-in defaults.
    pub fn service(&self, name: &str) -> Option<ServiceConfig> {
        self.services
            .get(name)
            .cloned()
            .or_else(|| ServiceConfig::builtin(name))
    }

    /// Session settings for the `[streams.<name>]` table.
    pub fn stream_config(&self, name: &str) -> Result<StreamConfig, ConfigError> {
        let settings = self
            .streams
            .get(name)
            .ok_or_else(|| ConfigError::Invalid(format!("no [streams.{}] section", name)))?;
        if settings.url.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("streams.{}.url is empty", name)));
        }
        let rotate_every = parse_duration(&settings.rotate_every)
            .map_err(|e| ConfigError::Invalid(format!("streams.{}.rotate_every: {}", name, e)))?;

        Ok(StreamConfig {
            collection: self.collection.clone(),
            stream_name: name.to_string(),
            data_path: self.data_path()?,
            url: settings.url.clone(),
            rotate_every,
            units_per_record: settings.units_per_record,
            seed: settings.seed,
        })
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> String {
        r##"# weir configuration
#
# Durations are written as "30s", "15m", "1h", "1d" or plain seconds.
# Resource types for the strategy: any, web_page, web_page_part, image,
# stylesheet, script, video, document, feed.

# Name stored in every capture file
collection = "weir"

# Where captures, stream aliases and state live (default: platform data dir)
# data_path = "/var/lib/weir"

# Pause between fetched items, in milliseconds
wait_ms = 1000

# Item kinds that are never fetched
# exclude = ["video", "pdf"]

[strategy]
# Seeds are always fetched. Items they link to are depth 2, and so on.
depth2_admit = []
depth3_admit = ["image"]
page_parts_beyond_depth2 = false

[state]
# "json" (state.json) or "sqlite" (state.db) under data_path
backend = "json"
load = true

# [[seeds]]
# type = "user_timeline"
# screen_name = "example"
# incremental = true
#
# [[seeds]]
# type = "blog"
# blog_name = "example.tumblr.com"
# max_posts = 200
#
# [[seeds]]
# type = "stream_replay"
# name = "garden"
#
# [[seeds]]
# type = "resource"
# url = "https://example.com/"
# kind = "html"

# [streams.garden]
# url = "https://stream.twitter.com/1.1/statuses/filter.json?track=gardening"
# seed = true
# rotate_every = "15m"
# units_per_record = 100
# service = "twitter"

# [services.twitter]
# api_root = "https://api.twitter.com/1.1"
# bearer_token = "..."
#
# [services.tumblr]
# api_root = "https://api.tumblr.com/v2"
# api_key = "..."
"##
        .to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
