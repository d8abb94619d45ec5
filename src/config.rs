use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::upload::retry::{Backoff, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub columns: ColumnConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Legacy web endpoint, used for data quality votes.
    #[serde(default = "default_web_url")]
    pub web_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_base_url() -> String {
    "https://api.inaturalist.org/v1".to_string()
}

fn default_web_url() -> String {
    "https://www.inaturalist.org".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("inat-pusher/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            web_url: default_web_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Input CSV column names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub sample_id: String,
    pub taxon_name: String,
    pub taxon_alt_name: String,
    pub date: String,
    /// Easting, or longitude for geographic input
    pub x: String,
    /// Northing, or latitude for geographic input
    pub y: String,
    pub upload: String,
    pub is_wild: String,
    pub collector_inat: String,
    pub collector_name: String,
    pub project_code: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            sample_id: "sample_id".to_string(),
            taxon_name: "taxon_name".to_string(),
            taxon_alt_name: "taxon_alt_name".to_string(),
            date: "date".to_string(),
            x: "longitude".to_string(),
            y: "latitude".to_string(),
            upload: "inat_upload".to_string(),
            is_wild: "is_wild".to_string(),
            collector_inat: "collector_inat".to_string(),
            collector_name: "collector_name".to_string(),
            project_code: "project_code".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Value of the `emi_source:` tag attached to every observation.
    #[serde(default = "default_source_tag")]
    pub source_tag: String,

    /// Spatial reference of the x/y columns.
    #[serde(default = "default_srs")]
    pub srs: String,

    /// Swap lat/lon when a geographic result looks reversed.
    /// Workaround for one upstream export; always logged.
    #[serde(default)]
    pub axis_swap_heuristic: bool,

    #[serde(default = "default_photo_extensions")]
    pub photo_extensions: Vec<String>,
}

fn default_source_tag() -> String {
    "JBC".to_string()
}

fn default_srs() -> String {
    "EPSG:4326".to_string()
}

fn default_photo_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            source_tag: default_source_tag(),
            srs: default_srs(),
            axis_swap_heuristic: false,
            photo_extensions: default_photo_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_create_attempts")]
    pub create_attempts: u32,

    #[serde(default = "default_create_backoff_secs")]
    pub create_backoff_secs: u64,

    #[serde(default = "default_photo_attempts")]
    pub photo_attempts: u32,

    /// Linear step: attempt n waits n * photo_backoff_secs.
    #[serde(default = "default_photo_backoff_secs")]
    pub photo_backoff_secs: u64,

    /// Delay between index searches after a failed create.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_poll_ceiling_secs")]
    pub poll_ceiling_secs: u64,
}

fn default_create_attempts() -> u32 {
    3
}

fn default_create_backoff_secs() -> u64 {
    5
}

fn default_photo_attempts() -> u32 {
    3
}

fn default_photo_backoff_secs() -> u64 {
    2
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_poll_ceiling_secs() -> u64 {
    30
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            create_attempts: default_create_attempts(),
            create_backoff_secs: default_create_backoff_secs(),
            photo_attempts: default_photo_attempts(),
            photo_backoff_secs: default_photo_backoff_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_ceiling_secs: default_poll_ceiling_secs(),
        }
    }
}

impl RetryConfig {
    pub fn create_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.create_attempts,
            Backoff::Fixed(Duration::from_secs(self.create_backoff_secs)),
        )
    }

    pub fn photo_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.photo_attempts,
            Backoff::Linear(Duration::from_secs(self.photo_backoff_secs)),
        )
    }

    /// Search immediately, then once per interval until the ceiling is spent.
    ///
    /// An interval of 0 turns polling off: a single immediate search, whatever
    /// the ceiling.
    pub fn poll_policy(&self) -> RetryPolicy {
        let ticks = match self.poll_interval_secs {
            0 => 0,
            interval => self.poll_ceiling_secs / interval,
        };
        RetryPolicy::new(
            u32::try_from(ticks).unwrap_or(u32::MAX).saturating_add(1),
            Backoff::Fixed(Duration::from_secs(self.poll_interval_secs)),
        )
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("inat-pusher")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
