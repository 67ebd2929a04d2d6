use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::CollectionId;
use crate::error::HarvestError;

pub const DEFAULT_CONFIG_FILE: &str = "commons-harvest.json";
pub const DEFAULT_API_URL: &str = "https://commons.wikimedia.org/w/api.php";
pub const DEFAULT_COLLECTION: &str = "Category:SVG_simplified_musical_symbols";
pub const DEFAULT_OUTPUT_DIR: &str = "assets/music_simplified_svg";
pub const DEFAULT_DELAY_SECS: u64 = 60;
pub const DEFAULT_MAX_RATE_LIMIT_ERRORS: u32 = 2;
/// MediaWiki refuses `cmlimit` above this for regular accounts.
pub const MAX_PAGE_SIZE: u32 = 500;
pub const DEFAULT_LISTING_LIMIT: usize = 500;
pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// On-disk shape of `commons-harvest.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub delay_secs: Option<u64>,
    #[serde(default)]
    pub max_rate_limit_errors: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub listing_limit: Option<usize>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Everything the fetcher needs, passed in at construction.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub api_url: String,
    pub collection: CollectionId,
    pub output_dir: Utf8PathBuf,
    pub delay: Duration,
    pub max_rate_limit_errors: u32,
    pub page_size: u32,
    pub listing_limit: usize,
    pub chunk_size: usize,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            collection: CollectionId::default(),
            output_dir: Utf8PathBuf::from(DEFAULT_OUTPUT_DIR),
            delay: Duration::from_secs(DEFAULT_DELAY_SECS),
            max_rate_limit_errors: DEFAULT_MAX_RATE_LIMIT_ERRORS,
            page_size: MAX_PAGE_SIZE,
            listing_limit: DEFAULT_LISTING_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: default_user_agent(),
        }
    }
}

impl FetcherConfig {
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(HarvestError::InvalidConfig(format!(
                "page_size must be within 1..={MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.chunk_size == 0 {
            return Err(HarvestError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.max_rate_limit_errors == 0 {
            return Err(HarvestError::InvalidConfig(
                "max_rate_limit_errors must be at least 1".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(HarvestError::InvalidConfig(
                "user_agent must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `commons-harvest.json` from the working directory when it exists.
    /// Falls back to built-in defaults when no file is involved.
    pub fn resolve(path: Option<&str>) -> Result<FetcherConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<FetcherConfig, HarvestError> {
        let defaults = FetcherConfig::default();

        let collection = match config.collection {
            Some(value) => value.parse()?,
            None => defaults.collection,
        };

        let resolved = FetcherConfig {
            api_url: config.api_url.unwrap_or(defaults.api_url),
            collection,
            output_dir: config
                .output_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.output_dir),
            delay: config
                .delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.delay),
            max_rate_limit_errors: config
                .max_rate_limit_errors
                .unwrap_or(defaults.max_rate_limit_errors),
            page_size: config.page_size.unwrap_or(defaults.page_size),
            listing_limit: config.listing_limit.unwrap_or(defaults.listing_limit),
            chunk_size: config.chunk_size.unwrap_or(defaults.chunk_size),
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            user_agent: config.user_agent.unwrap_or(defaults.user_agent),
        };
        resolved.validate()?;
        Ok(resolved)
    }
}

pub fn default_user_agent() -> String {
    format!(
        "commons-harvest/{} (batch file downloader; rust/reqwest)",
        env!("CARGO_PKG_VERSION")
    )
}
