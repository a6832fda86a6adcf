use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// How long an aggregation result is served before it is recomputed, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Raw items taken from a single feed before normalization
    #[serde(default = "default_feed_item_limit")]
    pub feed_item_limit: usize,
    /// Stories kept after dedup and sort
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Warm the cache in the background right after startup
    #[serde(default = "default_prefetch_on_startup")]
    pub prefetch_on_startup: bool,
    pub sources: Vec<SourceConfig>,
}

fn default_cache_ttl_secs() -> u64 {
    180
}

fn default_feed_item_limit() -> usize {
    30
}

fn default_result_limit() -> usize {
    90
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_prefetch_on_startup() -> bool {
    true
}

/// A named origin with a fetch endpoint.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
