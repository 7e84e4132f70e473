//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! backend URL and API key, the restaurant being managed, and the tuning
//! knobs for the response cache and the request client.
//!
//! Configuration is stored at `~/.config/restodash/config.json`. The
//! `RESTODASH_URL`, `RESTODASH_API_KEY` and `RESTODASH_RESTAURANT_ID`
//! environment variables override the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "restodash";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_URL: &str = "RESTODASH_URL";
const ENV_API_KEY: &str = "RESTODASH_API_KEY";
const ENV_RESTAURANT_ID: &str = "RESTODASH_RESTAURANT_ID";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
    pub restaurant_id: Option<String>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Tuning for the two-tier response cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL stamped on entries when the caller does not pick one.
    pub default_ttl_ms: u64,
    pub max_memory_entries: usize,
    /// Values whose serialized data is larger than this stay in memory only.
    pub persist_threshold_bytes: usize,
    /// Byte quota of the persistent store.
    pub persist_quota_bytes: usize,
    /// Prefix marking persistent keys owned by the cache.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 5 * 60 * 1000,
            max_memory_entries: 100,
            persist_threshold_bytes: 100 * 1024,
            persist_quota_bytes: 5 * 1024 * 1024,
            key_prefix: format!("{}_cache_", APP_NAME),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

/// Tuning for the REST request client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline for a single network attempt.
    pub timeout_ms: u64,
    pub max_retries: u32,
    /// First backoff delay; doubles after every retry.
    pub backoff_base_ms: u64,
    pub cache_enabled: bool,
    /// Maximum age of a cached read the client will serve.
    pub cache_ttl_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8000,
            max_retries: 2,
            backoff_base_ms: 500,
            cache_enabled: true,
            cache_ttl_ms: 5 * 60 * 1000,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Overlay non-empty values produced by `lookup` onto the loaded config.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_URL) {
            self.backend_url = Some(url);
        }
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(id) = non_empty(ENV_RESTAURANT_ID) {
            self.restaurant_id = Some(id);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;

        let mut path = cache_dir.join(APP_NAME);
        if let Some(ref restaurant) = self.restaurant_id {
            path = path.join(restaurant);
        }
        Ok(path)
    }
}
