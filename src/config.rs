//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::FetchConfig;
use crate::remote::{CatalogEntry, RestConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Known series bounds, used to clip fetches
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

/// Local cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_index_file")]
    pub index_file: String,

    /// Periodic index save; 0 disables it (shutdown still saves)
    #[serde(default)]
    pub save_interval_secs: u64,
}

fn default_data_dir() -> String {
    dirs::cache_dir()
        .map(|p| p.join("seriescache").to_string_lossy().to_string())
        .unwrap_or_else(|| "./seriescache_data".to_string())
}

fn default_index_file() -> String {
    "index.json".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index_file: default_index_file(),
            save_interval_secs: 0,
        }
    }
}

impl CacheConfig {
    /// `data_dir` with a leading `~/` expanded
    pub fn data_path(&self) -> PathBuf {
        match (self.data_dir.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.data_dir),
        }
    }

    /// Index file path (relative names live inside `data_dir`)
    pub fn index_path(&self) -> PathBuf {
        self.data_path().join(&self.index_file)
    }

    /// Directory holding payload blobs
    pub fn blob_dir(&self) -> PathBuf {
        self.data_path().join("blobs")
    }

    pub fn save_interval(&self) -> Option<Duration> {
        (self.save_interval_secs > 0).then(|| Duration::from_secs(self.save_interval_secs))
    }
}

/// Remote source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_remote_url() -> String {
    "http://amda.irap.omp.eu".to_string()
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_max_retries() -> u32 {
    3
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            request_timeout_ms: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl From<&RemoteConfig> for RestConfig {
    fn from(config: &RemoteConfig) -> Self {
        RestConfig {
            base_url: config.base_url.clone(),
            request_timeout_ms: config.request_timeout_ms,
            max_retries: config.max_retries,
        }
    }
}

/// Gap fetching configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

fn default_max_concurrent_fetches() -> usize {
    1
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

impl From<&FetchSettings> for FetchConfig {
    fn from(settings: &FetchSettings) -> Self {
        FetchConfig {
            max_concurrent_fetches: settings.max_concurrent_fetches.max(1),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("seriescache").join("config.toml")),
            Some(PathBuf::from("/etc/seriescache/config.toml")),
            Some(PathBuf::from("./seriescache.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `SERIESCACHE_*` overrides read through `var`
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(data_dir) = var("SERIESCACHE_DATA_DIR") {
            self.cache.data_dir = data_dir;
        }

        if let Some(url) = var("SERIESCACHE_REMOTE_URL") {
            self.remote.base_url = url;
        }

        if let Some(n) = var("SERIESCACHE_MAX_CONCURRENT_FETCHES") {
            match n.parse() {
                Ok(n) => self.fetch.max_concurrent_fetches = n,
                Err(_) => tracing::warn!("Ignoring SERIESCACHE_MAX_CONCURRENT_FETCHES={:?}", n),
            }
        }

        if let Some(level) = var("SERIESCACHE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("SERIESCACHE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# seriescache Configuration
#
# Environment variables override these settings:
# - SERIESCACHE_DATA_DIR
# - SERIESCACHE_REMOTE_URL
# - SERIESCACHE_MAX_CONCURRENT_FETCHES
# - SERIESCACHE_LOG_LEVEL
# - SERIESCACHE_LOG_FORMAT

[cache]
# Directory for the index and payload blobs
data_dir = "~/.cache/seriescache"

# Index file name, relative to data_dir
index_file = "index.json"

# Save the index every N seconds while it has changes (0 = only on shutdown)
save_interval_secs = 0

[remote]
# AMDA-style REST server
base_url = "http://amda.irap.omp.eu"

# Request timeout in milliseconds
request_timeout_ms = 30000

# Attempts per request (backoff 1s, 4s, 9s...)
max_retries = 3

[fetch]
# Gap fetches in flight per query (1 = sequential)
max_concurrent_fetches = 1

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Series bounds; fetches are clipped to them
# [[catalog]]
# id = "c1_b_gsm"
# start = "2001-01-01T00:00:00Z"
# stop = "2020-01-01T00:00:00Z"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_template_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.cache.index_file, "index.json");
        assert_eq!(config.remote.max_retries, 3);
        assert_eq!(config.fetch.max_concurrent_fetches, 1);
        assert!(config.cache.save_interval().is_none());
        assert!(config.catalog.is_empty());
    }

    #[test]
    fn test_load_with_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[cache]
data_dir = "/tmp/sc"
save_interval_secs = 60

[fetch]
max_concurrent_fetches = 4

[[catalog]]
id = "c1_b_gsm"
start = "2001-01-01T00:00:00Z"
stop = "2020-01-01T00:00:00Z"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache.index_path(), PathBuf::from("/tmp/sc/index.json"));
        assert_eq!(config.cache.blob_dir(), PathBuf::from("/tmp/sc/blobs"));
        assert_eq!(config.cache.save_interval(), Some(Duration::from_secs(60)));
        assert_eq!(FetchConfig::from(&config.fetch).max_concurrent_fetches, 4);
        assert_eq!(config.catalog.len(), 1);
        assert_eq!(config.remote.base_url, "http://amda.irap.omp.eu");
    }

    #[test]
    fn test_home_expansion() {
        let config = CacheConfig {
            data_dir: "~/.cache/seriescache".to_string(),
            ..CacheConfig::default()
        };
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.data_path(), home.join(".cache/seriescache"));
        }
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[cache\ndata_dir = 3").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SERIESCACHE_DATA_DIR", "/var/cache/sc"),
            ("SERIESCACHE_REMOTE_URL", "http://localhost:6543"),
            ("SERIESCACHE_MAX_CONCURRENT_FETCHES", "8"),
            ("SERIESCACHE_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.cache.data_dir, "/var/cache/sc");
        assert_eq!(config.remote.base_url, "http://localhost:6543");
        assert_eq!(config.fetch.max_concurrent_fetches, 8);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_bad_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| {
            (key == "SERIESCACHE_MAX_CONCURRENT_FETCHES").then(|| "lots".to_string())
        });
        assert_eq!(config.fetch.max_concurrent_fetches, 1);
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let settings = FetchSettings {
            max_concurrent_fetches: 0,
        };
        assert_eq!(FetchConfig::from(&settings).max_concurrent_fetches, 1);
    }
}
