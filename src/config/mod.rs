use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

/// Prefix for environment variable overrides, e.g. `FAVICON_CACHE__BACKEND=memcached`
pub const ENV_PREFIX: &str = "FAVICON_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub icon: IconConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Newline/whitespace separated list of sites rendered by the `/test` page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topsites_path: Option<PathBuf>,
}

/// Outbound fetch behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Upper bound for any single fetch
    #[serde(default = "default_connection_timeout", with = "duration")]
    pub connection_timeout: Duration,
    /// Total budget for one resolution, shared by every fetch it makes
    #[serde(default = "default_request_timeout", with = "duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Largest page body scanned for icon links; icon bodies are not capped
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Icon acceptance policy and the fallback icon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconConfig {
    /// Icons smaller than this are accepted with a warning
    #[serde(default = "default_min_icon_size")]
    pub min_size: usize,
    /// Icons larger than this are accepted with a warning
    #[serde(default = "default_max_icon_size")]
    pub max_size: usize,
    /// MIME types never accepted as an icon
    #[serde(default = "default_mime_blacklist")]
    pub mime_blacklist: Vec<String>,
    #[serde(default = "default_icon_path")]
    pub default_path: PathBuf,
    #[serde(default = "default_icon_type")]
    pub default_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CacheBackend {
    /// In-process LRU store, lost on restart
    Memory,
    /// Remote memcached server
    Memcached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,
    #[serde(default = "default_cache_host")]
    pub host: String,
    #[serde(default = "default_cache_port")]
    pub port: u16,
    #[serde(default = "default_cache_ttl", with = "duration")]
    pub ttl: Duration,
    /// Maximum number of entries held by the memory backend
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Per-command timeout for the memcached backend
    #[serde(default = "default_cache_io_timeout", with = "duration")]
    pub io_timeout: Duration,
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// Fetch defaults
fn default_connection_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
}

fn default_max_redirects() -> usize {
    DEFAULT_MAX_REDIRECTS
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

// Icon defaults
fn default_min_icon_size() -> usize {
    DEFAULT_MIN_ICON_SIZE
}

fn default_max_icon_size() -> usize {
    DEFAULT_MAX_ICON_SIZE
}

fn default_mime_blacklist() -> Vec<String> {
    DEFAULT_MIME_BLACKLIST.iter().map(|s| s.to_string()).collect()
}

fn default_icon_path() -> PathBuf {
    PathBuf::from(DEFAULT_ICON_PATH)
}

fn default_icon_type() -> String {
    DEFAULT_ICON_TYPE.to_string()
}

// Cache defaults
fn default_cache_backend() -> CacheBackend {
    CacheBackend::Memory
}

fn default_cache_host() -> String {
    DEFAULT_CACHE_HOST.to_string()
}

fn default_cache_port() -> u16 {
    DEFAULT_CACHE_PORT
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(DEFAULT_CACHE_TTL_SECS)
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_cache_io_timeout() -> Duration {
    Duration::from_millis(DEFAULT_CACHE_IO_TIMEOUT_MILLIS)
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            topsites_path: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connection_timeout: default_connection_timeout(),
            request_timeout: default_request_timeout(),
            max_redirects: default_max_redirects(),
            max_body_size: default_max_body_size(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_icon_size(),
            max_size: default_max_icon_size(),
            mime_blacklist: default_mime_blacklist(),
            default_path: default_icon_path(),
            default_type: default_icon_type(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            host: default_cache_host(),
            port: default_cache_port(),
            ttl: default_cache_ttl(),
            capacity: default_cache_capacity(),
            io_timeout: default_cache_io_timeout(),
        }
    }
}

impl IconConfig {
    /// Check the size band is usable
    pub fn validate(&self) -> Result<(), String> {
        if self.min_size > self.max_size {
            return Err(format!(
                "icon.min_size ({}) must not exceed icon.max_size ({})",
                self.min_size, self.max_size
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file layered under `FAVICON_` environment overrides
    ///
    /// A default file is written when none exists yet.
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if !Path::new(config_file).exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            std::fs::write(config_file, contents)
                .with_context(|| format!("Failed to write default config to {config_file}"))?;
            info!("Created default config file: {}", config_file);
        }

        let config: Self = Self::figment(config_file)
            .extract()
            .with_context(|| format!("Failed to load configuration from {config_file}"))?;

        config.icon.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Configuration sources in precedence order (later wins)
    pub fn figment(config_file: &str) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.web.port, 8080);
        assert_eq!(config.cache.ttl, Duration::from_secs(2_592_000));
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert!(config.icon.mime_blacklist.contains(&"text/html".to_string()));
        assert!(config.icon.validate().is_ok());
    }

    #[test]
    fn test_icon_size_band_validation() {
        let icon = IconConfig {
            min_size: 500,
            max_size: 100,
            ..IconConfig::default()
        };
        assert!(icon.validate().is_err());
    }

    #[test]
    fn test_load_from_file_layers_toml_over_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [fetch]
                request_timeout = "3s"

                [cache]
                backend = "memcached"
                port = 22122
                "#,
            )?;

            let config = Config::load_from_file("config.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.fetch.request_timeout, Duration::from_secs(3));
            assert_eq!(config.fetch.connection_timeout, Duration::from_secs(5));
            assert_eq!(config.cache.backend, CacheBackend::Memcached);
            assert_eq!(config.cache.port, 22122);
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[web]\nport = 9000\n")?;
            jail.set_env("FAVICON_WEB__PORT", "9100");
            jail.set_env("FAVICON_ICON__MIN_SIZE", "10");

            let config = Config::load_from_file("config.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.web.port, 9100);
            assert_eq!(config.icon.min_size, 10);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        figment::Jail::expect_with(|jail| {
            let config = Config::load_from_file("fresh.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.web.port, DEFAULT_PORT);
            assert!(jail.directory().join("fresh.toml").exists());
            Ok(())
        });
    }
}
