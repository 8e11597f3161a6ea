//! Configuration management for the storefront.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file in the working directory is read first when present.

use marquee_persist::PersistConfig;
use marquee_query::CacheConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Slices kept across sessions
pub const PERSISTED_SLICES: [&str; 1] = ["cities"];

/// Errors from reading the environment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
        /// What was expected
        reason: &'static str,
    },
}

/// Storefront configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorefrontConfig {
    /// Base URL every endpoint path is appended to
    pub api_base_url: String,
    /// Per-request timeout of the HTTP client, if any
    pub http_timeout: Option<Duration>,
    /// Directory for persisted state
    pub storage_dir: PathBuf,
    /// Cache-wide TTL and retention defaults
    pub cache: CacheConfig,
    /// Persistence key, version and whitelist
    pub persist: PersistConfig,
    /// Bearer token of a signed-in user
    pub auth_token: Option<String>,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            http_timeout: Some(Duration::from_secs(30)),
            storage_dir: PathBuf::from(".marquee"),
            cache: CacheConfig::default(),
            persist: PersistConfig::new(PERSISTED_SLICES),
            auth_token: None,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from the process environment
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `MARQUEE_API_BASE_URL` | `http://localhost:8080/api` |
    /// | `MARQUEE_HTTP_TIMEOUT_SECS` | `30` (`0` disables) |
    /// | `MARQUEE_STORAGE_DIR` | `.marquee` |
    /// | `MARQUEE_PERSIST_KEY` | `persist:root` |
    /// | `MARQUEE_PERSIST_VERSION` | `1` |
    /// | `MARQUEE_DEFAULT_TTL_SECS` | `60` |
    /// | `MARQUEE_DEFAULT_RETENTION_SECS` | `60` |
    /// | `MARQUEE_AUTH_TOKEN` | unset |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup` instead of the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let http_timeout = match parse_secs(&text, "MARQUEE_HTTP_TIMEOUT_SECS")? {
            Some(Duration::ZERO) => None,
            Some(timeout) => Some(timeout),
            None => defaults.http_timeout,
        };

        let persist_version = match text("MARQUEE_PERSIST_VERSION") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "MARQUEE_PERSIST_VERSION",
                value: raw,
                reason: "expected a non-negative integer",
            })?,
            None => defaults.persist.version,
        };

        Ok(Self {
            api_base_url: text("MARQUEE_API_BASE_URL").unwrap_or(defaults.api_base_url),
            http_timeout,
            storage_dir: text("MARQUEE_STORAGE_DIR").map_or(defaults.storage_dir, PathBuf::from),
            cache: CacheConfig {
                default_ttl: parse_secs(&text, "MARQUEE_DEFAULT_TTL_SECS")?
                    .unwrap_or(defaults.cache.default_ttl),
                default_retention: parse_secs(&text, "MARQUEE_DEFAULT_RETENTION_SECS")?
                    .unwrap_or(defaults.cache.default_retention),
            },
            persist: defaults
                .persist
                .with_root_key(text("MARQUEE_PERSIST_KEY").unwrap_or_else(|| "persist:root".to_string()))
                .with_version(persist_version),
            auth_token: text("MARQUEE_AUTH_TOKEN"),
        })
    }
}

fn parse_secs<F>(text: &F, name: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    text(name)
        .map(|raw| {
            raw.trim().parse().map(Duration::from_secs).map_err(|_| ConfigError::Invalid {
                name,
                value: raw,
                reason: "expected whole seconds",
            })
        })
        .transpose()
}
