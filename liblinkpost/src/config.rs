//! Configuration management for Linkpost
//!
//! One [`Config`] is loaded (or built) once, validated, and then shared
//! read-only behind an `Arc`. Every section has defaults so a partial TOML file
//! is enough.
//!
//! ```toml
//! [voyager]
//! timeout_ms = 10000
//!
//! [rate_limits]
//! policy = "queue"
//!
//! [unified]
//! prefer_voyager = false
//! analytics_concurrency = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::rate_limiter::RateLimitConfig;
use crate::retry::RetryConfig;

/// Names a config file to use instead of the default location
const CONFIG_ENV: &str = "LINKPOST_CONFIG";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub voyager: VoyagerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub unified: UnifiedConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoyagerConfig {
    pub base_url: String,
    /// Per-call timeout unless a request overrides it
    pub timeout_ms: u64,
    /// Used when the stored credentials carry no user agent of their own
    pub user_agent: String,
    pub lang: String,
    /// Proxy for requests that ask for one
    pub proxy_url: Option<String>,
    /// Sessions expiring sooner than this are reported as needing refresh
    pub refresh_threshold_secs: u64,
}

impl Default for VoyagerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.linkedin.com".to_string(),
            timeout_ms: 15_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            lang: "en_US".to_string(),
            proxy_url: None,
            refresh_threshold_secs: 24 * 60 * 60,
        }
    }
}

impl VoyagerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifiedConfig {
    /// Skip the official API and go straight to Voyager
    pub prefer_voyager: bool,
    /// Parallel per-post analytics requests when listing recent posts.
    /// 1 keeps the listing strictly sequential.
    pub analytics_concurrency: usize,
}

impl Default for UnifiedConfig {
    fn default() -> Self {
        Self {
            prefer_voyager: true,
            analytics_concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/linkpost/linkpost.db".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file named by `LINKPOST_CONFIG` is an error.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var(CONFIG_ENV).is_ok();
        let config_path = resolve_config_path()?;
        if !explicit && !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        Self::load_from_path(&config_path)
    }

    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the client unusable
    pub fn validate(&self) -> Result<()> {
        if !(self.voyager.base_url.starts_with("https://")
            || self.voyager.base_url.starts_with("http://"))
        {
            return Err(invalid("voyager.base_url", "must be an http(s) URL"));
        }
        if self.voyager.timeout_ms == 0 {
            return Err(invalid("voyager.timeout_ms", "must be greater than zero"));
        }
        if self.voyager.user_agent.trim().is_empty() {
            return Err(ConfigError::MissingField("voyager.user_agent".to_string()).into());
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(invalid(
                "retry.max_delay_ms",
                "must not be lower than retry.base_delay_ms",
            ));
        }

        let rules = std::iter::once(("rate_limits.default".to_string(), &self.rate_limits.default))
            .chain(
                self.rate_limits
                    .endpoints
                    .iter()
                    .map(|(name, rule)| (format!("rate_limits.endpoints.{name}"), rule)),
            );
        for (field, rule) in rules {
            if rule.max_requests == 0 || rule.window_ms == 0 {
                return Err(invalid(&field, "max_requests and window_ms must be greater than zero"));
            }
        }

        if self.unified.analytics_concurrency == 0 {
            return Err(invalid("unified.analytics_concurrency", "must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::LinkpostError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Resolve the configuration file path following XDG Base Directory conventions
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("linkpost").join("config.toml"))
}

/// Resolve the database path, expanding `~`
pub fn resolve_db_path(configured: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(configured).to_string())
}
