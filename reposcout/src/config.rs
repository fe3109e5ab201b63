use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{SearchError, SearchResult};

/// Configuration for the search backend client.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.reposcout.yaml` in the current directory
/// 3. Global `$HOME/.config/reposcout/config.yaml`
///
/// # Configuration Format
///
/// The configuration uses YAML format. Durations are written the way humans write them.
/// Example:
/// ```yaml
/// # Base delay between two refreshes of the repository list
/// refresh_interval: "5s"
///
/// # Total width of the random jitter window around the interval
/// refresh_jitter: "1s"
///
/// # Bound on a single list call made by the refresher
/// list_timeout: "1m"
///
/// # Consecutive refresh failures hidden from readers
/// error_threshold: 3
///
/// # Never start the background refresher (every list_all is uncached)
/// disable_cache: false
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_refresh_interval", with = "human_duration")]
    pub refresh_interval: Duration,

    /// Width of the jitter window; sleeps land in `interval ± jitter / 2`
    #[serde(default = "default_refresh_jitter", with = "human_duration")]
    pub refresh_jitter: Duration,

    #[serde(default = "default_list_timeout", with = "human_duration")]
    pub list_timeout: Duration,

    /// Failures in a row that stay invisible while a good snapshot exists
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Prevents caching of the repository list. Useful in tests.
    #[serde(default)]
    pub disable_cache: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_refresh_jitter() -> Duration {
    Duration::from_secs(1)
}

fn default_list_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_error_threshold() -> u32 {
    3
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            refresh_jitter: default_refresh_jitter(),
            list_timeout: default_list_timeout(),
            error_threshold: default_error_threshold(),
            disable_cache: false,
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default locations
    pub fn load() -> SearchResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from a specific file layered over the default locations
    pub fn load_from(config_path: Option<&Path>) -> SearchResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("reposcout/config.yaml")),
            Some(PathBuf::from(".reposcout.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicit file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the refresher cannot honor
    pub fn validate(&self) -> SearchResult<()> {
        if self.refresh_interval.is_zero() {
            return Err(SearchError::config_error("refresh_interval must be positive"));
        }
        if self.refresh_jitter > self.refresh_interval * 2 {
            return Err(SearchError::config_error(format!(
                "refresh_jitter ({}) is wider than twice refresh_interval ({})",
                humantime::format_duration(self.refresh_jitter),
                humantime::format_duration(self.refresh_interval)
            )));
        }
        if self.list_timeout.is_zero() {
            return Err(SearchError::config_error("list_timeout must be positive"));
        }
        Ok(())
    }
}

mod human_duration {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
