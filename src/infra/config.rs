// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::infra::errors::TrackerError;
use crate::infra::paths;

/// Fixed collector path. Only the origin in front of it varies per site.
pub const DEFAULT_ENDPOINT: &str = "/api/metrics/v2/events";
pub const DEFAULT_COOKIE_NAME: &str = "mc_sid";
/// 30 days.
pub const DEFAULT_COOKIE_MAX_AGE_SECS: u64 = 2_592_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
/// Upper bound of `activeMs` on any event, whatever the tick period.
pub const MAX_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Path (or absolute URL) events are POSTed to.
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            timeout_ms: 5_000,
        }
    }
}

impl CollectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve the endpoint against a page origin. Absolute endpoints win.
    pub fn url_for(&self, origin: &str) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            return self.endpoint.clone();
        }
        let origin = origin.trim_end_matches('/');
        if self.endpoint.starts_with('/') {
            format!("{origin}{}", self.endpoint)
        } else {
            format!("{origin}/{}", self.endpoint)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub max_age_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.into(),
            max_age_secs: DEFAULT_COOKIE_MAX_AGE_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Tick period, at most `MAX_HEARTBEAT_INTERVAL_MS`. Also the upper bound
    /// of `activeMs` on any single event.
    pub interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    /// Path prefixes that never get a page view of their own.
    pub excluded_paths: Vec<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            excluded_paths: Vec::new(),
        }
    }
}

impl TrackingConfig {
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths
            .iter()
            .filter(|prefix| !prefix.is_empty())
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl Config {
    /// Load config from the default location, falling back to defaults.
    pub fn load() -> Result<Self, TrackerError> {
        match paths::config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, TrackerError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| TrackerError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.heartbeat.interval_ms == 0 {
            return Err(TrackerError::Config(
                "heartbeat.interval_ms must be greater than zero".into(),
            ));
        }
        if self.heartbeat.interval_ms > MAX_HEARTBEAT_INTERVAL_MS {
            return Err(TrackerError::Config(format!(
                "heartbeat.interval_ms must not exceed {MAX_HEARTBEAT_INTERVAL_MS}"
            )));
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(TrackerError::Config(
                "session.cookie_name must not be empty".into(),
            ));
        }
        if self.collector.endpoint.trim().is_empty() {
            return Err(TrackerError::Config(
                "collector.endpoint must not be empty".into(),
            ));
        }
        Ok(())
    }
}
