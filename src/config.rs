//! Configuration file parser for ~/.config/odin-feed/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use crate::feed::{clamp_item_count, DEFAULT_ITEM_COUNT};
use crate::pipeline::FeedSettings;
use crate::wizard::WizardMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The feed URL is deliberately absent: the ODIN feed address is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Alarm group (`beredskabsID`). Empty = all groups.
    pub identifier: String,

    /// Station (`enhed`). Empty = all stations.
    pub station: String,

    /// Number of alarms to keep, 1..=20. Out-of-range values are clamped.
    pub count: i64,

    /// Seconds between poll cycles (minimum 10).
    pub poll_interval_secs: u64,

    /// Also filter by identifier/station client-side.
    pub local_filter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            station: String::new(),
            count: i64::from(DEFAULT_ITEM_COUNT),
            poll_interval_secs: 60,
            local_filter: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    pub const MIN_POLL_INTERVAL_SECS: u64 = 10;

    const KNOWN_KEYS: [&'static str; 5] = [
        "identifier",
        "station",
        "count",
        "poll_interval_secs",
        "local_filter",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content, path)
    }

    fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            path = %path.display(),
            identifier = %config.identifier,
            count = config.count,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Renders the config as TOML, e.g. for saving wizard results.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Config holding the given source settings and poll interval.
    pub fn from_settings(settings: &FeedSettings, poll_interval_secs: u64) -> Self {
        Self {
            identifier: settings.identifier.clone(),
            station: settings.station.clone(),
            count: i64::from(settings.count),
            poll_interval_secs,
            local_filter: settings.local_filter,
        }
    }

    /// Source settings against the fixed ODIN feed, with `count` clamped.
    pub fn feed_settings(&self) -> FeedSettings {
        let count = clamp_item_count(self.count);
        if i64::from(count) != self.count {
            tracing::warn!(requested = self.count, using = count, "Item count out of range, clamping");
        }
        FeedSettings::new(self.identifier.as_str(), self.station.as_str(), i64::from(count))
            .with_local_filter(self.local_filter)
    }

    /// Wizard mode for `setup`: reconfigure when an alarm group is already
    /// configured, otherwise start fresh against `feed_url`.
    pub fn wizard_mode(&self, feed_url: &str) -> WizardMode {
        if self.identifier.is_empty() {
            WizardMode::Setup
        } else {
            WizardMode::Reconfigure(self.feed_settings().with_feed_url(feed_url))
        }
    }

    pub fn poll_interval(&self) -> Duration {
        if self.poll_interval_secs < Self::MIN_POLL_INTERVAL_SECS {
            tracing::warn!(
                requested = self.poll_interval_secs,
                using = Self::MIN_POLL_INTERVAL_SECS,
                "Poll interval too short, using minimum"
            );
        }
        Duration::from_secs(self.poll_interval_secs.max(Self::MIN_POLL_INTERVAL_SECS))
    }
}

// ============================================================================
// Tests
// ============================================================================
