//! Bridge configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `L2MPS_BSA_`, nested keys separated
//!    by `__`
//!
//! # Example
//! ```no_run
//! use l2mps_bsa::config::BridgeConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::load_from("config/l2mps_bsa.toml")?;
//! config.validate()?;
//! for stream in config.stream_configs()? {
//!     println!("{} -> {}", stream.stream_name, stream.record_prefix);
//! }
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::acquisition::StreamConfig;
use crate::error::{BsaError, Result};
use crate::timestamp::TimestampPolicy;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/l2mps_bsa.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "L2MPS_BSA_";

/// Top-level bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Archive backend settings
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Streams started at boot
    #[serde(default)]
    pub streams: Vec<StreamDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Archive backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Backend receiving samples (csv or log)
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Output directory for CSV files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// One stream started at boot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDefinition {
    /// Stream identity (udp://host:port or file://path)
    pub name: String,
    /// Prefix of the archived channel names
    pub record_prefix: String,
    /// Blocking-read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Word order of the frame timestamp
    #[serde(default)]
    pub timestamp_policy: TimestampPolicy,
    /// Whether samples are archived from the start
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Whether the periodic frame dump starts enabled
    #[serde(default)]
    pub debug: bool,
    /// Accepted frames between debug dumps
    #[serde(default = "default_debug_interval")]
    pub debug_interval: u64,
}

// Default value functions
fn default_name() -> String {
    "l2mps-bsa".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_backend() -> String {
    "csv".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_enabled() -> bool {
    true
}

fn default_debug_interval() -> u64 {
    crate::acquisition::DEFAULT_DEBUG_INTERVAL
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            output_dir: default_output_dir(),
        }
    }
}

impl StreamDefinition {
    /// Stream definition with default settings.
    pub fn new(name: impl Into<String>, record_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record_prefix: record_prefix.into(),
            read_timeout_ms: default_read_timeout(),
            timestamp_policy: TimestampPolicy::default(),
            enabled: default_enabled(),
            debug: false,
            debug_interval: default_debug_interval(),
        }
    }

    /// Convert into a validated [`StreamConfig`].
    pub fn to_stream_config(&self) -> Result<StreamConfig> {
        StreamConfig::builder()
            .stream_name(&self.name)
            .record_prefix(&self.record_prefix)
            .read_timeout(Duration::from_millis(self.read_timeout_ms))
            .timestamp_policy(self.timestamp_policy)
            .enabled(self.enabled)
            .debug(self.debug)
            .debug_interval(self.debug_interval)
            .build()
    }
}

impl BridgeConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Environment variables override the file with prefix `L2MPS_BSA_`.
    /// Example: `L2MPS_BSA_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Provider chain used by [`BridgeConfig::load_from`].
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> std::result::Result<(), String> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        // Validate archive backend
        let valid_backends = ["csv", "log"];
        if !valid_backends.contains(&self.archive.backend.as_str()) {
            return Err(format!(
                "Invalid archive backend '{}'. Must be one of: {}",
                self.archive.backend,
                valid_backends.join(", ")
            ));
        }

        let mut names = std::collections::HashSet::new();
        let mut prefixes = std::collections::HashSet::new();
        for stream in &self.streams {
            if stream.name.is_empty() {
                return Err(BsaError::EmptyStreamName.to_string());
            }
            if stream.record_prefix.is_empty() {
                return Err(BsaError::EmptyRecordPrefix.to_string());
            }
            if stream.read_timeout_ms == 0 {
                return Err(format!("Stream '{}': read_timeout_ms must be > 0", stream.name));
            }
            if stream.debug_interval == 0 {
                return Err(format!("Stream '{}': debug_interval must be > 0", stream.name));
            }
            if !names.insert(&stream.name) {
                return Err(format!("Duplicate stream name: {}", stream.name));
            }
            if !prefixes.insert(&stream.record_prefix) {
                return Err(format!("Duplicate record prefix: {}", stream.record_prefix));
            }
        }

        Ok(())
    }

    /// Per-stream acquisition settings, in declaration order.
    pub fn stream_configs(&self) -> Result<Vec<StreamConfig>> {
        self.streams
            .iter()
            .map(StreamDefinition::to_stream_config)
            .collect()
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BsaError::invalid_config(e.to_string()))
    }
}
