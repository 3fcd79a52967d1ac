// crates/soullink-config/src/lib.rs
// ============================================================================
// Module: SoulLink Config
// Description: TOML-backed configuration for the tracker service, with
//              environment-variable overrides.
// Purpose: Provide a single, strictly validated source of truth for the
//          SQLite path, bind address, busy timeout, and broadcast capacity
//          the rest of the workspace runs with.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Configuration is loaded once at process start: a TOML file (defaulting to
//! `soullink.toml` in the current directory, overridable via
//! `SOULLINK_CONFIG`), then individual fields may be overridden by
//! `SOULLINK_*` environment variables. There is no dynamic reload — a
//! changed file or environment has no effect on an already-running process.

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Environment variable used to override the config file path.
pub const CONFIG_PATH_ENV_VAR: &str = "SOULLINK_CONFIG";
/// Default config file name when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "soullink.toml";
/// Maximum accepted config file size, guarding against a misdirected giant
/// file being read into memory.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file exceeded [`MAX_CONFIG_FILE_SIZE`].
    #[error("config file {path} is too large ({size} bytes, max {MAX_CONFIG_FILE_SIZE})")]
    TooLarge {
        /// Oversized path.
        path: PathBuf,
        /// Observed size in bytes.
        size: u64,
    },

    /// The config file's TOML failed to parse.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// An environment variable override had an invalid value.
    #[error("environment variable {var} has an invalid value: {value}")]
    InvalidEnvOverride {
        /// Offending variable name.
        var: &'static str,
        /// Offending raw value.
        value: String,
    },

    /// A loaded value failed post-parse validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete runtime configuration for the tracker service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoullinkConfig {
    /// Path to the `SQLite` database file.
    pub database_path: PathBuf,
    /// Address the HTTP/WebSocket server binds to.
    pub bind_address: SocketAddr,
    /// Minimum `SQLite` busy-timeout, in milliseconds (floored to the
    /// store's own 5-second minimum regardless of this value).
    pub busy_timeout_ms: u64,
    /// Capacity of each per-run live-broadcast channel.
    pub broadcast_channel_capacity: usize,
    /// Interval, in seconds, at which an idempotency-key sweep would run if
    /// one were implemented. Unused by default: idempotency-key retention is
    /// an operational concern, not enforced here.
    pub idempotency_sweep_interval_secs: Option<u64>,
}

impl Default for SoullinkConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("soullink.db"),
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            busy_timeout_ms: 5_000,
            broadcast_channel_capacity: 256,
            idempotency_sweep_interval_secs: None,
        }
    }
}

impl SoullinkConfig {
    /// Loads configuration from the default or `SOULLINK_CONFIG`-specified
    /// path, falling back to defaults if no file exists, then applies
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an existing file cannot be read or
    /// parsed, if an override environment variable is malformed, or if the
    /// resulting configuration fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from an explicit TOML file path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read,
    /// [`ConfigError::TooLarge`] if it exceeds the size cap, or
    /// [`ConfigError::Parse`] if its contents are not valid TOML matching
    /// this shape.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let metadata = fs::metadata(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
            });
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Returns the `SQLite` busy timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("SOULLINK_DATABASE_PATH") {
            self.database_path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("SOULLINK_BIND_ADDRESS") {
            self.bind_address = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                var: "SOULLINK_BIND_ADDRESS",
                value,
            })?;
        }
        if let Ok(value) = env::var("SOULLINK_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                var: "SOULLINK_BUSY_TIMEOUT_MS",
                value,
            })?;
        }
        if let Ok(value) = env::var("SOULLINK_BROADCAST_CHANNEL_CAPACITY") {
            self.broadcast_channel_capacity =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    var: "SOULLINK_BROADCAST_CHANNEL_CAPACITY",
                    value,
                })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "broadcast_channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "database_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV_VAR).map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME), PathBuf::from)
}
