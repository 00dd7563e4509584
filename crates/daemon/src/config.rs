//! Configuration management for the HybridStore daemon.
//!
//! This module provides TOML-based configuration file loading.
//! The default configuration path is `~/.config/hybridstore/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default address the HTTP server binds to.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8000";

/// Default upper bound for an inbound channel frame.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("storage root must be an absolute path, got {0:?}")]
    InvalidStorageRoot(PathBuf),

    #[error("max_message_bytes must be greater than 0")]
    InvalidMaxMessageBytes,

    #[error("host_name must not be empty when set")]
    EmptyHostName,

    #[error("HYBRIDSTORE_BIND is not a socket address: {0:?}")]
    InvalidBindOverride(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the HybridStore daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP server configuration.
    pub server: ServerConfig,

    /// Sandbox storage configuration.
    pub storage: StorageConfig,

    /// Security settings.
    pub security: SecurityConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for rolling log files. Logs go to stderr only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP and channel server to.
    pub bind_address: SocketAddr,

    /// Host name advertised in pairing offers. Defaults to the OS host name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,

    /// Allow cross-origin requests from any origin (desktop UI dev server).
    pub cors_permissive: bool,
}

/// Sandbox storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// The sandbox root. No listing ever escapes this directory.
    pub root: PathBuf,

    /// Whether entries starting with '.' are listed.
    pub include_hidden: bool,
}

/// Security settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Close open channels of a device when it is revoked.
    pub terminate_sessions_on_revoke: bool,

    /// Maximum size of an inbound channel frame in bytes.
    pub max_message_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8000))),
            host_name: None,
            cors_permissive: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            include_hidden: true,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            terminate_sessions_on_revoke: true,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hybridstore")
        .join("config.toml")
}

/// Returns the default sandbox root, `~/HybridStorage`.
fn default_storage_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("HybridStorage")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Empty values are ignored. Supported variables:
    /// - HYBRIDSTORE_BIND: Override the bind address
    /// - HYBRIDSTORE_STORAGE_ROOT: Override the sandbox root
    /// - HYBRIDSTORE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    ///
    /// Runs before logging is set up, so a bad value is returned rather
    /// than logged.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(bind) = non_empty_env("HYBRIDSTORE_BIND") {
            self.server.bind_address = bind
                .parse()
                .map_err(|_| ConfigError::InvalidBindOverride(bind))?;
        }

        if let Some(root) = non_empty_env("HYBRIDSTORE_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }

        if let Some(level) = non_empty_env("HYBRIDSTORE_LOG_LEVEL") {
            self.daemon.log_level = level;
        }

        Ok(())
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        if !self.storage.root.is_absolute() {
            return Err(ConfigError::InvalidStorageRoot(self.storage.root.clone()));
        }

        if self.security.max_message_bytes == 0 {
            return Err(ConfigError::InvalidMaxMessageBytes);
        }

        if let Some(name) = &self.server.host_name {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyHostName);
            }
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
