//! TOML configuration for the gateway.
//!
//! The file lives at `/etc/aprs-gateway.toml` by default (`aprs-gateway.toml`
//! in the working directory on Windows); the command line can point anywhere
//! else.  Example:
//!
//! ```toml
//! [general]
//! callsign = "N0CALL"
//! debug = false
//!
//! [log]
//! level = "info"
//! file_path = "/var/log/aprs-gateway"
//!
//! [aprs_is]
//! server = "euro.aprs2.net"
//! port = 14580
//! password = "12345"
//!
//! [network]
//! address = "127.0.0.1"
//! port = 8673
//! forward_address = "127.0.0.1:8674"
//! ```
//!
//! # Required and optional keys (for beginners)
//!
//! `callsign`, `server`, `password` and the local `port` have no sensible
//! default, so they have no `#[serde(default)]` and a file that leaves them
//! out fails to parse.  Everything else falls back to the value returned by
//! the matching `default_*` function below.  Parsing only checks shape;
//! [`GatewayConfig::validate`] then rejects values that parse but cannot
//! work, such as an empty callsign or port 0.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::aprs_is::{
    AprsIsConfig, DEFAULT_APRS_IS_PORT, DEFAULT_CLIENT_NAME,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but a value is unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub log: LogConfig,
    pub aprs_is: AprsIsSection,
    pub network: NetworkConfig,
}

/// Station identity and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Station callsign used to log in to APRS-IS.
    pub callsign: String,
    /// Hex-dump every outbound frame at debug level.
    #[serde(default)]
    pub debug: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for a log file.  Console only when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Log file name prefix.
    #[serde(default = "default_log_file_root")]
    pub file_root: String,
    /// Start a new log file every day.
    #[serde(default)]
    pub rotate: bool,
}

/// APRS-IS server and login settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AprsIsSection {
    /// Server host name or IP address.
    pub server: String,
    /// Server TCP port.
    #[serde(default = "default_aprs_is_port")]
    pub port: u16,
    /// APRS-IS passcode for the callsign.
    pub password: String,
    /// Software name announced in the login line.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Optional server-side filter, e.g. `"r/51.5/-0.1/50"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Local UDP endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Address the frame source binds to.
    #[serde(default = "default_bind_address")]
    pub address: String,
    /// Port the frame source binds to.
    pub port: u16,
    /// `ip:port` that receives inbound APRS-IS lines, one per datagram.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_address: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_file_root() -> String {
    "aprs-gateway".to_string()
}
fn default_aprs_is_port() -> u16 {
    DEFAULT_APRS_IS_PORT
}
fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_path: None,
            file_root: default_log_file_root(),
            rotate: false,
        }
    }
}

// ── Loading and validation ────────────────────────────────────────────────────

/// Platform default location of the config file.
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from("aprs-gateway.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        PathBuf::from("/etc/aprs-gateway.toml")
    }
}

/// Reads, parses, and validates the config file at `path`.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
/// for malformed TOML or missing required keys, and [`ConfigError::Invalid`]
/// when a value fails validation.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    GatewayConfig::from_toml_str(&content)
}

impl GatewayConfig {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// See [`load_config`].
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid =
            |msg: &str| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg.to_string())) };

        if self.general.callsign.trim().is_empty() {
            return invalid("general.callsign must not be empty");
        }
        if self.aprs_is.server.trim().is_empty() {
            return invalid("aprs_is.server must not be empty");
        }
        if self.aprs_is.port == 0 {
            return invalid("aprs_is.port must be non-zero");
        }
        if self.aprs_is.password.is_empty() {
            return invalid("aprs_is.password must not be empty");
        }
        if self.aprs_is.client_name.trim().is_empty() {
            return invalid("aprs_is.client_name must not be empty");
        }
        if self.log.file_path.is_some() && self.log.file_root.trim().is_empty() {
            return invalid("log.file_root must not be empty when log.file_path is set");
        }
        if self.network.port == 0 {
            return invalid("network.port must be non-zero");
        }
        if let Some(forward) = &self.network.forward_address {
            if forward.parse::<SocketAddr>().is_err() {
                return Err(ConfigError::Invalid(format!(
                    "network.forward_address {forward:?} is not an ip:port pair"
                )));
            }
        }
        Ok(())
    }

    /// Builds the APRS-IS client settings, announcing `version` at login.
    pub fn client_config(&self, version: &str) -> AprsIsConfig {
        AprsIsConfig {
            client_name: self.aprs_is.client_name.clone(),
            version: version.to_string(),
            filter: self.aprs_is.filter.clone(),
            debug: self.general.debug,
            ..AprsIsConfig::new(
                self.aprs_is.server.clone(),
                self.aprs_is.port,
                self.general.callsign.clone(),
                self.aprs_is.password.clone(),
            )
        }
    }

    /// `address:port` the local frame source binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.network.address, self.network.port)
    }

    /// Parsed forward target, if one is configured.
    pub fn forward_address(&self) -> Option<SocketAddr> {
        self.network
            .forward_address
            .as_deref()
            .and_then(|addr| addr.parse().ok())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
