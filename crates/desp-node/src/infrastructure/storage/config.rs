//! TOML-based configuration for the `desp` host.
//!
//! Reads and writes `AppConfig` at the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Desp\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/desp/config.toml` (or `~/.config/desp/...`)
//! - macOS:    `~/Library/Application Support/Desp/config.toml`
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [session]
//! group = "239.0.0.0:11332"
//! source_address = "192.168.1.20"
//!
//! [scan]
//! port = 11332
//! probe_timeout_ms = 100
//! transport = "udp"
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section or
//! a file from an older version all load.
//!
//! Addresses are kept as text in the file and parsed when a runtime config
//! is built, so a typo surfaces as [`ConfigError::InvalidAddress`] naming
//! the offending value.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use desp_core::Transport;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::{ScanConfig, SessionConfig, DEFAULT_PORT};

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An address field is not a valid IPv4 address.
    #[error("invalid {field} address {value:?}")]
    InvalidAddress { field: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub scan: ScanSettings,
}

/// Host-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Multicast session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    /// Group as `ip` or `ip:port`.
    #[serde(default = "default_group")]
    pub group: String,
    /// Local address to send from; absent means the default-route address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    /// Receive socket bind address; absent means the group address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,
}

/// Subnet scan settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default)]
    pub transport: Transport,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_group() -> String {
    format!("239.0.0.0:{DEFAULT_PORT}")
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_probe_timeout_ms() -> u64 {
    100
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            group: default_group(),
            source_address: None,
            bind_address: None,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
            transport: Transport::default(),
        }
    }
}

// ── Runtime configs ───────────────────────────────────────────────────────────

impl AppConfig {
    /// Builds the session config from the `[session]` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] for unparsable addresses.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        Ok(SessionConfig {
            group: parse_group_addr(&self.session.group)?,
            source: non_blank(&self.session.source_address)
                .map(parse_source_addr)
                .transpose()?,
            bind: non_blank(&self.session.bind_address)
                .map(|value| parse_ipv4("bind", value))
                .transpose()?,
        })
    }

    /// Builds a scan config for the /24 around `base` from `[scan]`.
    pub fn scan_config(&self, base: Ipv4Addr) -> ScanConfig {
        ScanConfig {
            base,
            port: self.scan.port,
            transport: self.scan.transport,
            probe_timeout: Duration::from_millis(self.scan.probe_timeout_ms),
        }
    }
}

// ── Address parsing ───────────────────────────────────────────────────────────

/// An empty address means "pick automatically", same as an absent one.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn parse_ipv4(field: &'static str, value: &str) -> Result<Ipv4Addr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
        })
}

/// Parses a group given as `ip:port`, or as a bare `ip` on the default port.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidAddress`] if neither form parses.
pub fn parse_group_addr(value: &str) -> Result<SocketAddrV4, ConfigError> {
    let trimmed = value.trim();
    if let Ok(addr) = trimmed.parse::<SocketAddrV4>() {
        return Ok(addr);
    }
    parse_ipv4("group", trimmed).map(|ip| SocketAddrV4::new(ip, DEFAULT_PORT))
}

/// Parses a source address given as `ip` or `ip:port`; any port is ignored
/// because the send socket always takes an ephemeral one.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidAddress`] if neither form parses.
pub fn parse_source_addr(value: &str) -> Result<Ipv4Addr, ConfigError> {
    let trimmed = value.trim();
    if let Ok(addr) = trimmed.parse::<SocketAddrV4>() {
        return Ok(*addr.ip());
    }
    parse_ipv4("source", trimmed)
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads `AppConfig` from the platform config file.
///
/// # Errors
///
/// See [`config_file_path`] and [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `desp` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Desp"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Desp")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("desp"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
