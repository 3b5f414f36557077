//! Debugger configuration
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Defaults (disabled, `localhost:50051`)
//! 2. `debugger.toml` in the platform-specific config directory
//! 3. Environment variables (`TENSORWATCH_ENABLE`, `TENSORWATCH_HOST`,
//!    `TENSORWATCH_PORT`, `TENSORWATCH_PARTIAL_MEM`)
//!
//! Host and port stay raw strings until [`DebuggerConfig::resolve_endpoint`]
//! validates them, so a malformed value can disable the debugger with an error
//! instead of failing to load.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable enabling the debugger (`"1"` = on)
pub const ENV_ENABLE: &str = "TENSORWATCH_ENABLE";
/// Environment variable with the front end's IPv4 address
pub const ENV_HOST: &str = "TENSORWATCH_HOST";
/// Environment variable with the front end's port
pub const ENV_PORT: &str = "TENSORWATCH_PORT";
/// Environment variable enabling partial memory reuse (`"1"` = on)
pub const ENV_PARTIAL_MEM: &str = "TENSORWATCH_PARTIAL_MEM";

/// Host used when none is configured
pub const DEFAULT_HOST: &str = "localhost";
/// Port used when none is configured
pub const DEFAULT_PORT: u16 = 50051;

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "debugger.toml";

/// Debugger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DebuggerConfig {
    /// Whether interactive debugging is requested (default: false)
    #[serde(default)]
    pub enable: bool,
    /// Front end IPv4 address, unvalidated (default: localhost)
    #[serde(default)]
    pub host: Option<String>,
    /// Front end port, unvalidated (default: 50051)
    #[serde(default)]
    pub port: Option<String>,
    /// Reuse device memory between nodes; only watched tensors stay readable
    #[serde(default)]
    pub partial_memory: bool,
}

/// Validated address of the remote front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration that cannot be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("debugger host '{0}' is not a valid IPv4 address (expected x.x.x.x)")]
    InvalidHost(String),
    #[error("debugger port '{0}' is not valid (expected 1-65535)")]
    InvalidPort(String),
}

impl DebuggerConfig {
    /// Load the config file (if any) and apply environment overrides
    pub fn load() -> Self {
        let mut config = config_dir()
            .and_then(|dir| Self::from_file(&dir.join(CONFIG_FILE)))
            .unwrap_or_default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Read a TOML config file; missing or malformed files give `None`
    pub fn from_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str::<DebuggerConfig>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config");
                None
            }
        }
    }

    /// Apply overrides from a key lookup (environment-style keys)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(ENV_ENABLE) {
            self.enable = value == "1";
        }
        if let Some(value) = lookup(ENV_HOST) {
            self.host = Some(value);
        }
        if let Some(value) = lookup(ENV_PORT) {
            self.port = Some(value);
        }
        if let Some(value) = lookup(ENV_PARTIAL_MEM) {
            self.partial_memory = value == "1";
        }
    }

    /// Validate host and port, falling back to defaults when unset
    pub fn resolve_endpoint(&self) -> Result<Endpoint, ConfigError> {
        let host = match &self.host {
            None => DEFAULT_HOST.to_string(),
            Some(host) if is_valid_host(host) => host.clone(),
            Some(host) => return Err(ConfigError::InvalidHost(host.clone())),
        };
        let port = match &self.port {
            None => DEFAULT_PORT,
            Some(port) => parse_port(port).ok_or_else(|| ConfigError::InvalidPort(port.clone()))?,
        };
        Ok(Endpoint { host, port })
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/tensorwatch`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.tensorwatch", "", "tensorwatch")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Check a dotted-quad IPv4 address
///
/// The first and last octet must be 1-254, the middle ones 0-255. Leading
/// zeros are rejected.
pub fn is_valid_host(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    if octets.len() != 4 {
        return false;
    }
    octets.iter().enumerate().all(|(i, octet)| {
        let Some(value) = parse_decimal(octet) else {
            return false;
        };
        if i == 0 || i == 3 {
            (1..=254).contains(&value)
        } else {
            value <= 255
        }
    })
}

/// Parse a port string: digits only, no leading zero, 1-65535
pub fn parse_port(port: &str) -> Option<u16> {
    let value = parse_decimal(port)?;
    if value == 0 || value > u32::from(u16::MAX) {
        return None;
    }
    u16::try_from(value).ok()
}

/// Check a port string without keeping the value
pub fn is_valid_port(port: &str) -> bool {
    parse_port(port).is_some()
}

/// Decimal digits without leading zeros ("0" itself is allowed)
fn parse_decimal(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 5 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

/// Source of configuration consulted whenever the debugger (re)enables
pub trait ConfigSource: Send {
    fn load(&self) -> DebuggerConfig;
}

/// Configuration from the config file and process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl ConfigSource for EnvConfig {
    fn load(&self) -> DebuggerConfig {
        DebuggerConfig::load()
    }
}

/// Fixed configuration supplied by the embedder
#[derive(Debug, Clone, Default)]
pub struct StaticConfig(pub DebuggerConfig);

impl ConfigSource for StaticConfig {
    fn load(&self) -> DebuggerConfig {
        self.0.clone()
    }
}
