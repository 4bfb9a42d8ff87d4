use serde::{Deserialize, Serialize};
use std::time::Duration;

/// PROXY protocol header written before the TLS handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ProxyVersion {
    /// No header (xver = 0)
    #[default]
    None,
    /// Text header, "PROXY TCP4 ..." (xver = 1)
    V1,
    /// Binary header (xver = 2)
    V2,
}

impl TryFrom<u8> for ProxyVersion {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(format!("unsupported PROXY protocol version {other}, expected 0, 1 or 2")),
        }
    }
}

impl From<ProxyVersion> for u8 {
    fn from(value: ProxyVersion) -> Self {
        match value {
            ProxyVersion::None => 0,
            ProxyVersion::V1 => 1,
            ProxyVersion::V2 => 2,
        }
    }
}

/// Camouflage destination to characterize
#[derive(Debug, Deserialize, Clone)]
pub struct Destination {
    /// Destination address (host:port format)
    /// Example: "www.example.com:443" or "203.0.113.7:443"
    pub dest: String,
    /// Server names sent as SNI, each probed with every ALPN profile
    pub server_names: Vec<String>,
    /// PROXY protocol version: 0 (none), 1 or 2
    /// Default: 0
    #[serde(default)]
    pub xver: ProxyVersion,
}

/// Timeout configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    /// TCP connect timeout in milliseconds
    /// Default: 5000 (5 seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
    /// TLS handshake timeout in seconds
    /// The capture window and the CCS injection budget are added on top
    /// Default: 15 seconds
    #[serde(default = "default_tls_handshake_timeout")]
    pub tls_handshake_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_timeout(),
            tls_handshake_secs: default_tls_handshake_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn tls_handshake(&self) -> Duration {
        Duration::from_secs(self.tls_handshake_secs)
    }
}

/// TLS client configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TlsConfig {
    /// Extra trust anchors (PEM) added to the webpki roots and the system store
    /// Default: None
    #[serde(default)]
    pub ca_path: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    /// Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Show module path (target) in log messages
    /// Default: false
    #[serde(default)]
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), show_target: false }
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Destinations to probe
    /// At least one destination is required
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_tls_handshake_timeout() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}
