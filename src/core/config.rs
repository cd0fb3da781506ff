//! # Gateway Configuration
//!
//! YAML-backed configuration for the gateway process: listen address, the
//! topology file to deploy, and outbound dispatch defaults. Parsed once at
//! startup; parse failures abort startup rather than surfacing per-request.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{GatewayError, GatewayResult};

/// Sentinel meaning "no timeout", matching the `-1` convention of the
/// declarative configuration this gateway consumes.
pub const NO_TIMEOUT: &str = "-1";

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Outbound dispatch client settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Path to the topology file to deploy at startup
    pub topology_file: PathBuf,

    /// PEM public key of the shared token authority, used for delegated
    /// verification when a federation provider configures no key of its own.
    /// Absent means delegated verification always fails (fail-closed).
    #[serde(default)]
    pub token_authority_pem: Option<PathBuf>,

    /// Whether to watch the topology file and redeploy on change
    #[serde(default)]
    pub watch_topologies: bool,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub listen_addr: SocketAddr,

    /// Context path the gateway is mounted at, used for self-referential
    /// links when no `X-Forwarded-Context` header is present
    #[serde(default)]
    pub context_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8443".parse().expect("static addr"),
            context_path: String::new(),
        }
    }
}

/// Outbound dispatch client settings.
///
/// Timeouts are duration strings (`30s`, `2m`, `500ms`) or the `-1` sentinel
/// for no timeout. They are kept as strings here and validated by
/// [`DispatchConfig::connection_timeout`] / [`DispatchConfig::socket_timeout`]
/// when the client is built, so a malformed value fails activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Connection establishment timeout
    #[serde(default = "default_timeout")]
    pub connection_timeout: String,

    /// Whole-call socket timeout
    #[serde(default = "default_timeout")]
    pub socket_timeout: String,
}

fn default_timeout() -> String {
    NO_TIMEOUT.to_string()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            connection_timeout: default_timeout(),
            socket_timeout: default_timeout(),
        }
    }
}

impl DispatchConfig {
    /// Parsed connection timeout; `None` means no timeout
    pub fn connection_timeout(&self) -> GatewayResult<Option<Duration>> {
        parse_timeout(&self.connection_timeout)
    }

    /// Parsed socket timeout; `None` means no timeout
    pub fn socket_timeout(&self) -> GatewayResult<Option<Duration>> {
        parse_timeout(&self.socket_timeout)
    }
}

/// Parse an externally supplied timeout string.
///
/// Accepts humantime-style durations (`30s`, `2m`, `1500ms`) and the `-1`
/// sentinel meaning no timeout. Anything else is a configuration error.
pub fn parse_timeout(value: &str) -> GatewayResult<Option<Duration>> {
    let value = value.trim();
    if value == NO_TIMEOUT {
        return Ok(None);
    }
    humantime::parse_duration(value)
        .map(Some)
        .map_err(|e| GatewayError::config(format!("invalid timeout '{}': {}", value, e)))
}

impl GatewayConfig {
    /// Load the gateway configuration from a YAML file
    pub fn load(path: &Path) -> GatewayResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GatewayConfig = serde_yaml::from_str(&contents)?;
        // Validate timeout strings up front so a typo fails startup, not the
        // first forwarded request.
        config.dispatch.connection_timeout()?;
        config.dispatch.socket_timeout()?;
        Ok(config)
    }
}
