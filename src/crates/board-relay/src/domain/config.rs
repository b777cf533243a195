//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! `main.rs` builds it from three layers, highest precedence first:
//!
//! 1. Command-line flags (and their environment variable equivalents).
//! 2. An optional TOML file passed with `--config`.
//! 3. [`RelayConfig::default`].
//!
//! # TOML file
//!
//! ```toml
//! [relay]
//! bind = "127.0.0.1"
//! port = 3074
//! allowed_origin = "http://localhost:3232"
//! connect_timeout_secs = 3
//!
//! [simulator]
//! boards = ["A", "B"]
//! ready_delay_ms = 250
//! ```
//!
//! Every key is optional; absent keys fall through to the defaults.  Parsing
//! is pure (`from_toml_str`); reading the file is left to the caller.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default loopback port the relay listens on.
pub const DEFAULT_PORT: u16 = 3074;

/// Default origin allowed by the CORS headers on plain HTTP responses.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3232";

/// Default time a board gets to report ready.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Error type for configuration parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A bind address was not a valid IP address.
    #[error("invalid bind address: '{0}'")]
    InvalidBindAddress(String),
}

/// All runtime configuration for the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Address the combined WebSocket/HTTP listener binds to.
    ///
    /// The relay has no authentication, so the default is loopback only.
    pub bind_addr: SocketAddr,

    /// The single origin allowed by `Access-Control-Allow-Origin`.
    pub allowed_origin: String,

    /// How long a board connection attempt may take before the board is
    /// reported unavailable.
    pub connect_timeout: Duration,

    /// Board ids the simulated driver answers for.  Empty means every id.
    pub simulated_boards: Vec<String>,

    /// How long a simulated board takes to report ready.
    pub simulated_ready_delay: Duration,
}

impl Default for RelayConfig {
    /// | Field                 | Default                   |
    /// |-----------------------|---------------------------|
    /// | bind_addr             | `127.0.0.1:3074`          |
    /// | allowed_origin        | `http://localhost:3232`   |
    /// | connect_timeout       | 3 seconds                 |
    /// | simulated_boards      | empty (any id)            |
    /// | simulated_ready_delay | 0                         |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            simulated_boards: Vec::new(),
            simulated_ready_delay: Duration::ZERO,
        }
    }
}

// ── File schema ───────────────────────────────────────────────────────────────

/// Contents of a `--config` TOML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub simulator: SimulatorSection,
}

/// `[relay]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub allowed_origin: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

/// `[simulator]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulatorSection {
    pub boards: Option<Vec<String>>,
    pub ready_delay_ms: Option<u64>,
}

impl FileConfig {
    /// Parses the TOML text of a config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies every key present in the file on top of `config`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidBindAddress`] if `relay.bind` is not an IP address.
    pub fn apply(&self, mut config: RelayConfig) -> Result<RelayConfig, ConfigError> {
        if let Some(bind) = &self.relay.bind {
            let ip: IpAddr = bind
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(bind.clone()))?;
            config.bind_addr.set_ip(ip);
        }
        if let Some(port) = self.relay.port {
            config.bind_addr.set_port(port);
        }
        if let Some(origin) = &self.relay.allowed_origin {
            config.allowed_origin = origin.clone();
        }
        if let Some(secs) = self.relay.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(boards) = &self.simulator.boards {
            config.simulated_boards = boards.clone();
        }
        if let Some(ms) = self.simulator.ready_delay_ms {
            config.simulated_ready_delay = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
