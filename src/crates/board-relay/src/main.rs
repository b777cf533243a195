//! Board relay: entry point.
//!
//! This binary accepts WebSocket connections from editors and relays their
//! board control requests (`connect`, `call`, `listenevent`) to a board
//! driver.  Responses and component events are broadcast back to every
//! connected editor.
//!
//! # Usage
//!
//! ```text
//! board-relay [OPTIONS]
//!
//! Options:
//!   --port            <PORT>   Listener port [default: 3074]
//!   --bind            <IP>     Listener address [default: 127.0.0.1]
//!   --allowed-origin  <URL>    CORS origin for plain HTTP [default: http://localhost:3232]
//!   --connect-timeout <SECS>   Time a board gets to report ready [default: 3]
//!   --board           <ID>     Board id the simulated driver answers for (repeatable)
//!   --config          <FILE>   TOML file with [relay] and [simulator] tables
//! ```
//!
//! Flags win over the config file, which wins over the built-in defaults.
//!
//! # Environment variable overrides
//!
//! | Variable                       | Flag                |
//! |--------------------------------|---------------------|
//! | `BOARD_RELAY_PORT`             | `--port`            |
//! | `BOARD_RELAY_BIND`             | `--bind`            |
//! | `BOARD_RELAY_ALLOWED_ORIGIN`   | `--allowed-origin`  |
//! | `BOARD_RELAY_CONNECT_TIMEOUT`  | `--connect-timeout` |
//! | `BOARD_RELAY_BOARDS`           | `--board` (comma separated) |
//! | `BOARD_RELAY_CONFIG`           | `--config`          |
//!
//! # Architecture overview
//!
//! ```text
//! Editors  (JSON over WebSocket, port 3074)
//!       ↕
//! board-relay  ← this process
//!   domain/          wire messages, RelayConfig
//!   application/     BoardRegistry, ComponentCache, RequestRouter, broadcaster
//!   infrastructure/  axum router, WebSocket sessions, plain HTTP
//!       ↕
//! board-driver  (simulated boards)
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use board_driver::SimulatedDriver;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use board_relay::application::RelayContext;
use board_relay::domain::{FileConfig, RelayConfig};
use board_relay::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Board relay.
///
/// Every flag is optional so that an unset flag falls through to the config
/// file and then to [`RelayConfig::default`].
#[derive(Debug, Parser)]
#[command(
    name = "board-relay",
    about = "WebSocket RPC relay between editor clients and hardware boards",
    version
)]
struct Cli {
    /// TCP port for the WebSocket/HTTP listener.
    #[arg(long, env = "BOARD_RELAY_PORT")]
    port: Option<u16>,

    /// IP address to bind the listener to.
    ///
    /// The relay has no authentication; keep this on loopback unless the
    /// network is trusted.
    #[arg(long, env = "BOARD_RELAY_BIND")]
    bind: Option<String>,

    /// Origin allowed by the CORS headers on plain HTTP responses.
    #[arg(long, env = "BOARD_RELAY_ALLOWED_ORIGIN")]
    allowed_origin: Option<String>,

    /// Seconds a board gets to report ready before it is unavailable.
    #[arg(long, env = "BOARD_RELAY_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Board id the simulated driver answers for.  Repeat for several boards;
    /// leave out to let every id connect.
    #[arg(long = "board", env = "BOARD_RELAY_BOARDS", value_delimiter = ',')]
    boards: Vec<String>,

    /// Path to a TOML config file.
    #[arg(long, env = "BOARD_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Layers the flags on top of `file` (if any) on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` or the file's `relay.bind` is not a valid
    /// IP address.
    fn into_relay_config(self, file: Option<&FileConfig>) -> anyhow::Result<RelayConfig> {
        let mut config = match file {
            Some(file) => file
                .apply(RelayConfig::default())
                .context("invalid config file")?,
            None => RelayConfig::default(),
        };

        if let Some(bind) = &self.bind {
            let ip: IpAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?;
            config.bind_addr.set_ip(ip);
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(origin) = self.allowed_origin {
            config.allowed_origin = origin;
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if !self.boards.is_empty() {
            config.simulated_boards = self.boards;
        }
        Ok(config)
    }
}

/// Reads and parses the `--config` file.
fn load_config_file(path: &Path) -> anyhow::Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    FileConfig::from_toml_str(&text)
        .with_context(|| format!("failed to load config file {}", path.display()))
}

/// Builds the simulated driver described by `config`.
fn build_driver(config: &RelayConfig) -> SimulatedDriver {
    let driver = if config.simulated_boards.is_empty() {
        SimulatedDriver::new()
    } else {
        SimulatedDriver::with_boards(config.simulated_boards.iter().cloned())
    };
    driver.ready_delay(config.simulated_ready_delay)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` controls the level; `info` when unset or invalid.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = cli
        .config
        .as_deref()
        .map(load_config_file)
        .transpose()?;
    let config = cli.into_relay_config(file.as_ref())?;

    info!(
        "board relay starting: listen={}, origin={}, connect timeout={:?}",
        config.bind_addr, config.allowed_origin, config.connect_timeout
    );
    if config.simulated_boards.is_empty() {
        info!("simulated driver answers for any board id");
    } else {
        info!("simulated driver answers for {:?}", config.simulated_boards);
    }

    let driver = build_driver(&config);
    let context = RelayContext::new(Arc::new(driver), config.connect_timeout);

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    // The server checks `running` every 200 ms and shuts down once it is false.
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, context, running).await?;

    info!("board relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
