//! vboard server: entry point.
//!
//! Listens for control connections and turns key-event frames into synthetic
//! key presses.
//!
//! # Usage
//!
//! ```text
//! vboard-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML config file
//!   --bind <ADDR>                Listen address [default: 127.0.0.1:65535]
//!   --read-timeout-secs <SECS>   Per-frame read timeout [default: 10]
//!   --max-payload <BYTES>        Largest accepted payload [default: 65536]
//!   --log-level <FILTER>         Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! Every option can also come from the environment (`VBOARD_BIND`,
//! `VBOARD_READ_TIMEOUT`, `VBOARD_MAX_PAYLOAD`, `VBOARD_LOG`).  Flags and
//! environment override the config file, which overrides the defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vboard_server::application::Protocol;
use vboard_server::domain::{ConfigError, ServerConfig};
use vboard_server::infrastructure::key_injection::TracingKeyInjector;
use vboard_server::infrastructure::Server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// vboard control-channel server.
#[derive(Debug, Parser)]
#[command(
    name = "vboard-server",
    about = "TCP control channel that injects key events",
    version
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, env = "VBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. `0.0.0.0:7000`.
    #[arg(long, env = "VBOARD_BIND")]
    bind: Option<SocketAddr>,

    /// Seconds of silence allowed before a connection is dropped.
    #[arg(long, env = "VBOARD_READ_TIMEOUT")]
    read_timeout_secs: Option<u64>,

    /// Largest payload, in bytes, a single frame may declare.
    #[arg(long, env = "VBOARD_MAX_PAYLOAD")]
    max_payload: Option<u32>,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[arg(long, env = "VBOARD_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file (if any) and applies the CLI overrides on top.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from the file, or [`ConfigError::ZeroReadTimeout`]
    /// for `--read-timeout-secs 0`.
    fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = ServerConfig::load(self.config.as_deref())?;

        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(secs) = self.read_timeout_secs {
            if secs == 0 {
                return Err(ConfigError::ZeroReadTimeout);
            }
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = self.max_payload {
            config.max_payload_len = max;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse()
        .into_server_config()
        .context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        bind = %config.bind_addr,
        read_timeout = ?config.read_timeout,
        max_payload = config.max_payload_len,
        "vboard server starting"
    );

    let protocol = Protocol::with_keyboard(Arc::new(TracingKeyInjector), &config);
    let server = Arc::new(
        Server::bind(&config, protocol)
            .await
            .with_context(|| format!("failed to start on {}", config.bind_addr))?,
    );

    let shutdown = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("received Ctrl+C, shutting down");
                    server.shutdown().await;
                }
                Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
            }
        })
    };

    server.run().await?;
    shutdown.await.context("shutdown task failed")?;

    info!("vboard server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
