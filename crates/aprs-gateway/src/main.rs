//! APRS gateway entry point.
//!
//! Receives APRS frames from local software over UDP and forwards them to an
//! APRS-IS server over a logged-in TCP connection.  Lines the server sends
//! back can optionally be forwarded to a local UDP listener.
//!
//! # Usage
//!
//! ```text
//! aprs-gateway [CONFIG]
//!
//! Arguments:
//!   [CONFIG]  Path to the TOML configuration file
//!             [default: /etc/aprs-gateway.toml]
//!
//! Options:
//!   -V, --version  Print version
//! ```
//!
//! # Architecture overview
//!
//! ```text
//! local software ──UDP──▶ UdpFrameSource
//!                              │ run_relay (20 ms tick)
//!                              ▼
//!                         AprsIsClient ──TCP──▶ APRS-IS server
//!                              │
//!                   inbound lines (optional)
//!                              ▼
//!                        UdpLineForwarder ──UDP──▶ local listener
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use aprs_gateway::application::relay::run_relay;
use aprs_gateway::infrastructure::local::udp::{UdpFrameSource, UdpLineForwarder};
use aprs_gateway::infrastructure::logging;
use aprs_gateway::infrastructure::network::AprsIsClient;
use aprs_gateway::infrastructure::storage::config::{default_config_path, load_config};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ── CLI argument definitions ──────────────────────────────────────────────────

/// APRS gateway.
///
/// Forwards locally generated APRS frames to APRS-IS.
#[derive(Debug, Parser)]
#[command(
    name = "aprs-gateway",
    about = "Forwards local APRS frames to an APRS-IS server",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(env = "APRS_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the config file is loaded.  Nothing is
///    logged yet because the log level comes from the config file.
/// 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins over the
///    configured `[log] level` when both are present, and a log file is
///    opened when `[log] file_path` is set.
/// 3. The APRS-IS client is created and, if `forward_address` is set, given
///    a UDP forwarder as its read callback.
/// 4. The local UDP frame source is bound and the client worker is started.
/// 5. The relay runs until Ctrl+C or SIGTERM, then the client is stopped.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli.config_path();
    let config = load_config(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    // The guard flushes the log file when main returns.
    let _log_guard = logging::init(&config.log).context("failed to open the log file")?;

    info!("APRS gateway {VERSION} is starting");

    // ── APRS-IS client ────────────────────────────────────────────────────────
    let mut client = AprsIsClient::new(config.client_config(VERSION))
        .context("invalid APRS-IS settings")?;

    if let Some(target) = config.forward_address() {
        let forwarder = UdpLineForwarder::new(target)
            .with_context(|| format!("failed to open the forwarding socket for {target}"))?;
        client.set_read_callback(forwarder);
    }

    // ── Local frame source ────────────────────────────────────────────────────
    let mut source = UdpFrameSource::bind(&config.bind_address())
        .await
        .context("failed to open the local frame socket")?;

    client.start();

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        running_clone.store(false, Ordering::Release);
    });

    // ── Main relay loop ────────────────────────────────────────────────────────
    run_relay(&mut source, &client, &running).await;

    client.stop().await;
    info!("APRS gateway {VERSION} has stopped");
    Ok(())
}

/// Completes on Ctrl+C, or on SIGTERM where the platform has one.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            error!("failed to listen for Ctrl+C: {e}");
                        }
                    }
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                error!("failed to install the SIGTERM handler: {e}");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl+C: {e}");
        // Without a signal handler there is no way to stop cleanly; keep
        // running until the process is killed.
        std::future::pending::<()>().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
