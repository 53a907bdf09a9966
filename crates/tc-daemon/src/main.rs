//! # tc-daemon
//!
//! Temperature controller daemon.
//!
//! Owns the simulated thermostat, publishes its value periodically, and
//! serves the query, mutate and goal APIs over HTTP with SSE streams.
//!
//! ## Usage
//!
//! ```text
//! tc-daemon --config tc.toml --port 7878
//! RUST_LOG=tc_goal=debug tc-daemon --log-json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tc_daemon::{AppState, DaemonConfig};
use tc_thermostat::spawn_broadcaster;

/// Temperature controller daemon.
#[derive(Parser)]
#[command(name = "tc-daemon", about = "Temperature controller daemon", version)]
struct Cli {
    /// Path to a tc.toml config file (defaults apply when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind, overriding [server].bind.
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on, overriding [server].port.
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("tc_daemon=info".parse()?)
        .add_directive("tc_goal=info".parse()?)
        .add_directive("tc_thermostat=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        return;
    }
    tracing::info!("shutdown requested");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let config = DaemonConfig::load_or_default(cli.config.as_deref())?
        .with_overrides(cli.bind, cli.port);
    let addr = config.socket_addr()?;

    let state = AppState::new(&config).context("failed to initialise thermostat")?;
    let broadcaster = spawn_broadcaster(
        state.thermostat.clone(),
        config.broadcast.period(),
        state.readings.clone(),
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, tc_daemon::app(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    broadcaster.abort();
    tracing::info!("daemon stopped");
    Ok(())
}
