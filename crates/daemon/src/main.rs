// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chorus Daemon (chorusd)
//!
//! Owns the message log and broadcasts every committed message to all
//! connected sessions.

use std::path::PathBuf;
use std::sync::Arc;

use chorus_daemon::{serve, startup, Config, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional config file path
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let config = Config::load(config_path.as_deref())?;

    // Write startup marker to log (before tracing setup, so tools can find it)
    write_startup_marker(&config)?;

    let log_guard = setup_logging(&config)?;

    info!(
        listen = %config.listen,
        state_dir = %config.state_dir.display(),
        "Starting chorusd"
    );

    let daemon = match startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            write_startup_error(&config, &e);
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("Daemon ready, listening on {}", daemon.local_addr()?);

    // Signal ready for parent process (e.g., systemd, test harness)
    println!("READY");

    tokio::select! {
        _ = serve(&daemon.listener, Arc::clone(&daemon.context)) => {}

        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }

        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
    }

    daemon.shutdown()?;
    info!("Daemon stopped");
    Ok(())
}

/// Startup marker prefix written to log before anything else.
/// Full format: "--- chorusd: starting (pid: 12345)"
pub const STARTUP_MARKER_PREFIX: &str = "--- chorusd: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    std::fs::create_dir_all(&config.state_dir)?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())?;
    writeln!(file, "{}{})", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously to log file.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    std::fs::create_dir_all(&config.state_dir)?;

    let file_appender = tracing_appender::rolling::never(&config.state_dir, "chorusd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
