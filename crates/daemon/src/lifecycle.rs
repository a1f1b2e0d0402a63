// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, recovery, shutdown.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use chorus_core::{Fanout, LogStore};
use chorus_engine::Broker;
use chorus_storage::{LogError, MessageLog};
use fs2::FileExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::server::ServerContext;

/// Daemon state during operation
pub struct DaemonState {
    /// Configuration
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    /// Client listener
    pub listener: TcpListener,
    /// Broker and session state shared with connection tasks
    pub context: Arc<ServerContext<MessageLog>>,
}

impl DaemonState {
    /// Address actually bound, which differs from the configured one for port 0
    pub fn local_addr(&self) -> Result<SocketAddr, LifecycleError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shutdown the daemon gracefully
    pub fn shutdown(self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        let lock_path = self.config.lock_path();
        if lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        // Lock is released when self.lock_file drops
        info!(
            last_id = %self.context.broker.store().last_id(),
            parked = self.context.parked_sessions(),
            "Daemon shutdown complete"
        );
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    #[error("Message log error: {0}")]
    Log(#[from] LogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        // The PID file belongs to the running daemon
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Create state directory
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents two daemons sharing one log.
    // Opened without truncation so a running daemon's PID survives a failed
    // attempt.
    let mut lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(config.lock_path())?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Recover the message log; a torn final write is repaired here
    let log = MessageLog::open(&config.messages_path())?;

    // 4. Bind LAST - only after recovery succeeds
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.listen, e))?;

    let broker = Broker::new(Arc::new(log), Fanout::new(config.outbound_buffer));
    let context = Arc::new(ServerContext::new(
        broker,
        config.resume_window,
        config.max_frame_bytes,
    ));

    info!(
        state_dir = %config.state_dir.display(),
        "Daemon started"
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        context,
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    let lock_path = config.lock_path();
    if lock_path.exists() {
        let _ = std::fs::remove_file(&lock_path);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
