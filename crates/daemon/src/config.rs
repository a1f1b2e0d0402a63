// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration
//!
//! Read from an optional TOML file, then overridden by `CHORUS_LISTEN` and
//! `CHORUS_STATE_DIR`.

use chorus_core::fanout::DEFAULT_SESSION_BUFFER;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::protocol::DEFAULT_MAX_FRAME_BYTES;

pub const DEFAULT_LISTEN: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
    3000,
);

/// How long a disconnected session stays resumable
pub const DEFAULT_RESUME_WINDOW: Duration = Duration::from_secs(120);

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Could not determine state directory")]
    NoStateDir,
}

/// On-disk form; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    listen: Option<SocketAddr>,
    state_dir: Option<PathBuf>,
    #[serde(with = "humantime_serde::option")]
    resume_window: Option<Duration>,
    outbound_buffer: Option<usize>,
    max_frame_bytes: Option<usize>,
}

/// Resolved daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to accept client connections on
    pub listen: SocketAddr,
    /// Directory holding the message log, lock file and daemon log
    pub state_dir: PathBuf,
    /// How long a disconnected session may be resumed
    pub resume_window: Duration,
    /// Live records buffered per session before it is dropped as lagging
    pub outbound_buffer: usize,
    /// Largest accepted client frame
    pub max_frame_bytes: usize,
}

impl Config {
    /// Load from `path` (if any) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |var| std::env::var(var).ok())
    }

    pub fn load_with_env(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
                toml::from_str::<ConfigFile>(&text)?
            }
            None => ConfigFile::default(),
        };

        let listen = match env("CHORUS_LISTEN") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "CHORUS_LISTEN",
                value,
            })?,
            None => file.listen.unwrap_or(DEFAULT_LISTEN),
        };

        let state_dir = match (env("CHORUS_STATE_DIR"), file.state_dir) {
            (Some(dir), _) => PathBuf::from(dir),
            (None, Some(dir)) => dir,
            (None, None) => default_state_dir(&env)?,
        };

        let config = Self {
            listen,
            state_dir,
            resume_window: file.resume_window.unwrap_or(DEFAULT_RESUME_WINDOW),
            outbound_buffer: file.outbound_buffer.unwrap_or(DEFAULT_SESSION_BUFFER),
            max_frame_bytes: file.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES),
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults rooted at `state_dir`
    pub fn for_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen: DEFAULT_LISTEN,
            state_dir: state_dir.into(),
            resume_window: DEFAULT_RESUME_WINDOW,
            outbound_buffer: DEFAULT_SESSION_BUFFER,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid("outbound_buffer must be positive".into()));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid("max_frame_bytes must be positive".into()));
        }
        Ok(())
    }

    /// Path to the durable message log
    pub fn messages_path(&self) -> PathBuf {
        self.state_dir.join("messages.log")
    }

    /// Path to lock/PID file
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("chorusd.pid")
    }

    /// Path to daemon log file
    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("chorusd.log")
    }
}

/// `$XDG_STATE_HOME/chorus`, else `~/.local/state/chorus`
fn default_state_dir(env: &impl Fn(&str) -> Option<String>) -> Result<PathBuf, ConfigError> {
    if let Some(xdg) = env("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("chorus"));
    }

    let home = env("HOME").ok_or(ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/chorus"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
