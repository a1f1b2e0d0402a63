// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! chorusd: the transport side of chorus
//!
//! Accepts TCP connections, speaks the framed JSON protocol, keeps
//! disconnected sessions parked for resumption, and drives the engine.

pub mod config;
pub mod lifecycle;
pub mod protocol;
pub mod server;
pub mod sessions;

pub use config::{Config, ConfigError};
pub use lifecycle::{startup, DaemonState, LifecycleError};
pub use protocol::{ClientFrame, ProtocolError, ServerFrame};
pub use server::{serve, ServerContext, ServerError};
