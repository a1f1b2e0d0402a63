// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast fan-out to live sessions
//!
//! This module provides:
//! - `Fanout` - Registry of live sessions and their outbound channels
//! - `RecordReceiver` - Per-session buffer of live records

mod registry;

pub use registry::{Fanout, RecordReceiver, RecordSender, DEFAULT_SESSION_BUFFER};
