// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Ordering, deduplication and recovery for chorus
//!
//! `Broker::submit` is the idempotent append path. `Broker::attach` and
//! `Broker::replay` restore a session's history and hand it a `SessionFeed`
//! that never yields an id twice.

mod broker;
mod feed;

pub use broker::{Broker, Outcome};
pub use feed::{Replay, ReplayGate, ReplayInterrupted, SessionFeed};
