// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! chorus-core: shared vocabulary for the chorus broadcast service
//!
//! This crate provides:
//! - Message records and their identifiers
//! - The `LogStore` contract the durable log implements
//! - The broadcast fan-out registry for live sessions

pub mod fanout;
pub mod id;
pub mod message;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use fanout::{Fanout, RecordReceiver, RecordSender};
pub use id::SessionId;
pub use message::{IdempotencyToken, MessageId, MessageRecord};
pub use store::{AppendError, LogStore, RecordScan, ScanError};

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeLogStore;
