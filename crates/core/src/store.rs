// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable log store contract
//!
//! The store owns id assignment and token uniqueness. Callers never lock
//! around `append` to get either guarantee.

use crate::message::{IdempotencyToken, MessageId, MessageRecord};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from `LogStore::append`
#[derive(Debug, Error)]
pub enum AppendError {
    /// A record with this token is already committed. Nothing was written.
    #[error("duplicate idempotency token: {0}")]
    DuplicateToken(IdempotencyToken),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] BoxError),
}

impl AppendError {
    pub fn unavailable(err: impl Into<BoxError>) -> Self {
        Self::StorageUnavailable(err.into())
    }
}

/// Errors from `LogStore::scan_after`, either starting the scan or mid-scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] BoxError),
}

impl ScanError {
    pub fn unavailable(err: impl Into<BoxError>) -> Self {
        Self::StorageUnavailable(err.into())
    }
}

/// Lazy, finite, id-ascending sequence of records
pub type RecordScan = Box<dyn Iterator<Item = Result<MessageRecord, ScanError>> + Send>;

/// Append-only log of accepted messages.
///
/// Implementations must guarantee:
/// - a successful `append` is durable before it returns
/// - ids are unique, strictly increasing, and assigned in commit order
/// - at most one record per token, ever
pub trait LogStore: Send + Sync {
    /// Commit a new record with the next id, unless `token` is already taken.
    fn append(&self, token: &IdempotencyToken, content: &str)
        -> Result<MessageRecord, AppendError>;

    /// Every record with `id > min_id`, ascending. Each call re-reads the
    /// current state; records committed after the call may or may not appear.
    fn scan_after(&self, min_id: MessageId) -> Result<RecordScan, ScanError>;

    /// Highest committed id, `MessageId::ZERO` when empty
    fn last_id(&self) -> MessageId;
}
