// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message records and their identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned position of a record in the log.
///
/// Ids start at 1. `MessageId::ZERO` means "nothing seen yet" and is never
/// assigned to a record.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub const ZERO: MessageId = MessageId(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id following this one
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Client-chosen identifier for one logical submission.
///
/// Retries of the same submission carry the same token, which collapses them
/// into a single record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdempotencyToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for IdempotencyToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// A committed message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub token: IdempotencyToken,
    pub content: String,
}

impl MessageRecord {
    pub fn new(id: MessageId, token: IdempotencyToken, content: impl Into<String>) -> Self {
        Self {
            id,
            token,
            content: content.into(),
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
