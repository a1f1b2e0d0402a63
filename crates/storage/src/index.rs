// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory index materialized from the log

use chorus_core::{IdempotencyToken, MessageId, MessageRecord};
use std::collections::HashSet;
use thiserror::Error;

/// Why a record cannot follow the current index state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexConflict {
    #[error("id {id} does not follow {last}")]
    OutOfOrder { id: MessageId, last: MessageId },
    #[error("token {0} already committed")]
    DuplicateToken(IdempotencyToken),
}

/// Token set and high-water id built from committed records
#[derive(Debug, Default)]
pub struct LogIndex {
    tokens: HashSet<IdempotencyToken>,
    last_id: MessageId,
}

impl LogIndex {
    pub fn contains(&self, token: &IdempotencyToken) -> bool {
        self.tokens.contains(token)
    }

    pub fn last_id(&self) -> MessageId {
        self.last_id
    }

    /// Id the next committed record receives
    pub fn next_id(&self) -> MessageId {
        self.last_id.next()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Check a record can be applied without mutating anything
    pub fn check(&self, record: &MessageRecord) -> Result<(), IndexConflict> {
        if record.id <= self.last_id {
            return Err(IndexConflict::OutOfOrder {
                id: record.id,
                last: self.last_id,
            });
        }
        if self.tokens.contains(&record.token) {
            return Err(IndexConflict::DuplicateToken(record.token.clone()));
        }
        Ok(())
    }

    /// Apply a committed record
    pub fn apply(&mut self, record: &MessageRecord) -> Result<(), IndexConflict> {
        self.check(record)?;
        self.tokens.insert(record.token.clone());
        self.last_id = record.id;
        Ok(())
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
