// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory log store for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::message::{IdempotencyToken, MessageId, MessageRecord};
use crate::store::{AppendError, LogStore, RecordScan, ScanError};
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    records: Vec<MessageRecord>,
    tokens: HashSet<IdempotencyToken>,
    unavailable: bool,
    scan_failure_after: Option<usize>,
    append_calls: usize,
}

/// Fake log store with failure injection. Clones share state.
#[derive(Clone, Default)]
pub struct FakeLogStore {
    state: Arc<Mutex<FakeState>>,
}

impl FakeLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every append and scan fail until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Scans yield `count` records and then fail
    pub fn fail_scans_after(&self, count: usize) {
        self.lock().scan_failure_after = Some(count);
    }

    /// Snapshot of all committed records
    pub fn records(&self) -> Vec<MessageRecord> {
        self.lock().records.clone()
    }

    /// Number of append attempts, including rejected ones
    pub fn append_calls(&self) -> usize {
        self.lock().append_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn outage() -> io::Error {
    io::Error::other("fake storage outage")
}

impl LogStore for FakeLogStore {
    fn append(
        &self,
        token: &IdempotencyToken,
        content: &str,
    ) -> Result<MessageRecord, AppendError> {
        let mut state = self.lock();
        state.append_calls += 1;
        if state.unavailable {
            return Err(AppendError::unavailable(outage()));
        }
        if state.tokens.contains(token) {
            return Err(AppendError::DuplicateToken(token.clone()));
        }

        let id = state
            .records
            .last()
            .map_or(MessageId::ZERO, |r| r.id)
            .next();
        let record = MessageRecord::new(id, token.clone(), content);
        state.tokens.insert(token.clone());
        state.records.push(record.clone());
        Ok(record)
    }

    fn scan_after(&self, min_id: MessageId) -> Result<RecordScan, ScanError> {
        let state = self.lock();
        if state.unavailable {
            return Err(ScanError::unavailable(outage()));
        }

        let mut items: Vec<Result<MessageRecord, ScanError>> = state
            .records
            .iter()
            .filter(|r| r.id > min_id)
            .cloned()
            .map(Ok)
            .collect();

        if let Some(limit) = state.scan_failure_after {
            items.truncate(limit);
            items.push(Err(ScanError::unavailable(outage())));
        }

        Ok(Box::new(items.into_iter()))
    }

    fn last_id(&self) -> MessageId {
        self.lock().records.last().map_or(MessageId::ZERO, |r| r.id)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
