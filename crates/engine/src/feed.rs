// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session delivery: replay from the log, then live records.
//!
//! A session subscribes to fan-out before its replay scan starts, so a record
//! committed during replay can arrive both ways. Both paths go through the
//! same `ReplayGate`, which only lets ids above the highest delivered id pass.

use chorus_core::{MessageId, MessageRecord, RecordReceiver, RecordScan, ScanError, SessionId};
use thiserror::Error;

/// Replay stopped before the end of the log
#[derive(Debug, Error)]
#[error("replay interrupted after id {delivered}: {source}")]
pub struct ReplayInterrupted {
    /// Highest id emitted before the failure
    pub delivered: MessageId,
    #[source]
    pub source: ScanError,
}

/// Highest id delivered to one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayGate {
    delivered: MessageId,
}

impl ReplayGate {
    pub fn new(last_seen: MessageId) -> Self {
        Self {
            delivered: last_seen,
        }
    }

    /// Admit a record if it is newer than anything delivered so far
    pub fn admit(&mut self, record: &MessageRecord) -> bool {
        if record.id <= self.delivered {
            return false;
        }
        self.delivered = record.id;
        true
    }

    pub fn delivered(&self) -> MessageId {
        self.delivered
    }
}

/// A session's live subscription plus its delivery gate
pub struct SessionFeed {
    session_id: SessionId,
    live: RecordReceiver,
    gate: ReplayGate,
}

impl SessionFeed {
    pub(crate) fn new(session_id: SessionId, live: RecordReceiver, last_seen: MessageId) -> Self {
        Self {
            session_id,
            live,
            gate: ReplayGate::new(last_seen),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Highest id handed out by this feed
    pub fn delivered(&self) -> MessageId {
        self.gate.delivered()
    }

    /// Next live record not yet delivered.
    ///
    /// Returns `None` once fan-out has dropped the session (lagging, or
    /// detached); the session must then recover through replay. Cancel safe.
    pub async fn next_live(&mut self) -> Option<MessageRecord> {
        loop {
            let record = self.live.recv().await?;
            if self.gate.admit(&record) {
                return Some(record);
            }
        }
    }

    pub(crate) fn replay(&mut self, scan: Result<RecordScan, ScanError>) -> Replay<'_> {
        let (scan, pending) = match scan {
            Ok(scan) => (Some(scan), None),
            Err(e) => (None, Some(e)),
        };
        Replay {
            gate: &mut self.gate,
            scan,
            pending,
        }
    }
}

/// Lazy replay of logged records to a single session.
///
/// Yields records in id order. After the first error the iterator is
/// exhausted; records already yielded stay delivered.
pub struct Replay<'a> {
    gate: &'a mut ReplayGate,
    scan: Option<RecordScan>,
    pending: Option<ScanError>,
}

impl Replay<'_> {
    fn interrupted(&mut self, source: ScanError) -> ReplayInterrupted {
        self.scan = None;
        ReplayInterrupted {
            delivered: self.gate.delivered(),
            source,
        }
    }
}

impl Iterator for Replay<'_> {
    type Item = Result<MessageRecord, ReplayInterrupted>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(source) = self.pending.take() {
            return Some(Err(self.interrupted(source)));
        }

        loop {
            let item = self.scan.as_mut()?.next();
            match item {
                None => {
                    self.scan = None;
                    return None;
                }
                Some(Ok(record)) => {
                    if self.gate.admit(&record) {
                        return Some(Ok(record));
                    }
                }
                Some(Err(source)) => return Some(Err(self.interrupted(source))),
            }
        }
    }
}

#[cfg(test)]
#[path = "feed_tests.rs"]
mod tests;
