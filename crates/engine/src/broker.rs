// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotent append and session recovery over a `LogStore`

use crate::feed::{Replay, SessionFeed};
use chorus_core::{AppendError, Fanout, IdempotencyToken, LogStore, MessageId, SessionId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Result of a submission attempt as seen by the submitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The submission is durably recorded, by this call or an earlier one
    Acked,
    /// Nothing is known to be recorded; the client should retry with the
    /// same token
    Unacknowledged,
}

impl Outcome {
    pub fn is_acked(self) -> bool {
        self == Outcome::Acked
    }
}

/// Orders, persists and distributes messages
pub struct Broker<S> {
    store: Arc<S>,
    fanout: Fanout,
    /// Held across append and publish so broadcast order matches id order.
    /// Token uniqueness and id assignment are still the store's job.
    commit: Mutex<()>,
}

impl<S: LogStore> Broker<S> {
    pub fn new(store: Arc<S>, fanout: Fanout) -> Self {
        Self {
            store,
            fanout,
            commit: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn fanout(&self) -> &Fanout {
        &self.fanout
    }

    /// Subscribe a session to live records.
    ///
    /// Must happen before `replay` so nothing committed in between is missed.
    /// A `last_seen` past the end of the log is stale client state; the feed
    /// starts at the log's last id instead so new records still get through.
    pub fn attach(&self, session_id: SessionId, last_seen: MessageId) -> SessionFeed {
        // Read before subscribing: anything committed after this read has a
        // higher id and reaches the feed by replay or live.
        let last_id = self.store.last_id();
        let live = self.fanout.subscribe(session_id.clone());
        let start = last_seen.min(last_id);
        if start < last_seen {
            debug!(%session_id, %last_seen, %last_id, "last seen id is beyond the log");
        }
        info!(%session_id, %start, "session attached");
        SessionFeed::new(session_id, live, start)
    }

    /// Replay every logged record after the feed's delivered id to this
    /// session only
    pub fn replay<'f>(&self, feed: &'f mut SessionFeed) -> Replay<'f> {
        let scan = self.store.scan_after(feed.delivered());
        feed.replay(scan)
    }

    /// Stop live delivery to a session
    pub fn detach(&self, feed: SessionFeed) {
        self.fanout.unsubscribe(feed.session_id());
        debug!(session_id = %feed.session_id(), delivered = %feed.delivered(), "session detached");
    }
}

impl<S: LogStore + 'static> Broker<S> {
    /// Accept a submission, possibly a retry of an earlier one.
    ///
    /// A new record is broadcast before this returns. Duplicates are acked
    /// without a broadcast. Storage failures are absorbed here and reported
    /// only as `Unacknowledged`.
    ///
    /// Not cancel safe: a dropped future can leave a committed record that
    /// was never broadcast. Sessions still get it on their next replay.
    pub async fn submit(&self, token: &IdempotencyToken, content: &str) -> Outcome {
        let _commit = self.commit.lock().await;

        // The append fsyncs; keep it off the async worker threads
        let store = Arc::clone(&self.store);
        let (owned_token, owned_content) = (token.clone(), content.to_string());
        let appended =
            tokio::task::spawn_blocking(move || store.append(&owned_token, &owned_content)).await;

        match appended {
            Ok(Ok(record)) => {
                let sessions = self.fanout.publish(&record);
                debug!(id = %record.id, %token, sessions, "message committed");
                Outcome::Acked
            }
            Ok(Err(AppendError::DuplicateToken(_))) => {
                debug!(%token, "duplicate submission acknowledged");
                Outcome::Acked
            }
            Ok(Err(e)) => {
                warn!(%token, error = %e, "append failed, leaving submission unacknowledged");
                Outcome::Unacknowledged
            }
            Err(e) => {
                error!(%token, error = %e, "append task failed, leaving submission unacknowledged");
                Outcome::Unacknowledged
            }
        }
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
