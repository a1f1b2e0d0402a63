// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry for live broadcast

use crate::id::SessionId;
use crate::message::MessageRecord;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Sender half of a session's live buffer
pub type RecordSender = mpsc::Sender<MessageRecord>;
/// Receiver half of a session's live buffer
pub type RecordReceiver = mpsc::Receiver<MessageRecord>;

/// Records buffered per session before it counts as lagging
pub const DEFAULT_SESSION_BUFFER: usize = 1024;

/// Routes committed records to every live session.
///
/// Delivery is fire-and-forget. A session whose buffer is full or whose
/// receiver is gone is dropped from the registry; its receiver then observes
/// channel closure and the session must recover through replay.
pub struct Fanout {
    sessions: Arc<RwLock<HashMap<SessionId, RecordSender>>>,
    capacity: usize,
}

impl Fanout {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Register a session and return its live buffer.
    ///
    /// Re-subscribing an id replaces the previous channel, which closes the
    /// old receiver.
    pub fn subscribe(&self, id: SessionId) -> RecordReceiver {
        let (tx, rx) = mpsc::channel(self.capacity);

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(id, tx);

        rx
    }

    /// Remove a session
    pub fn unsubscribe(&self, id: &SessionId) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(id);
    }

    pub fn is_subscribed(&self, id: &SessionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Deliver a record to every registered session, including the submitter.
    ///
    /// Returns the number of sessions the record was queued for.
    pub fn publish(&self, record: &MessageRecord) -> usize {
        let mut delivered = 0;
        let mut dropped = Vec::new();

        {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            for (id, tx) in sessions.iter() {
                match tx.try_send(record.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(session_id = %id, id = %record.id, "session lagging, dropping");
                        dropped.push((id.clone(), tx.clone()));
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(session_id = %id, "session receiver gone");
                        dropped.push((id.clone(), tx.clone()));
                    }
                }
            }
        }

        if !dropped.is_empty() {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            for (id, tx) in dropped {
                // Only remove the channel we saw; the id may have re-subscribed
                if sessions.get(&id).is_some_and(|cur| cur.same_channel(&tx)) {
                    sessions.remove(&id);
                }
            }
        }

        delivered
    }

    /// Count of registered sessions
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_BUFFER)
    }
}

impl Clone for Fanout {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
