// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parked sessions awaiting resumption.
//!
//! A session whose connection drops stays subscribed to fan-out for the
//! resume window, buffering live records. Reconnecting with its id picks the
//! buffer back up without a replay scan.

use chorus_core::{Fanout, MessageId, SessionId};
use chorus_engine::SessionFeed;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Parked {
    feed: SessionFeed,
    parked_at: Instant,
}

/// Outcome of a reconnect naming a session id
pub enum Reattach {
    /// The parked feed is intact and matches the client's position
    Resumed(SessionFeed),
    /// The session was parked but cannot continue; detach it and start over
    Stale(SessionFeed),
    /// No such parked session
    Unknown,
}

pub struct SessionRegistry {
    parked: HashMap<SessionId, Parked>,
    window: Duration,
}

impl SessionRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            parked: HashMap::new(),
            window,
        }
    }

    pub fn park(&mut self, feed: SessionFeed, now: Instant) {
        let id = feed.session_id().clone();
        self.parked.insert(
            id,
            Parked {
                feed,
                parked_at: now,
            },
        );
    }

    /// Claim a parked session.
    ///
    /// Resumes only when the session is still subscribed (it has not lagged
    /// out), the window has not elapsed, and the client has seen exactly what
    /// the feed delivered.
    pub fn reattach(
        &mut self,
        id: &SessionId,
        last_seen: Option<MessageId>,
        fanout: &Fanout,
        now: Instant,
    ) -> Reattach {
        let Some(parked) = self.parked.remove(id) else {
            return Reattach::Unknown;
        };

        let expired = now.saturating_duration_since(parked.parked_at) > self.window;
        let in_step = last_seen.unwrap_or(MessageId::ZERO) == parked.feed.delivered();

        if !expired && in_step && fanout.is_subscribed(id) {
            Reattach::Resumed(parked.feed)
        } else {
            Reattach::Stale(parked.feed)
        }
    }

    /// Remove sessions parked longer than the window
    pub fn sweep(&mut self, now: Instant) -> Vec<SessionFeed> {
        let expired: Vec<SessionId> = self
            .parked
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.parked_at) > self.window)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .iter()
            .filter_map(|id| self.parked.remove(id))
            .map(|p| p.feed)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
