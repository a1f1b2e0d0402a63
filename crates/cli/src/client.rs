// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use chorus_core::{IdempotencyToken, MessageId, SessionId};
use chorus_daemon::protocol::{self, ProtocolError, DEFAULT_MAX_FRAME_BYTES};
use chorus_daemon::{ClientFrame, ServerFrame};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

// Timeout configuration (env vars in milliseconds)
fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for a single request/reply exchange (connect, hello, ack, status)
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("CHORUS_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Pause between reconnect or resubmit attempts
pub fn poll_interval() -> Duration {
    parse_duration_ms("CHORUS_POLL_INTERVAL_MS").unwrap_or(Duration::from_millis(250))
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Daemon error: {0}")]
    Rejected(String),

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("Not acknowledged within {timeout:?}; retry with --token {token}")]
    NotAcknowledged {
        token: IdempotencyToken,
        timeout: Duration,
    },
}

/// Daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    pub uptime_secs: u64,
    pub sessions: usize,
    pub last_id: MessageId,
}

/// An open connection past the Hello/Welcome exchange
pub struct Connection {
    stream: TcpStream,
    session_id: SessionId,
    resumed: bool,
    position: MessageId,
}

impl Connection {
    /// Connect and send `hello`, waiting for the daemon's Welcome
    pub async fn open(addr: SocketAddr, hello: &ClientFrame) -> Result<Self, ClientError> {
        let timeout = timeout_ipc();

        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::Timeout)?
            .map_err(|source| ClientError::Connect { addr, source })?;

        protocol::write_frame(&mut stream, hello).await?;
        let welcome =
            protocol::read_frame_timeout(&mut stream, DEFAULT_MAX_FRAME_BYTES, timeout).await?;

        match welcome {
            ServerFrame::Welcome {
                session_id,
                resumed,
                position,
            } => Ok(Self {
                stream,
                session_id,
                resumed,
                position,
            }),
            ServerFrame::Error { message } => Err(ClientError::Rejected(message)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn resumed(&self) -> bool {
        self.resumed
    }

    /// Id the daemon continues delivery after
    pub fn position(&self) -> MessageId {
        self.position
    }

    pub async fn send(&mut self, frame: &ClientFrame) -> Result<(), ClientError> {
        protocol::write_frame(&mut self.stream, frame).await?;
        Ok(())
    }

    /// Wait indefinitely for the next frame
    pub async fn recv(&mut self) -> Result<ServerFrame, ClientError> {
        Ok(protocol::read_frame(&mut self.stream, DEFAULT_MAX_FRAME_BYTES).await?)
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<ServerFrame, ClientError> {
        Ok(protocol::read_frame_timeout(&mut self.stream, DEFAULT_MAX_FRAME_BYTES, timeout).await?)
    }

    /// Next broadcast record, ignoring other frames
    pub async fn next_record(&mut self) -> Result<(MessageId, String), ClientError> {
        loop {
            match self.recv().await? {
                ServerFrame::Message { id, content } => return Ok((id, content)),
                ServerFrame::Error { message } => return Err(ClientError::Rejected(message)),
                other => debug!(?other, "ignoring frame"),
            }
        }
    }
}

/// Submit one message, retrying with the same token until it is acked.
///
/// The daemon stays silent when it could not record a submission, so every
/// attempt that sees no ack in time is repeated on a fresh connection. The
/// daemon's duplicate detection makes repeats safe.
pub async fn submit(
    addr: SocketAddr,
    token: &IdempotencyToken,
    content: &str,
    timeout: Duration,
) -> Result<(), ClientError> {
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ClientError::NotAcknowledged {
                token: token.clone(),
                timeout,
            });
        }

        match submit_once(addr, token, content, remaining.min(timeout_ipc())).await {
            Ok(()) => return Ok(()),
            Err(e) => debug!(attempt, %token, error = %e, "submission not acknowledged"),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(poll_interval().min(remaining)).await;
    }
}

async fn submit_once(
    addr: SocketAddr,
    token: &IdempotencyToken,
    content: &str,
    timeout: Duration,
) -> Result<(), ClientError> {
    let mut conn = Connection::open(addr, &ClientFrame::unsubscribed()).await?;
    conn.send(&ClientFrame::Submit {
        token: token.clone(),
        content: content.to_string(),
    })
    .await?;

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match conn.recv_timeout(remaining).await? {
            ServerFrame::Ack { token: acked } if &acked == token => return Ok(()),
            ServerFrame::Error { message } => return Err(ClientError::Rejected(message)),
            other => debug!(?other, "ignoring frame"),
        }
    }
}

/// Query daemon status
pub async fn status(addr: SocketAddr) -> Result<DaemonStatus, ClientError> {
    let mut conn = Connection::open(addr, &ClientFrame::unsubscribed()).await?;
    conn.send(&ClientFrame::Status).await?;

    match conn.recv_timeout(timeout_ipc()).await? {
        ServerFrame::Status {
            uptime_secs,
            sessions,
            last_id,
        } => Ok(DaemonStatus {
            uptime_secs,
            sessions,
            last_id,
        }),
        ServerFrame::Error { message } => Err(ClientError::Rejected(message)),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

/// Where a watcher picks up after a disconnect
#[derive(Debug, Clone, Default)]
pub struct WatchCursor {
    pub session_id: Option<SessionId>,
    pub last_seen: Option<MessageId>,
}

impl WatchCursor {
    pub fn since(last_seen: Option<MessageId>) -> Self {
        Self {
            session_id: None,
            last_seen,
        }
    }

    pub fn hello(&self) -> ClientFrame {
        ClientFrame::watch(self.last_seen, self.session_id.clone())
    }

    /// Move back to the daemon's position when ours is past the end of its log
    pub fn rebase(&mut self, position: MessageId) {
        if self.last_seen.is_some_and(|seen| seen > position) {
            self.last_seen = Some(position);
        }
    }

    /// Record a delivered message; returns false for anything already seen
    pub fn advance(&mut self, id: MessageId) -> bool {
        if self.last_seen.is_some_and(|seen| id <= seen) {
            return false;
        }
        self.last_seen = Some(id);
        true
    }
}

/// Stream records to `on_record` until it returns false, reconnecting (and
/// resuming where possible) whenever the connection drops.
pub async fn watch(
    addr: SocketAddr,
    cursor: &mut WatchCursor,
    mut on_record: impl FnMut(MessageId, &str) -> bool,
) -> Result<(), ClientError> {
    loop {
        match Connection::open(addr, &cursor.hello()).await {
            Ok(mut conn) => {
                debug!(session_id = %conn.session_id(), resumed = conn.resumed(), "watching");
                cursor.session_id = Some(conn.session_id().clone());
                cursor.rebase(conn.position());

                loop {
                    match conn.next_record().await {
                        Ok((id, content)) => {
                            if !cursor.advance(id) {
                                continue;
                            }
                            if !on_record(id, &content) {
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "watch connection lost");
                            break;
                        }
                    }
                }
            }
            Err(e @ (ClientError::Rejected(_) | ClientError::UnexpectedResponse)) => return Err(e),
            Err(e) => debug!(error = %e, "daemon unreachable, retrying"),
        }

        tokio::time::sleep(poll_interval()).await;
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
