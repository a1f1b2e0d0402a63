// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP server and connection handling.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chorus_core::{LogStore, MessageId, MessageRecord, SessionId};
use chorus_engine::{Broker, SessionFeed};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::protocol::{self, ClientFrame, ProtocolError, ServerFrame, DEFAULT_TIMEOUT};
use crate::sessions::{Reattach, SessionRegistry};

/// How often parked sessions are checked for expiry
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Shared state for every connection
pub struct ServerContext<S> {
    pub broker: Broker<S>,
    sessions: Mutex<SessionRegistry>,
    start_time: Instant,
    max_frame_bytes: usize,
}

impl<S: LogStore> ServerContext<S> {
    pub fn new(broker: Broker<S>, resume_window: Duration, max_frame_bytes: usize) -> Self {
        Self {
            broker,
            sessions: Mutex::new(SessionRegistry::new(resume_window)),
            start_time: Instant::now(),
            max_frame_bytes,
        }
    }

    /// Number of sessions waiting to be resumed
    pub fn parked_sessions(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Detach parked sessions whose resume window has passed
    pub fn sweep_sessions(&self) {
        let expired = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.sweep(Instant::now())
        };
        for feed in expired {
            debug!(session_id = %feed.session_id(), "parked session expired");
            self.broker.detach(feed);
        }
    }

    /// Resume a parked session if the hello allows it, otherwise attach a
    /// new one. Returns the feed and whether it was resumed.
    fn open_session(
        &self,
        last_seen: Option<MessageId>,
        session_id: Option<SessionId>,
    ) -> (SessionFeed, bool) {
        if let Some(id) = session_id {
            let outcome = {
                let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
                sessions.reattach(&id, last_seen, self.broker.fanout(), Instant::now())
            };
            match outcome {
                Reattach::Resumed(feed) => {
                    info!(session_id = %id, delivered = %feed.delivered(), "session resumed");
                    return (feed, true);
                }
                Reattach::Stale(feed) => {
                    debug!(session_id = %id, "parked session not resumable");
                    self.broker.detach(feed);
                }
                Reattach::Unknown => {
                    debug!(session_id = %id, "no parked session to resume");
                }
            }
        }

        let feed = self
            .broker
            .attach(SessionId::generate(), last_seen.unwrap_or(MessageId::ZERO));
        (feed, false)
    }

    fn park(&self, feed: SessionFeed) {
        debug!(session_id = %feed.session_id(), delivered = %feed.delivered(), "session parked");
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.park(feed, Instant::now());
    }
}

/// Why a connected session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The connection went away; the session may be resumed
    Disconnected,
    /// Fan-out dropped the session for falling behind
    Lagged,
    /// The replay scan failed part way
    ReplayFailed,
    /// The client sent something malformed
    ProtocolViolation,
}

/// Accept connections until the listener fails permanently.
///
/// Each connection runs on its own task. Parked sessions are swept on a
/// fixed interval.
pub async fn serve<S: LogStore + 'static>(listener: &TcpListener, context: Arc<ServerContext<S>>) {
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!(%peer, "client connected");
                        let context = Arc::clone(&context);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, context).await {
                                warn!(%peer, error = %e, "connection failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }

            _ = sweep.tick() => context.sweep_sessions(),
        }
    }
}

/// Run one client connection from hello to close
pub async fn handle_connection<S: LogStore + 'static>(
    stream: TcpStream,
    context: Arc<ServerContext<S>>,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let hello = protocol::read_frame_timeout::<_, ClientFrame>(
        &mut reader,
        context.max_frame_bytes,
        DEFAULT_TIMEOUT,
    )
    .await;

    let (last_seen_id, session_id) = match hello {
        Ok(ClientFrame::Hello {
            subscribe: false, ..
        }) => {
            run_unsubscribed(&context, reader, &mut writer).await;
            return Ok(());
        }
        Ok(ClientFrame::Hello {
            last_seen_id,
            session_id,
            subscribe: true,
        }) => (last_seen_id, session_id),
        Ok(_) => {
            let reply = ServerFrame::Error {
                message: "expected Hello".to_string(),
            };
            let _ = protocol::write_frame(&mut writer, &reply).await;
            return Err(ServerError::MissingHello);
        }
        Err(ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before hello");
            return Ok(());
        }
        Err(ProtocolError::Timeout) => return Err(ServerError::Timeout),
        Err(e) => return Err(e.into()),
    };

    let (mut feed, resumed) = context.open_session(last_seen_id, session_id);

    // Frames are read on their own task: a partially read frame must not be
    // lost when the select below picks a live record instead.
    let (inbound_tx, inbound) = mpsc::channel(16);
    let max_frame_bytes = context.max_frame_bytes;
    let reader_task = tokio::spawn(async move {
        loop {
            let frame = protocol::read_frame::<_, ClientFrame>(&mut reader, max_frame_bytes).await;
            let stop = frame.is_err();
            if inbound_tx.send(frame).await.is_err() || stop {
                break;
            }
        }
    });

    let end = run_session(&context, &mut feed, resumed, inbound, &mut writer).await;
    reader_task.abort();

    debug!(session_id = %feed.session_id(), ?end, "session ended");
    match end {
        SessionEnd::Disconnected => context.park(feed),
        SessionEnd::Lagged | SessionEnd::ReplayFailed | SessionEnd::ProtocolViolation => {
            context.broker.detach(feed)
        }
    }
    Ok(())
}

async fn run_session<S: LogStore + 'static>(
    context: &ServerContext<S>,
    feed: &mut SessionFeed,
    resumed: bool,
    mut inbound: mpsc::Receiver<Result<ClientFrame, ProtocolError>>,
    writer: &mut OwnedWriteHalf,
) -> SessionEnd {
    let welcome = ServerFrame::Welcome {
        session_id: feed.session_id().clone(),
        resumed,
        position: feed.delivered(),
    };
    if protocol::write_frame(writer, &welcome).await.is_err() {
        return SessionEnd::Disconnected;
    }

    if !resumed {
        if let Err(end) = replay(context, feed, writer).await {
            return end;
        }
    }

    loop {
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(Ok(frame)) => {
                    if let Err(end) = handle_frame(context, frame, writer).await {
                        return end;
                    }
                }
                Some(Err(e)) if e.is_violation() => {
                    warn!(session_id = %feed.session_id(), error = %e, "protocol violation");
                    let reply = ServerFrame::Error { message: e.to_string() };
                    let _ = protocol::write_frame(writer, &reply).await;
                    return SessionEnd::ProtocolViolation;
                }
                Some(Err(_)) | None => return SessionEnd::Disconnected,
            },

            record = feed.next_live() => match record {
                Some(record) => {
                    if send_record(writer, record).await.is_err() {
                        return SessionEnd::Disconnected;
                    }
                }
                None => {
                    info!(session_id = %feed.session_id(), "session dropped by fan-out, closing");
                    return SessionEnd::Lagged;
                }
            },
        }
    }
}

/// Serve a connection that only submits and queries
async fn run_unsubscribed<S: LogStore + 'static>(
    context: &ServerContext<S>,
    mut reader: OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
) {
    let welcome = ServerFrame::Welcome {
        session_id: SessionId::generate(),
        resumed: false,
        position: context.broker.store().last_id(),
    };
    if protocol::write_frame(writer, &welcome).await.is_err() {
        return;
    }

    loop {
        match protocol::read_frame::<_, ClientFrame>(&mut reader, context.max_frame_bytes).await {
            Ok(frame) => {
                if handle_frame(context, frame, writer).await.is_err() {
                    return;
                }
            }
            Err(e) if e.is_violation() => {
                warn!(error = %e, "protocol violation");
                let reply = ServerFrame::Error { message: e.to_string() };
                let _ = protocol::write_frame(writer, &reply).await;
                return;
            }
            Err(_) => return,
        }
    }
}

/// Send every logged record the session has not yet seen
async fn replay<S: LogStore>(
    context: &ServerContext<S>,
    feed: &mut SessionFeed,
    writer: &mut OwnedWriteHalf,
) -> Result<(), SessionEnd> {
    let session_id = feed.session_id().clone();
    let mut replayed = 0usize;

    // Scan reads are blocking file I/O, one record per step, interleaved
    // with the async writes below
    for item in context.broker.replay(feed) {
        match item {
            Ok(record) => {
                send_record(writer, record)
                    .await
                    .map_err(|_| SessionEnd::Disconnected)?;
                replayed += 1;
            }
            Err(e) => {
                warn!(%session_id, error = %e, "replay failed, closing session");
                return Err(SessionEnd::ReplayFailed);
            }
        }
    }

    debug!(%session_id, replayed, "replay complete");
    Ok(())
}

async fn handle_frame<S: LogStore + 'static>(
    context: &ServerContext<S>,
    frame: ClientFrame,
    writer: &mut OwnedWriteHalf,
) -> Result<(), SessionEnd> {
    let reply = match frame {
        ClientFrame::Submit { token, content } => {
            let outcome = context.broker.submit(&token, &content).await;
            // Silence tells the client to retry with the same token
            if !outcome.is_acked() {
                return Ok(());
            }
            ServerFrame::Ack { token }
        }

        ClientFrame::Ping => ServerFrame::Pong,

        ClientFrame::Status => ServerFrame::Status {
            uptime_secs: context.start_time.elapsed().as_secs(),
            sessions: context.broker.fanout().session_count(),
            last_id: context.broker.store().last_id(),
        },

        ClientFrame::Hello { .. } => ServerFrame::Error {
            message: "session already open".to_string(),
        },
    };

    protocol::write_frame(writer, &reply)
        .await
        .map_err(|_| SessionEnd::Disconnected)
}

async fn send_record(
    writer: &mut OwnedWriteHalf,
    record: MessageRecord,
) -> Result<(), ProtocolError> {
    let frame = ServerFrame::Message {
        id: record.id,
        content: record.content,
    };
    protocol::write_frame(writer, &frame).await
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Hello timeout")]
    Timeout,

    #[error("First frame was not Hello")]
    MissingHello,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
