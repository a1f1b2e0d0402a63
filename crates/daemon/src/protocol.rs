// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol between clients and chorusd.
//!
//! Every frame is a 4-byte big-endian length followed by a JSON object
//! tagged with `type`. A connection starts with `Hello`/`Welcome`, after
//! which both sides may send at any time.

use std::time::Duration;

use chorus_core::{IdempotencyToken, MessageId, SessionId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Time allowed for the opening `Hello`
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest frame accepted unless configured otherwise
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Frames sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Opens a session. `session_id` asks to resume a parked session;
    /// `last_seen_id` is the highest id the client has processed. Clients
    /// that only submit or query set `subscribe: false` and get neither
    /// replay nor live records.
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen_id: Option<MessageId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        #[serde(default = "default_subscribe", skip_serializing_if = "is_true")]
        subscribe: bool,
    },

    /// Submit a message. Retries must reuse the token.
    Submit {
        token: IdempotencyToken,
        content: String,
    },

    Ping,

    Status,
}

impl ClientFrame {
    /// Hello for a watching session starting after `last_seen_id`
    pub fn watch(last_seen_id: Option<MessageId>, session_id: Option<SessionId>) -> Self {
        Self::Hello {
            last_seen_id,
            session_id,
            subscribe: true,
        }
    }

    /// Hello for a connection that never receives records
    pub fn unsubscribed() -> Self {
        Self::Hello {
            last_seen_id: None,
            session_id: None,
            subscribe: false,
        }
    }
}

fn default_subscribe() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// Frames sent by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Session opened. `position` is the id delivery continues after,
    /// which is below the hello's `last_seen_id` when that was past the log.
    Welcome {
        session_id: SessionId,
        resumed: bool,
        position: MessageId,
    },

    /// One committed record, live or replayed
    Message { id: MessageId, content: String },

    /// The submission with this token is durably recorded
    Ack { token: IdempotencyToken },

    Pong,

    Status {
        uptime_secs: u64,
        sessions: usize,
        last_id: MessageId,
    },

    /// Protocol violations only; storage failures are never reported
    Error { message: String },
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,

    #[error("Frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
}

impl ProtocolError {
    /// Whether the peer sent something malformed, as opposed to going away
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Json(_) | Self::FrameTooLarge { .. })
    }
}

/// Serialize a frame to JSON (no length prefix)
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserialize a frame from JSON
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write one length-prefixed message
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = u32::try_from(data.len()).map_err(|_| ProtocolError::FrameTooLarge {
        len: data.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed message of at most `max_len` bytes
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::ConnectionClosed
        } else {
            e.into()
        }
    })?;
    Ok(buf)
}

/// Read and decode one frame
pub async fn read_frame<R: AsyncRead + Unpin, T: DeserializeOwned>(
    reader: &mut R,
    max_len: usize,
) -> Result<T, ProtocolError> {
    let bytes = read_message(reader, max_len).await?;
    decode(&bytes)
}

/// Read one frame, failing with `Timeout` if none arrives in time
pub async fn read_frame_timeout<R: AsyncRead + Unpin, T: DeserializeOwned>(
    reader: &mut R,
    max_len: usize,
    timeout: Duration,
) -> Result<T, ProtocolError> {
    tokio::time::timeout(timeout, read_frame(reader, max_len))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Encode and write one frame
pub async fn write_frame<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    frame: &T,
) -> Result<(), ProtocolError> {
    let data = encode(frame)?;
    write_message(writer, &data).await
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
