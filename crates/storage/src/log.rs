// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only message log
//!
//! One JSON object per line, each carrying a CRC32 over its id, token and
//! content. A line is only acknowledged after `sync_data` returns. On open,
//! a damaged final line is treated as a write torn by a crash and truncated;
//! damage anywhere else fails the open.

use crate::index::LogIndex;
use chorus_core::{
    AppendError, IdempotencyToken, LogStore, MessageId, MessageRecord, RecordScan, ScanError,
};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that can occur in log operations
#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt log at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
    #[error("log is poisoned by a failed rollback; reopen required")]
    Poisoned,
}

/// File-backed durable message log
pub struct MessageLog {
    path: PathBuf,
    inner: Mutex<LogInner>,
}

struct LogInner {
    file: File,
    index: LogIndex,
    /// Byte length of the fully committed prefix
    committed_len: u64,
    poisoned: bool,
}

impl MessageLog {
    /// Open or create a log at the given path, repairing a torn tail
    pub fn open(path: &Path) -> Result<Self, LogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        let (index, committed_len) = load_index(path)?;

        let file_len = file.metadata()?.len();
        if file_len > committed_len {
            warn!(
                path = %path.display(),
                discarded_bytes = file_len - committed_len,
                "truncating torn write at end of log"
            );
            file.set_len(committed_len)?;
            file.sync_all()?;
        }

        info!(
            path = %path.display(),
            records = index.len(),
            last_id = %index.last_id(),
            "message log opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(LogInner {
                file,
                index,
                committed_len,
                poisoned: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of committed records
    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().index.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LogStore for MessageLog {
    fn append(
        &self,
        token: &IdempotencyToken,
        content: &str,
    ) -> Result<MessageRecord, AppendError> {
        self.lock().append(token, content)
    }

    fn scan_after(&self, min_id: MessageId) -> Result<RecordScan, ScanError> {
        // Only the prefix committed at this point is read; later records
        // reach live sessions through fan-out.
        let committed_len = self.lock().committed_len;
        let file = File::open(&self.path).map_err(ScanError::unavailable)?;
        Ok(Box::new(LogScan::new(file, committed_len, min_id)))
    }

    fn last_id(&self) -> MessageId {
        self.lock().index.last_id()
    }
}

impl LogInner {
    fn append(
        &mut self,
        token: &IdempotencyToken,
        content: &str,
    ) -> Result<MessageRecord, AppendError> {
        if self.poisoned {
            return Err(AppendError::unavailable(LogError::Poisoned));
        }
        if self.index.contains(token) {
            return Err(AppendError::DuplicateToken(token.clone()));
        }

        let record = MessageRecord::new(self.index.next_id(), token.clone(), content);
        let mut line = serde_json::to_vec(&LogEntry::seal(&record))
            .map_err(|e| AppendError::unavailable(LogError::from(e)))?;
        line.push(b'\n');

        if let Err(e) = self.write_durable(&line) {
            self.rollback();
            return Err(AppendError::unavailable(e));
        }

        self.committed_len += line.len() as u64;
        self.index.apply(&record).map_err(AppendError::unavailable)?;
        Ok(record)
    }

    fn write_durable(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line)?;
        self.file.sync_data()
    }

    /// Drop any bytes past the committed prefix after a failed write
    fn rollback(&mut self) {
        let result = self
            .file
            .set_len(self.committed_len)
            .and_then(|()| self.file.sync_data());
        match result {
            Ok(()) => warn!(committed_len = self.committed_len, "rolled back failed append"),
            Err(e) => {
                error!(error = %e, "rollback failed, refusing further appends");
                self.poisoned = true;
            }
        }
    }
}

/// Rebuild the index, returning it with the length of the valid prefix
fn load_index(path: &Path) -> Result<(LogIndex, u64), LogError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut index = LogIndex::default();
    let mut valid_len = 0u64;
    let mut line_no = 0usize;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        line_no += 1;

        let decoded = match buf.strip_suffix(b"\n") {
            Some([]) => {
                valid_len += n as u64;
                continue;
            }
            Some(bytes) => decode_line(bytes),
            None => Err("missing line terminator".to_string()),
        };

        match decoded {
            Ok(record) => {
                index.apply(&record).map_err(|conflict| LogError::Corrupt {
                    line: line_no,
                    reason: conflict.to_string(),
                })?;
                valid_len += n as u64;
            }
            // Damage in the final line is a torn write
            Err(_) if reader.fill_buf()?.is_empty() => break,
            Err(reason) => {
                return Err(LogError::Corrupt {
                    line: line_no,
                    reason,
                })
            }
        }
    }

    Ok((index, valid_len))
}

/// Lazy reader over the committed prefix of a log
pub struct LogScan {
    reader: BufReader<io::Take<File>>,
    min_id: MessageId,
    buf: Vec<u8>,
    line: usize,
    done: bool,
}

impl LogScan {
    fn new(file: File, committed_len: u64, min_id: MessageId) -> Self {
        Self {
            reader: BufReader::new(file.take(committed_len)),
            min_id,
            buf: Vec::new(),
            line: 0,
            done: false,
        }
    }

    fn fail(&mut self, err: LogError) -> Option<Result<MessageRecord, ScanError>> {
        self.done = true;
        Some(Err(ScanError::unavailable(err)))
    }
}

impl Iterator for LogScan {
    type Item = Result<MessageRecord, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line += 1;
                    let bytes = self.buf.strip_suffix(b"\n").unwrap_or(self.buf.as_slice());
                    if bytes.is_empty() {
                        continue;
                    }
                    match decode_line(bytes) {
                        Ok(record) if record.id <= self.min_id => continue,
                        Ok(record) => return Some(Ok(record)),
                        Err(reason) => {
                            let line = self.line;
                            return self.fail(LogError::Corrupt { line, reason });
                        }
                    }
                }
                Err(e) => return self.fail(LogError::Io(e)),
            }
        }
        None
    }
}

/// On-disk form of a record
#[derive(Debug, Serialize, Deserialize)]
struct LogEntry {
    id: MessageId,
    token: IdempotencyToken,
    content: String,
    crc: u32,
}

impl LogEntry {
    fn seal(record: &MessageRecord) -> Self {
        Self {
            id: record.id,
            token: record.token.clone(),
            content: record.content.clone(),
            crc: checksum(record.id, &record.token, &record.content),
        }
    }

    fn open(self) -> Result<MessageRecord, String> {
        let expected = checksum(self.id, &self.token, &self.content);
        if self.crc != expected {
            return Err(format!(
                "checksum mismatch for id {}: stored {:08x}, computed {:08x}",
                self.id, self.crc, expected
            ));
        }
        Ok(MessageRecord::new(self.id, self.token, self.content))
    }
}

fn decode_line(bytes: &[u8]) -> Result<MessageRecord, String> {
    serde_json::from_slice::<LogEntry>(bytes)
        .map_err(|e| e.to_string())?
        .open()
}

fn checksum(id: MessageId, token: &IdempotencyToken, content: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&id.get().to_be_bytes());
    hasher.update(&(token.as_str().len() as u64).to_be_bytes());
    hasher.update(token.as_str().as_bytes());
    hasher.update(content.as_bytes());
    hasher.finalize()
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
