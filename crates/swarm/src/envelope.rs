// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signed message envelopes and the append-only message log.
//!
//! An envelope's signature is HMAC-SHA256 over a canonical `|`-joined
//! serialization of its fields, stored as lower-case hex. The log holds one
//! JSON object per line; when an append would push it past the size cap the
//! file is rotated to `<log>.old` and a fresh one is started. Readers
//! tolerate concurrent appends and skip malformed lines.

use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::Clock;
use crate::error::{Result, SwarmError};
use crate::fsio;
use crate::secret::SECRET_LEN;

/// Reserved recipient id addressing every active agent.
pub const BROADCAST_ID: &str = "all";

/// Rotate the log once it would exceed this size.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Chunk size for the bounded backward tail read.
const TAIL_CHUNK: u64 = 8 * 1024;

/// Message kinds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Info,
    Question,
    ReviewRequest,
    Blocked,
    Completed,
    Challenge,
    Ack,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Question => "QUESTION",
            Self::ReviewRequest => "REVIEW_REQUEST",
            Self::Blocked => "BLOCKED",
            Self::Completed => "COMPLETED",
            Self::Challenge => "CHALLENGE",
            Self::Ack => "ACK",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(Self::Info),
            "QUESTION" => Ok(Self::Question),
            "REVIEW_REQUEST" => Ok(Self::ReviewRequest),
            "BLOCKED" => Ok(Self::Blocked),
            "COMPLETED" => Ok(Self::Completed),
            "CHALLENGE" => Ok(Self::Challenge),
            "ACK" => Ok(Self::Ack),
            other => Err(SwarmError::validation(
                "message_type",
                other,
                "expected INFO, QUESTION, REVIEW_REQUEST, BLOCKED, COMPLETED, CHALLENGE or ACK",
            )),
        }
    }
}

/// A signed message. Field order matches the wire schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender_id: String,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    /// RFC 3339 UTC, fixed at construction so signing and verification see
    /// identical bytes.
    pub timestamp: String,
    /// 16 random bytes, lower-case hex.
    pub message_id: String,
    /// Lower-case hex HMAC-SHA256 of the canonical serialization.
    pub signature: String,
}

impl Envelope {
    /// Build an unsigned envelope with a fresh message id. Content must be
    /// sanitized and validated by the caller.
    pub fn new(
        sender_id: &str,
        recipient_id: &str,
        message_type: MessageType,
        content: &str,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            sender_id: sender_id.to_owned(),
            recipient_id: recipient_id.to_owned(),
            message_type,
            content: content.to_owned(),
            timestamp: clock.timestamp(),
            message_id: uuid::Uuid::new_v4().simple().to_string(),
            signature: String::new(),
        }
    }

    /// Canonical byte serialization covered by the signature.
    fn canonical(&self) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.sender_id,
            self.recipient_id,
            self.message_type,
            self.timestamp,
            self.message_id,
            self.content
        )
        .into_bytes()
    }

    /// Sign with the shared secret, storing lower-case hex.
    pub fn sign(mut self, secret: &[u8; SECRET_LEN]) -> Self {
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret);
        let tag = ring::hmac::sign(&key, &self.canonical());
        self.signature = hex::encode(tag.as_ref());
        self
    }

    /// Verify the stored signature. Comparison happens inside `ring` in
    /// constant time.
    pub fn verify(&self, secret: &[u8; SECRET_LEN]) -> bool {
        let Ok(tag) = hex::decode(&self.signature) else {
            return false;
        };
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret);
        ring::hmac::verify(&key, &self.canonical(), &tag).is_ok()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SwarmError::Io {
            context: "encode envelope".into(),
            detail: e.to_string(),
        })
    }
}

/// A log line paired with its verification state. `trusted` is `None` for
/// readers that only parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub trusted: Option<bool>,
}

/// Append-only JSONL message log with rotation.
pub struct MessageLog {
    path: PathBuf,
}

impl MessageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".old");
        PathBuf::from(name)
    }

    /// Append one envelope as a single line, rotating first when the file
    /// would outgrow the cap.
    pub fn append(&self, envelope: &Envelope) -> Result<()> {
        let mut line = envelope.to_json()?;
        line.push('\n');

        let current = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if current + line.len() as u64 > MAX_LOG_BYTES {
            std::fs::rename(&self.path, self.rotated_path())
                .map_err(|e| SwarmError::io("rotate message log", &e))?;
        }

        let mut open = std::fs::OpenOptions::new();
        open.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            open.mode(fsio::FILE_MODE);
        }
        let mut file =
            open.open(&self.path).map_err(|e| SwarmError::io("open message log", &e))?;
        file.write_all(line.as_bytes()).map_err(|e| SwarmError::io("append message log", &e))
    }

    /// Read the last `count` well-formed entries without verification.
    pub fn tail(&self, count: usize) -> Result<Vec<LogEntry>> {
        Ok(self
            .tail_lines(count)?
            .into_iter()
            .map(|envelope| LogEntry { envelope, trusted: None })
            .collect())
    }

    /// Read the last `count` well-formed entries, annotating each with its
    /// signature verification result. Tampered lines are returned but marked
    /// untrusted, and logged.
    pub fn tail_verified(&self, count: usize, secret: &[u8; SECRET_LEN]) -> Result<Vec<LogEntry>> {
        Ok(self
            .tail_lines(count)?
            .into_iter()
            .map(|envelope| {
                let trusted = envelope.verify(secret);
                if !trusted {
                    warn!(message_id = %envelope.message_id, "message failed verification");
                }
                LogEntry { envelope, trusted: Some(trusted) }
            })
            .collect())
    }

    /// Bounded backward read: walk chunks from the end of the file until
    /// enough complete lines are gathered. Malformed lines are skipped.
    fn tail_lines(&self, count: usize) -> Result<Vec<Envelope>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SwarmError::io("open message log", &e)),
        };
        let len = file
            .metadata()
            .map_err(|e| SwarmError::io("stat message log", &e))?
            .len();

        // Pull chunks from the end until the buffer holds more newlines than
        // requested lines (the extra one guards against a partial first line).
        let mut end = len;
        let mut buffer: Vec<u8> = Vec::new();
        while end > 0 {
            let start = end.saturating_sub(TAIL_CHUNK);
            let mut chunk = vec![0u8; (end - start) as usize];
            file.seek(SeekFrom::Start(start)).map_err(|e| SwarmError::io("seek log", &e))?;
            file.read_exact(&mut chunk).map_err(|e| SwarmError::io("read log", &e))?;
            chunk.extend_from_slice(&buffer);
            buffer = chunk;
            end = start;

            let newlines = buffer.iter().filter(|&&b| b == b'\n').count();
            if newlines > count {
                break;
            }
        }

        let text = String::from_utf8_lossy(&buffer);
        let mut complete: Vec<&str> = text.lines().collect();
        // When the read stopped mid-file, the first buffered line may be a
        // fragment of a longer one; drop it.
        if end > 0 && !complete.is_empty() {
            complete.remove(0);
        }

        let mut selected: Vec<&str> = complete
            .into_iter()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .take(count)
            .collect();
        selected.reverse();

        Ok(selected.iter().filter_map(|line| serde_json::from_str(line).ok()).collect())
    }

    /// Incremental reader handle positioned at the current end of the log.
    pub fn cursor(&self) -> LogCursor {
        let (identity, offset) = match std::fs::metadata(&self.path) {
            Ok(meta) => (file_identity(&meta), meta.len()),
            Err(_) => (None, 0),
        };
        LogCursor { path: self.path.clone(), identity, offset }
    }
}

/// Tracks a byte offset into the log, detecting rotation by file identity
/// and truncation by shrinkage, re-reading from the start of the new file.
pub struct LogCursor {
    path: PathBuf,
    identity: Option<(u64, u64)>,
    offset: u64,
}

impl LogCursor {
    /// Envelopes appended since the last call.
    pub fn read_new(&mut self) -> Vec<Envelope> {
        let mut file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(_) => return Vec::new(),
        };
        let Ok(meta) = file.metadata() else {
            return Vec::new();
        };

        let identity = file_identity(&meta);
        if identity != self.identity || meta.len() < self.offset {
            // Rotated or truncated: start over on the new file.
            self.identity = identity;
            self.offset = 0;
        }

        if file.seek(SeekFrom::Start(self.offset)).is_err() {
            return Vec::new();
        }
        let mut text = String::new();
        if file.read_to_string(&mut text).is_err() {
            return Vec::new();
        }

        let mut consumed = 0usize;
        let mut envelopes = Vec::new();
        for line in text.split_inclusive('\n') {
            if !line.ends_with('\n') {
                break; // partial trailing line, re-read next time
            }
            consumed += line.len();
            if let Ok(envelope) = serde_json::from_str::<Envelope>(line.trim_end()) {
                envelopes.push(envelope);
            }
        }
        self.offset += consumed as u64;
        envelopes
    }
}

#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    None
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
