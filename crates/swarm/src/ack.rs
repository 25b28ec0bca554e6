// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Acknowledgement tracking for messages that demand confirmation.
//!
//! Each ACK-requiring send registers a pending entry. The tracker task tails
//! the message log for ACK-typed messages referencing an outstanding id,
//! retries unanswered messages on an interval, and escalates to a broadcast
//! once retries are exhausted. The pending table is flushed to disk on
//! shutdown so a restarted process resumes where it left off.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::envelope::{Envelope, LogCursor, MessageLog, MessageType};
use crate::error::{Result, SwarmError};
use crate::fsio;
use crate::messaging::Messenger;

/// Retry and escalation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckConfig {
    pub retry_interval: Duration,
    pub max_retries: u32,
}

impl Default for AckConfig {
    fn default() -> Self {
        Self { retry_interval: Duration::from_secs(30), max_retries: 3 }
    }
}

/// One outstanding confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAck {
    /// Id of the original envelope; what an ACK must reference.
    pub message_id: String,
    /// Ids of redelivered copies; an ACK referencing any of them counts.
    #[serde(default)]
    pub aliases: Vec<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub message_type: MessageType,
    pub content: String,
    /// Epoch-anchored seconds from the monotonic clock.
    pub sent_at: f64,
    pub last_attempt: f64,
    pub retries_left: u32,
}

/// Tracker over the pending table. One long-lived task per process.
pub struct AckTracker {
    messenger: Arc<Messenger>,
    log: Arc<MessageLog>,
    clock: Arc<dyn Clock>,
    config: AckConfig,
    store_path: PathBuf,
    pending: Mutex<HashMap<String, PendingAck>>,
}

impl AckTracker {
    pub fn new(
        messenger: Arc<Messenger>,
        log: Arc<MessageLog>,
        clock: Arc<dyn Clock>,
        config: AckConfig,
        store_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            messenger,
            log,
            clock,
            config,
            store_path: store_path.into(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register an envelope awaiting confirmation.
    pub fn track(&self, envelope: &Envelope) {
        let now = self.clock.monotonic().as_secs_f64();
        let entry = PendingAck {
            message_id: envelope.message_id.clone(),
            aliases: Vec::new(),
            sender_id: envelope.sender_id.clone(),
            recipient_id: envelope.recipient_id.clone(),
            message_type: envelope.message_type,
            content: envelope.content.clone(),
            sent_at: now,
            last_attempt: now,
            retries_left: self.config.max_retries,
        };
        self.pending.lock().insert(entry.message_id.clone(), entry);
        self.persist();
    }

    /// Outstanding message ids, oldest first.
    pub fn pending_ids(&self) -> Vec<String> {
        let pending = self.pending.lock();
        let mut entries: Vec<(&String, f64)> =
            pending.iter().map(|(id, e)| (id, e.sent_at)).collect();
        entries.sort_by(|a, b| a.1.total_cmp(&b.1));
        entries.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Reload the pending table persisted by a previous run.
    pub fn resume(&self) {
        let bytes = match std::fs::read(&self.store_path) {
            Ok(bytes) => bytes,
            Err(_) => return,
        };
        match serde_json::from_slice::<Vec<PendingAck>>(&bytes) {
            Ok(entries) => {
                let mut pending = self.pending.lock();
                for entry in entries {
                    pending.entry(entry.message_id.clone()).or_insert(entry);
                }
                info!(count = pending.len(), "resumed pending acknowledgements");
            }
            Err(e) => warn!(err = %e, "ignoring malformed pending-ack store"),
        }
    }

    /// Run the tracker until `shutdown` fires, then flush the table.
    pub async fn run(
        self: Arc<Self>,
        mut track_rx: mpsc::UnboundedReceiver<Envelope>,
        shutdown: CancellationToken,
    ) {
        self.resume();
        let mut cursor = self.log.cursor();
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                envelope = track_rx.recv() => {
                    match envelope {
                        Some(envelope) => self.track(&envelope),
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    self.poll_once(&mut cursor).await;
                }
            }
        }
        self.persist();
        debug!("acknowledgement tracker drained");
    }

    /// One scheduling pass: absorb new ACKs, retry due entries, escalate
    /// exhausted ones.
    pub async fn poll_once(&self, cursor: &mut LogCursor) {
        for envelope in cursor.read_new() {
            if envelope.message_type == MessageType::Ack {
                self.resolve(&envelope);
            }
        }

        let due = self.due_entries();
        for entry in due {
            if entry.retries_left > 0 {
                self.retry(entry).await;
            } else {
                self.escalate(entry).await;
            }
        }
    }

    /// Remove any pending entry this ACK references.
    fn resolve(&self, ack: &Envelope) {
        let mut pending = self.pending.lock();
        let resolved: Vec<String> = pending
            .values()
            .filter(|entry| {
                ack.content.contains(&entry.message_id)
                    || entry.aliases.iter().any(|alias| ack.content.contains(alias))
            })
            .map(|entry| entry.message_id.clone())
            .collect();
        for id in &resolved {
            pending.remove(id);
            debug!(message_id = %id, from = %ack.sender_id, "acknowledged");
        }
        drop(pending);
        if !resolved.is_empty() {
            self.persist();
        }
    }

    fn due_entries(&self) -> Vec<PendingAck> {
        let now = self.clock.monotonic().as_secs_f64();
        let horizon = self.config.retry_interval.as_secs_f64();
        self.pending
            .lock()
            .values()
            .filter(|entry| now - entry.last_attempt >= horizon)
            .cloned()
            .collect()
    }

    async fn retry(&self, entry: PendingAck) {
        debug!(
            message_id = %entry.message_id,
            recipient = %entry.recipient_id,
            retries_left = entry.retries_left,
            "retrying unacknowledged message"
        );
        let resend = self
            .messenger
            .send(
                &entry.sender_id,
                &entry.recipient_id,
                entry.message_type,
                &entry.content,
                false,
            )
            .await;

        let mut pending = self.pending.lock();
        let Some(current) = pending.get_mut(&entry.message_id) else {
            return; // acknowledged while we were resending
        };
        current.last_attempt = self.clock.monotonic().as_secs_f64();
        current.retries_left = current.retries_left.saturating_sub(1);
        match resend {
            Ok(report) => current.aliases.push(report.message_id),
            Err(err) => {
                warn!(message_id = %entry.message_id, err = %err, "retry delivery failed")
            }
        }
        drop(pending);
        self.persist();
    }

    async fn escalate(&self, entry: PendingAck) {
        let notice = format!(
            "URGENT: {} has not acknowledged message {} from {}: {}",
            entry.recipient_id, entry.message_id, entry.sender_id, entry.content
        );
        match self.messenger.broadcast(&entry.sender_id, MessageType::Info, &notice, false).await {
            Ok(results) => {
                info!(
                    message_id = %entry.message_id,
                    recipients = results.len(),
                    "escalated unacknowledged message"
                );
            }
            Err(SwarmError::RateLimitExceeded { retry_after_secs, .. }) => {
                // Keep the entry; the next due pass escalates again.
                warn!(
                    message_id = %entry.message_id,
                    retry_after_secs,
                    "escalation rate limited, will retry"
                );
                if let Some(current) = self.pending.lock().get_mut(&entry.message_id) {
                    current.last_attempt = self.clock.monotonic().as_secs_f64();
                }
                self.persist();
                return;
            }
            Err(err) => {
                warn!(message_id = %entry.message_id, err = %err, "escalation failed");
            }
        }
        self.pending.lock().remove(&entry.message_id);
        self.persist();
    }

    /// Flush the pending table. Best-effort: a failed flush is logged, not
    /// fatal.
    fn persist(&self) {
        let entries: Vec<PendingAck> = self.pending.lock().values().cloned().collect();
        let result: Result<()> = (|| {
            let json = serde_json::to_vec_pretty(&entries).map_err(|e| SwarmError::Io {
                context: "encode pending acks".into(),
                detail: e.to_string(),
            })?;
            fsio::write_atomic(&self.store_path, &json, fsio::FILE_MODE)
                .map_err(|e| SwarmError::io("write pending acks", &e))
        })();
        if let Err(err) = result {
            warn!(err = %err, "failed to persist pending acknowledgements");
        }
    }
}

#[cfg(test)]
#[path = "ack_tests.rs"]
mod tests;
