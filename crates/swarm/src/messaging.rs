// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message delivery over the multiplexer.
//!
//! `send` validates everything, charges the sender's rate budget, signs the
//! envelope, types a `swarm agent-notify <payload>` invocation into the
//! recipient's pane, and appends to the log. `broadcast` fans out to every
//! active agent with bounded parallelism and charges exactly one rate-limit
//! credit. The payload argument is shell-quoted as a single literal token;
//! nothing the sender writes can break out of it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::envelope::{Envelope, MessageLog, MessageType};
use crate::error::{Result, SwarmError};
use crate::ratelimit::RateLimiter;
use crate::registry::{AgentRecord, AgentRegistry};
use crate::secret::SecretSource;
use crate::tmux::Multiplexer;
use crate::validate::{
    sanitize_message_content, validate_agent_id, validate_message_content,
    validate_recipient_list,
};

/// The well-known invocation typed into a recipient's pane. The signed
/// envelope JSON rides as its single argument.
pub const NOTIFY_COMMAND: &str = "swarm agent-notify";

/// Concurrent deliveries during a broadcast fan-out.
const BROADCAST_PARALLELISM: usize = 4;

/// Pause before the single broadcast redelivery attempt.
const REDELIVERY_PAUSE: Duration = Duration::from_millis(200);

/// Successful unicast delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub message_id: String,
    pub recipient_id: String,
    pub pane_id: String,
}

/// Per-recipient broadcast outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastEntry {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Messaging service. All dependencies are injected; there is no ambient
/// state.
pub struct Messenger {
    registry: Arc<AgentRegistry>,
    mux: Arc<dyn Multiplexer>,
    limiter: Arc<RateLimiter>,
    log: Arc<MessageLog>,
    secret: Arc<dyn SecretSource>,
    clock: Arc<dyn Clock>,
    /// Wired by the acknowledgement tracker at startup.
    ack_tx: RwLock<Option<mpsc::UnboundedSender<Envelope>>>,
}

impl Messenger {
    pub fn new(
        registry: Arc<AgentRegistry>,
        mux: Arc<dyn Multiplexer>,
        limiter: Arc<RateLimiter>,
        log: Arc<MessageLog>,
        secret: Arc<dyn SecretSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { registry, mux, limiter, log, secret, clock, ack_tx: RwLock::new(None) }
    }

    /// Route ACK-requiring envelopes to the tracker.
    pub fn set_ack_channel(&self, tx: mpsc::UnboundedSender<Envelope>) {
        *self.ack_tx.write() = Some(tx);
    }

    /// Send one message. Returns once the keystrokes are delivered and the
    /// envelope is logged.
    pub async fn send(
        &self,
        sender_id: &str,
        recipient_id: &str,
        message_type: MessageType,
        content: &str,
        require_ack: bool,
    ) -> Result<DeliveryReport> {
        validate_agent_id(sender_id)?;
        validate_agent_id(recipient_id)?;
        let content = sanitize_message_content(content);
        validate_message_content(&content)?;

        let recipient = self.active_recipient(recipient_id)?;

        if !self.limiter.check_and_record(sender_id) {
            return Err(SwarmError::RateLimitExceeded {
                sender_id: sender_id.to_owned(),
                retry_after_secs: self.limiter.seconds_until_slot(sender_id),
            });
        }

        let envelope = Envelope::new(
            sender_id,
            recipient_id,
            message_type,
            &content,
            self.clock.as_ref(),
        )
        .sign(&self.secret.secret()?);

        self.deliver(&recipient, &envelope).await?;
        self.log.append(&envelope)?;
        debug!(
            message_id = %envelope.message_id,
            recipient = %recipient_id,
            kind = %message_type,
            "message delivered"
        );

        if require_ack {
            self.register_pending_ack(&envelope);
        }

        Ok(DeliveryReport {
            message_id: envelope.message_id,
            recipient_id: recipient.id,
            pane_id: recipient.pane_id,
        })
    }

    /// Fan a message out to every active agent. One rate-limit credit is
    /// charged regardless of recipient count; each undeliverable recipient
    /// gets exactly one redelivery attempt before being reported as failed.
    pub async fn broadcast(
        &self,
        sender_id: &str,
        message_type: MessageType,
        content: &str,
        include_self: bool,
    ) -> Result<BTreeMap<String, BroadcastEntry>> {
        validate_agent_id(sender_id)?;
        let content = sanitize_message_content(content);
        validate_message_content(&content)?;

        let recipients: Vec<AgentRecord> = self
            .registry
            .list_active()
            .into_iter()
            .filter(|agent| include_self || agent.id != sender_id)
            .collect();
        if recipients.is_empty() {
            return Ok(BTreeMap::new());
        }
        let ids: Vec<String> = recipients.iter().map(|a| a.id.clone()).collect();
        validate_recipient_list(&ids)?;

        if !self.limiter.check_and_record(sender_id) {
            return Err(SwarmError::RateLimitExceeded {
                sender_id: sender_id.to_owned(),
                retry_after_secs: self.limiter.seconds_until_slot(sender_id),
            });
        }

        let secret = self.secret.secret()?;
        let results: Vec<(String, BroadcastEntry)> = futures_util::stream::iter(recipients)
            .map(|recipient| {
                let content = content.clone();
                let secret = secret;
                async move {
                    let envelope = Envelope::new(
                        sender_id,
                        &recipient.id,
                        message_type,
                        &content,
                        self.clock.as_ref(),
                    )
                    .sign(&secret);
                    let entry = self.deliver_with_retry(&recipient, &envelope).await;
                    (recipient.id, entry)
                }
            })
            .buffer_unordered(BROADCAST_PARALLELISM)
            .collect()
            .await;

        Ok(results.into_iter().collect())
    }

    fn active_recipient(&self, recipient_id: &str) -> Result<AgentRecord> {
        match self.registry.get(recipient_id) {
            Some(agent) if agent.status == crate::registry::AgentStatus::Active => Ok(agent),
            _ => Err(SwarmError::AgentNotFound {
                agent_id: recipient_id.to_owned(),
                known: self.registry.list_active().into_iter().map(|a| a.id).collect(),
            }),
        }
    }

    /// Type the notify invocation into the pane. Pane-level failures become
    /// `MessageDeliveryError`; a missing or unreachable server surfaces
    /// unchanged so callers can fail fast.
    async fn deliver(&self, recipient: &AgentRecord, envelope: &Envelope) -> Result<()> {
        let payload = envelope.to_json()?;
        let quoted = shlex::try_quote(&payload).map_err(|_| {
            SwarmError::validation("content", "<payload>", "not representable as a shell token")
        })?;
        let command = format!("{NOTIFY_COMMAND} {quoted}");

        self.mux.send_keys(&recipient.pane_id, &command).await.map_err(|err| match err {
            SwarmError::MultiplexerMissing | SwarmError::MultiplexerPermission { .. } => err,
            other => SwarmError::DeliveryFailed {
                recipient_id: recipient.id.clone(),
                detail: other.to_string(),
            },
        })
    }

    async fn deliver_with_retry(
        &self,
        recipient: &AgentRecord,
        envelope: &Envelope,
    ) -> BroadcastEntry {
        let mut last_error = match self.deliver(recipient, envelope).await {
            Ok(()) => {
                if let Err(err) = self.log.append(envelope) {
                    warn!(err = %err, "broadcast delivered but not logged");
                }
                return BroadcastEntry { success: true, reason: None };
            }
            Err(err) => err,
        };

        if matches!(last_error, SwarmError::DeliveryFailed { .. }) {
            tokio::time::sleep(REDELIVERY_PAUSE).await;
            match self.deliver(recipient, envelope).await {
                Ok(()) => {
                    if let Err(err) = self.log.append(envelope) {
                        warn!(err = %err, "broadcast delivered but not logged");
                    }
                    return BroadcastEntry { success: true, reason: None };
                }
                Err(err) => last_error = err,
            }
        }

        warn!(recipient = %recipient.id, err = %last_error, "broadcast delivery failed");
        BroadcastEntry {
            success: false,
            reason: Some(format!("delivery_failed: {last_error}")),
        }
    }

    fn register_pending_ack(&self, envelope: &Envelope) {
        match &*self.ack_tx.read() {
            Some(tx) => {
                if tx.send(envelope.clone()).is_err() {
                    warn!("acknowledgement tracker is gone; ack will not be retried");
                }
            }
            None => warn!("no acknowledgement tracker wired; ack will not be retried"),
        }
    }
}

#[cfg(test)]
#[path = "messaging_tests.rs"]
mod tests;
