// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messaging subcommands: `send-message`, `broadcast-message`,
//! `check-messages`, and the pane-side `agent-notify` receiver.

use clap::Args;

use crate::coordinator::Coordinator;
use crate::envelope::{Envelope, MessageType};
use crate::error::{Result, SwarmError};

use super::print_json;

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Sending agent id.
    pub sender: String,
    /// Recipient agent id.
    pub recipient: String,
    /// INFO, QUESTION, REVIEW_REQUEST, BLOCKED, COMPLETED, CHALLENGE or ACK.
    pub message_type: MessageType,
    /// Message body.
    pub content: String,
    /// Track the message and retry until acknowledged.
    #[arg(long)]
    pub require_ack: bool,
    /// Machine-readable output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct BroadcastArgs {
    /// Sending agent id.
    pub sender: String,
    /// Message type.
    pub message_type: MessageType,
    /// Message body.
    pub content: String,
    /// Print one line per recipient.
    #[arg(long)]
    pub verbose: bool,
    /// Deliver to the sender's own pane too.
    #[arg(long)]
    pub include_self: bool,
    /// Machine-readable output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Number of recent messages to show.
    #[arg(long, default_value = "20")]
    pub limit: usize,
    /// Machine-readable output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct NotifyArgs {
    /// Signed envelope JSON, as typed by the sender's messaging service.
    pub payload: String,
}

pub async fn send(coordinator: &Coordinator, args: SendArgs) -> Result<i32> {
    let report = coordinator
        .messenger
        .send(
            &args.sender,
            &args.recipient,
            args.message_type,
            &args.content,
            args.require_ack,
        )
        .await?;
    coordinator.flush_pending_acks();

    if args.json {
        print_json(&report)?;
    } else {
        println!("delivered {} to {} ({})", report.message_id, report.recipient_id, report.pane_id);
    }
    Ok(0)
}

pub async fn broadcast(coordinator: &Coordinator, args: BroadcastArgs) -> Result<i32> {
    let results = coordinator
        .messenger
        .broadcast(&args.sender, args.message_type, &args.content, args.include_self)
        .await?;

    if args.json {
        print_json(&results)?;
        return Ok(i32::from(results.values().any(|entry| !entry.success)));
    }

    let delivered = results.values().filter(|entry| entry.success).count();
    println!("broadcast reached {delivered}/{} agents", results.len());
    if args.verbose {
        for (recipient, entry) in &results {
            match &entry.reason {
                None => println!("  {recipient}: ok"),
                Some(reason) => println!("  {recipient}: {reason}"),
            }
        }
    }
    Ok(i32::from(results.values().any(|entry| !entry.success)))
}

pub fn check(coordinator: &Coordinator, args: CheckArgs) -> Result<i32> {
    let secret = coordinator.secret.secret()?;
    let entries = coordinator.log.tail_verified(args.limit, &secret)?;

    if args.json {
        print_json(&entries)?;
        return Ok(0);
    }
    if entries.is_empty() {
        println!("no messages");
        return Ok(0);
    }
    for entry in entries {
        let envelope = &entry.envelope;
        let marker = match entry.trusted {
            Some(true) => "",
            Some(false) => "  [UNVERIFIED]",
            None => "",
        };
        println!(
            "{} [{}] {} -> {}: {}{marker}",
            envelope.timestamp,
            envelope.message_type,
            envelope.sender_id,
            envelope.recipient_id,
            envelope.content,
        );
    }
    Ok(0)
}

/// Pane-side receiver. The messaging service types
/// `swarm agent-notify '<envelope json>'` into the recipient's shell; this
/// decodes, verifies, and displays it.
pub fn notify(coordinator: &Coordinator, args: NotifyArgs) -> Result<i32> {
    let envelope: Envelope = serde_json::from_str(&args.payload).map_err(|e| {
        SwarmError::validation("payload", "<json>", format!("not an envelope: {e}"))
    })?;

    let secret = coordinator.secret.secret()?;
    if !envelope.verify(&secret) {
        return Err(SwarmError::SignatureInvalid { message_id: envelope.message_id });
    }

    println!(
        "[{}] message from {} (id {}):",
        envelope.message_type, envelope.sender_id, envelope.message_id
    );
    println!("{}", envelope.content);
    if envelope.message_type != MessageType::Ack {
        println!(
            "reply with: swarm send-message {} {} ACK 'ref:{}'",
            envelope.recipient_id, envelope.sender_id, envelope.message_id
        );
    }
    Ok(0)
}
