// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed error taxonomy for the coordination kernel.
//!
//! Every failure a caller can observe carries a stable category string and
//! structured fields. Secrets and raw message payloads never appear in error
//! text. Lock conflicts are deliberately *not* part of this enum: a held lock
//! is a structured return value of `acquire`, not an error.

use std::fmt;

pub type Result<T> = std::result::Result<T, SwarmError>;

/// All error categories surfaced by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwarmError {
    /// An input failed one of the validation rules. `value` is already
    /// sanitized for display.
    Validation { field: &'static str, value: String, reason: String },
    /// No multiplexer server is running.
    MultiplexerMissing,
    /// The multiplexer socket exists but refused us.
    MultiplexerPermission { detail: String },
    /// A multiplexer invocation exceeded its time budget.
    MultiplexerTimeout { budget_ms: u64 },
    /// A multiplexer invocation failed for another reason; stderr verbatim.
    MultiplexerFailure { detail: String },
    /// The recipient is not in the active registry.
    AgentNotFound { agent_id: String, known: Vec<String> },
    /// The sender exhausted its sliding-window budget.
    RateLimitExceeded { sender_id: String, retry_after_secs: u64 },
    /// A release or refresh was attempted by someone other than the holder.
    LockDenied { filepath: String, holder: String, requester: String },
    /// Filesystem failure while acquiring, refreshing, or releasing a lock.
    LockIo { filepath: String, detail: String },
    /// Delivery was attempted but not confirmed by the multiplexer.
    DeliveryFailed { recipient_id: String, detail: String },
    /// A logged message failed HMAC verification.
    SignatureInvalid { message_id: String },
    /// The shared secret is missing, unreadable, or has the wrong length.
    Secret { detail: String },
    /// Any other filesystem or serialization failure, with context.
    Io { context: String, detail: String },
}

impl SwarmError {
    /// Stable category string, used as the `<ErrorCategory>` prefix on
    /// stderr and in JSON output.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::MultiplexerMissing => "MultiplexerMissing",
            Self::MultiplexerPermission { .. } => "MultiplexerPermission",
            Self::MultiplexerTimeout { .. } => "MultiplexerTimeout",
            Self::MultiplexerFailure { .. } => "MultiplexerFailure",
            Self::AgentNotFound { .. } => "AgentNotFound",
            Self::RateLimitExceeded { .. } => "RateLimitExceeded",
            Self::LockDenied { .. } => "LockDenied",
            Self::LockIo { .. } => "LockIOError",
            Self::DeliveryFailed { .. } => "MessageDeliveryError",
            Self::SignatureInvalid { .. } => "SignatureInvalid",
            Self::Secret { .. } => "SecretError",
            Self::Io { .. } => "IOError",
        }
    }

    /// Whether a caller may reasonably retry the same operation.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Self::MultiplexerMissing
                | Self::MultiplexerTimeout { .. }
                | Self::AgentNotFound { .. }
                | Self::RateLimitExceeded { .. }
                | Self::LockIo { .. }
                | Self::DeliveryFailed { .. }
        )
    }

    /// One-line remediation hint for CLI output, where one exists.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::MultiplexerMissing => Some("start tmux and launch at least one agent pane"),
            Self::MultiplexerPermission { .. } => {
                Some("check ownership and mode of the tmux server socket")
            }
            Self::RateLimitExceeded { .. } => Some("wait for the window to slide, then resend"),
            Self::Secret { .. } => {
                Some("inspect ~/.claude-swarm/secret; remove it only if all agents restart")
            }
            _ => None,
        }
    }

    /// Build a validation error, sanitizing the offending value for display.
    pub fn validation(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut value: String = value.into();
        value.retain(|c| !c.is_control());
        if value.chars().count() > 80 {
            value = value.chars().take(77).collect();
            value.push_str("...");
        }
        Self::Validation { field, value, reason: reason.into() }
    }

    /// Wrap a filesystem error with context.
    pub fn io(context: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io { context: context.into(), detail: err.to_string() }
    }

    /// Wrap a filesystem error touching a lock file.
    pub fn lock_io(filepath: impl Into<String>, err: &std::io::Error) -> Self {
        Self::LockIo { filepath: filepath.into(), detail: err.to_string() }
    }
}

impl fmt::Display for SwarmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { field, value, reason } => {
                write!(f, "invalid {field} {value:?}: {reason}")
            }
            Self::MultiplexerMissing => f.write_str("no tmux server is running"),
            Self::MultiplexerPermission { detail } => {
                write!(f, "tmux socket permission denied: {detail}")
            }
            Self::MultiplexerTimeout { budget_ms } => {
                write!(f, "tmux did not respond within {budget_ms}ms")
            }
            Self::MultiplexerFailure { detail } => write!(f, "tmux failed: {detail}"),
            Self::AgentNotFound { agent_id, known } => {
                if known.is_empty() {
                    write!(f, "agent {agent_id} not found; registry has no active agents")
                } else {
                    write!(f, "agent {agent_id} not found; active: {}", known.join(", "))
                }
            }
            Self::RateLimitExceeded { sender_id, retry_after_secs } => {
                write!(f, "{sender_id} is rate limited; next slot in {retry_after_secs}s")
            }
            Self::LockDenied { filepath, holder, requester } => {
                write!(f, "{filepath} is held by {holder}, not {requester}")
            }
            Self::LockIo { filepath, detail } => write!(f, "lock I/O on {filepath}: {detail}"),
            Self::DeliveryFailed { recipient_id, detail } => {
                write!(f, "delivery to {recipient_id} failed: {detail}")
            }
            Self::SignatureInvalid { message_id } => {
                write!(f, "message {message_id} failed signature verification")
            }
            Self::Secret { detail } => write!(f, "shared secret unusable: {detail}"),
            Self::Io { context, detail } => write!(f, "{context}: {detail}"),
        }
    }
}

impl std::error::Error for SwarmError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
