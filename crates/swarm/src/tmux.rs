// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexer driver. Abstracts tmux behind two capabilities: `PaneSource`
//! for enumeration and `Multiplexer` for delivery.
//!
//! Every invocation is an array-form subprocess with a bounded timeout and a
//! fixed format string; nothing user-supplied is ever interpolated into a
//! shell. Keystroke delivery sends the text in literal mode followed by a
//! separate Enter key, so the pane's shell receives exactly what was passed.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, SwarmError};
use crate::validate::validate_pane_id;

/// One pane as reported by the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pane {
    /// Multiplexer-native id, `%<digits>`.
    pub pane_id: String,
    /// Human-readable coordinate, `session:window.pane`.
    pub pane_index: String,
    /// Session name.
    pub session: String,
    /// Window index within the session.
    pub window: u32,
    /// PID of the shell running in the pane.
    pub shell_pid: u32,
}

/// Capability to enumerate panes.
pub trait PaneSource: Send + Sync {
    fn list_panes<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<Pane>>> + Send + 'a>>;
}

/// Full multiplexer capability: enumeration plus delivery.
pub trait Multiplexer: PaneSource {
    /// Type `text` into `pane_id` as literal keystrokes, then press Enter.
    fn send_keys<'a>(
        &'a self,
        pane_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Whether `pane_id` currently exists.
    fn pane_exists<'a>(
        &'a self,
        pane_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// Probe the server socket, classifying failures.
    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Fixed pane-listing format. Tab-separated so session names containing
/// spaces survive; tmux substitutes the `#{}` expansions, everything else is
/// emitted verbatim.
const LIST_FORMAT: &str =
    "#{pane_id}\t#{session_name}\t#{window_index}\t#{pane_index}\t#{pane_pid}";

/// tmux driver.
#[derive(Debug, Clone)]
pub struct TmuxDriver {
    socket: Option<PathBuf>,
    list_timeout: Duration,
    send_timeout: Duration,
}

impl Default for TmuxDriver {
    fn default() -> Self {
        Self {
            socket: None,
            list_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
        }
    }
}

impl TmuxDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address an isolated tmux server via `-S <path>` instead of the user's
    /// default socket. Used by tests and multi-server setups.
    pub fn with_socket(mut self, socket: Option<PathBuf>) -> Self {
        self.socket = socket;
        self
    }

    pub fn with_timeouts(mut self, list: Duration, send: Duration) -> Self {
        self.list_timeout = list;
        self.send_timeout = send;
        self
    }

    async fn run(&self, args: &[&str], budget: Duration) -> Result<std::process::Output> {
        let mut cmd = tokio::process::Command::new("tmux");
        if let Some(ref socket) = self.socket {
            cmd.arg("-S").arg(socket);
        }
        cmd.args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(budget, cmd.output()).await {
            Err(_) => {
                return Err(SwarmError::MultiplexerTimeout { budget_ms: budget.as_millis() as u64 })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SwarmError::MultiplexerMissing)
            }
            Ok(Err(e)) => return Err(SwarmError::MultiplexerFailure { detail: e.to_string() }),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            Ok(output)
        } else {
            Err(classify_stderr(&String::from_utf8_lossy(&output.stderr)))
        }
    }
}

/// Map tmux stderr onto the error taxonomy. stderr is propagated verbatim
/// into the generic variant.
fn classify_stderr(stderr: &str) -> SwarmError {
    let lower = stderr.to_lowercase();
    if lower.contains("no server running") || lower.contains("error connecting to") {
        SwarmError::MultiplexerMissing
    } else if lower.contains("permission denied") || lower.contains("operation not permitted") {
        SwarmError::MultiplexerPermission { detail: stderr.trim().to_owned() }
    } else {
        SwarmError::MultiplexerFailure { detail: stderr.trim().to_owned() }
    }
}

/// Parse one `LIST_FORMAT` line. Malformed lines yield `None` and are
/// skipped by the caller.
fn parse_pane_line(line: &str) -> Option<Pane> {
    let mut parts = line.split('\t');
    let pane_id = parts.next()?.to_owned();
    let session = parts.next()?.to_owned();
    let window: u32 = parts.next()?.parse().ok()?;
    let pane_index: u32 = parts.next()?.parse().ok()?;
    let shell_pid: u32 = parts.next()?.parse().ok()?;
    validate_pane_id(&pane_id).ok()?;

    Some(Pane {
        pane_index: format!("{session}:{window}.{pane_index}"),
        pane_id,
        session,
        window,
        shell_pid,
    })
}

impl PaneSource for TmuxDriver {
    fn list_panes<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<Pane>>> + Send + 'a>> {
        Box::pin(async move {
            let output =
                self.run(&["list-panes", "-a", "-F", LIST_FORMAT], self.list_timeout).await?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            let panes: Vec<Pane> = stdout.lines().filter_map(parse_pane_line).collect();
            debug!(count = panes.len(), "listed tmux panes");
            Ok(panes)
        })
    }
}

impl Multiplexer for TmuxDriver {
    fn send_keys<'a>(
        &'a self,
        pane_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            validate_pane_id(pane_id)?;
            // Literal mode: tmux performs no key-name expansion on `text`.
            self.run(&["send-keys", "-t", pane_id, "-l", "--", text], self.send_timeout).await?;
            self.run(&["send-keys", "-t", pane_id, "Enter"], self.send_timeout).await?;
            Ok(())
        })
    }

    fn pane_exists<'a>(
        &'a self,
        pane_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            validate_pane_id(pane_id)?;
            let panes = self.list_panes().await?;
            Ok(panes.iter().any(|p| p.pane_id == pane_id))
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.run(&["list-sessions"], self.list_timeout).await.map(|_| ())
        })
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
