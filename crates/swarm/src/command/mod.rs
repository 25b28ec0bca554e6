// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands. Each run function returns a process exit code; failures
//! print one `<ErrorCategory>: <reason>` line on stderr, with a remediation
//! hint where one exists.

pub mod agents;
pub mod lock;
pub mod message;

use std::path::PathBuf;

use crate::config::{FileConfig, SwarmConfig};
use crate::coordinator::Coordinator;
use crate::error::SwarmError;
use crate::project::{resolve_project_root, StatePaths};

/// Flags shared by every subcommand.
pub struct GlobalArgs {
    pub project_root: Option<PathBuf>,
    pub tmux_socket: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Scan tmux panes and refresh the agent registry.
    DiscoverAgents(agents::DiscoverArgs),
    /// Print the registry without rescanning.
    ListAgents(agents::ListArgs),
    /// Send a signed message to one agent's pane.
    SendMessage(message::SendArgs),
    /// Broadcast to every active agent. Offline recipients are retried
    /// once, then reported as delivery_failed.
    BroadcastMessage(message::BroadcastArgs),
    /// Acquire an exclusive lock on a path or glob pattern.
    AcquireFileLock(lock::AcquireArgs),
    /// Release a lock held by an agent.
    ReleaseFileLock(lock::ReleaseArgs),
    /// Show the current holder of a lock.
    WhoHasLock(lock::WhoHasArgs),
    /// List locks on disk.
    ListAllLocks(lock::ListArgs),
    /// Remove locks older than the stale timeout.
    CleanupStaleLocks,
    /// Print recent messages from the log.
    CheckMessages(message::CheckArgs),
    /// Print the agent id bound to this pane.
    Whoami(agents::WhoamiArgs),
    /// Receive a message typed into this pane by the messaging service.
    AgentNotify(message::NotifyArgs),
}

/// Dispatch one subcommand against a freshly wired coordinator.
pub async fn run(command: Command, globals: GlobalArgs) -> i32 {
    let coordinator = match build(&globals) {
        Ok(coordinator) => coordinator,
        Err(err) => return fail(&err),
    };

    let result = match command {
        Command::DiscoverAgents(args) => agents::discover(&coordinator, args).await,
        Command::ListAgents(args) => agents::list(&coordinator, args),
        Command::SendMessage(args) => message::send(&coordinator, args).await,
        Command::BroadcastMessage(args) => message::broadcast(&coordinator, args).await,
        Command::AcquireFileLock(args) => lock::acquire(&coordinator, args),
        Command::ReleaseFileLock(args) => lock::release(&coordinator, args),
        Command::WhoHasLock(args) => lock::who_has(&coordinator, args),
        Command::ListAllLocks(args) => lock::list_all(&coordinator, args),
        Command::CleanupStaleLocks => lock::cleanup(&coordinator),
        Command::CheckMessages(args) => message::check(&coordinator, args),
        Command::Whoami(args) => agents::whoami(&coordinator, args),
        Command::AgentNotify(args) => message::notify(&coordinator, args),
    };

    match result {
        Ok(code) => code,
        Err(err) => fail(&err),
    }
}

fn build(globals: &GlobalArgs) -> Result<Coordinator, SwarmError> {
    let cwd = std::env::current_dir()
        .map_err(|e| SwarmError::io("determine working directory", &e))?;
    let root = resolve_project_root(&cwd, globals.project_root.as_deref())?;

    let file = FileConfig::load(&StatePaths::new(&root))?;
    let mut config = SwarmConfig::default().apply(file)?;
    if globals.tmux_socket.is_some() {
        config.tmux_socket = globals.tmux_socket.clone();
    }

    Coordinator::open(root, config)
}

/// Print a structured failure line and return the failure exit code.
pub(crate) fn fail(err: &SwarmError) -> i32 {
    eprintln!("{}: {err}", err.category());
    if let Some(hint) = err.remediation() {
        eprintln!("hint: {hint}");
    }
    1
}

/// Serialize a value as pretty JSON for `--json` output.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), SwarmError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| SwarmError::Io {
        context: "encode output".into(),
        detail: e.to_string(),
    })?;
    println!("{text}");
    Ok(())
}
