// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `discover-agents`, `list-agents`, and `whoami`.

use std::time::Duration;

use clap::Args;

use crate::coordinator::Coordinator;
use crate::error::{Result, SwarmError};
use crate::registry::{AgentRecord, RefreshOptions, RegistryFile};

use super::print_json;

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Rescan continuously until interrupted.
    #[arg(long)]
    pub watch: bool,

    /// Machine-readable output.
    #[arg(long)]
    pub json: bool,

    /// Restrict discovery to one tmux session.
    #[arg(long)]
    pub session: Option<String>,

    /// Seconds of absence before an agent goes stale.
    #[arg(long)]
    pub stale_threshold: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Machine-readable output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct WhoamiArgs {
    /// Machine-readable output.
    #[arg(long)]
    pub json: bool,
}

pub async fn discover(coordinator: &Coordinator, args: DiscoverArgs) -> Result<i32> {
    let mut opts = coordinator.refresh_options();
    opts.session = args.session.clone();
    if let Some(secs) = args.stale_threshold {
        opts.stale_threshold = Duration::from_secs(crate::validate::validate_timeout(secs)?);
    }

    if !args.watch {
        return discover_once(coordinator, &opts, args.json).await;
    }

    loop {
        let code = discover_once(coordinator, &opts, args.json).await?;
        if code != 0 {
            return Ok(code);
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

async fn discover_once(
    coordinator: &Coordinator,
    opts: &RefreshOptions,
    json: bool,
) -> Result<i32> {
    let outcome = coordinator
        .registry
        .refresh(coordinator.mux.as_ref(), coordinator.inspector.as_ref(), opts)
        .await?;

    if json {
        print_json(&outcome.file)?;
    } else {
        print_registry(&outcome.file);
        for removed in &outcome.removed {
            println!("removed dead agent {} ({})", removed.id, removed.pane_index);
        }
    }

    match outcome.warning {
        Some(warning @ SwarmError::MultiplexerMissing) => Ok(super::fail(&warning)),
        Some(warning) => {
            eprintln!("{}: {warning}", warning.category());
            Ok(0)
        }
        None => Ok(0),
    }
}

pub fn list(coordinator: &Coordinator, args: ListArgs) -> Result<i32> {
    let file = coordinator.registry.load();
    if args.json {
        print_json(&file)?;
    } else {
        print_registry(&file);
    }
    Ok(0)
}

pub fn whoami(coordinator: &Coordinator, args: WhoamiArgs) -> Result<i32> {
    let pane = std::env::var("TMUX_PANE").ok();
    let record: Option<AgentRecord> =
        pane.as_deref().and_then(|pane_id| coordinator.registry.find_by_pane(pane_id));

    if args.json {
        print_json(&serde_json::json!({
            "pane_id": pane,
            "agent_id": record.as_ref().map(|r| r.id.clone()),
        }))?;
        return Ok(0);
    }

    match record {
        Some(record) => println!("{}", record.id),
        None => println!("unknown"),
    }
    Ok(0)
}

fn print_registry(file: &RegistryFile) {
    if file.agents.is_empty() {
        println!("no agents registered");
        return;
    }
    println!("session: {}", file.session_name);
    for agent in &file.agents {
        println!(
            "{}  {}  pid {}  {}  last seen {}{}",
            agent.id,
            agent.pane_index,
            agent.pid,
            agent.status.as_str(),
            agent.last_seen.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            agent.cwd.as_deref().map(|c| format!("  {c}")).unwrap_or_default(),
        );
    }
}
