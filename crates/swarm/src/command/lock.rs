// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock subcommands: `acquire-file-lock`, `release-file-lock`,
//! `who-has-lock`, `list-all-locks`, `cleanup-stale-locks`.

use std::time::Duration;

use clap::Args;

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::lock::Acquire;

use super::print_json;

#[derive(Debug, Args)]
pub struct AcquireArgs {
    /// Path or glob pattern, relative to the project root.
    pub path: String,
    /// Acquiring agent id.
    pub agent: String,
    /// Free-text reason shown to conflicting agents.
    #[arg(default_value = "")]
    pub reason: String,
    /// Seconds to keep retrying on conflict (0 = single attempt).
    #[arg(long, default_value = "0")]
    pub timeout: u64,
}

#[derive(Debug, Args)]
pub struct ReleaseArgs {
    pub path: String,
    pub agent: String,
}

#[derive(Debug, Args)]
pub struct WhoHasArgs {
    pub path: String,
    /// Machine-readable output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Include locks past the stale timeout.
    #[arg(long)]
    pub include_stale: bool,
    /// Machine-readable output.
    #[arg(long)]
    pub json: bool,
}

pub fn acquire(coordinator: &Coordinator, args: AcquireArgs) -> Result<i32> {
    let timeout = if args.timeout == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(crate::validate::validate_timeout(args.timeout)?)
    };

    match coordinator.locks.acquire(&args.path, &args.agent, &args.reason, timeout)? {
        Acquire::Acquired { reclaimed, refreshed } => {
            if reclaimed {
                println!("acquired {} (reclaimed stale lock)", args.path);
            } else if refreshed {
                println!("refreshed {}", args.path);
            } else {
                println!("acquired {}", args.path);
            }
            Ok(0)
        }
        Acquire::Conflict(conflict) => {
            eprintln!(
                "LockConflict: {} held by {} for {}s ({})",
                conflict.filepath,
                conflict.holder,
                conflict.age.as_secs(),
                conflict.reason
            );
            Ok(1)
        }
    }
}

pub fn release(coordinator: &Coordinator, args: ReleaseArgs) -> Result<i32> {
    coordinator.locks.release(&args.path, &args.agent)?;
    println!("released {}", args.path);
    Ok(0)
}

pub fn who_has(coordinator: &Coordinator, args: WhoHasArgs) -> Result<i32> {
    let view = coordinator.locks.who_has(&args.path)?;
    if args.json {
        print_json(&view)?;
        return Ok(0);
    }
    match view {
        Some(view) => println!(
            "{} held by {} for {}s ({}){}",
            view.record.filepath,
            view.record.agent_id,
            view.age_secs,
            view.record.reason,
            if view.stale { "  [stale]" } else { "" },
        ),
        None => println!("{} is not locked", args.path),
    }
    Ok(0)
}

pub fn list_all(coordinator: &Coordinator, args: ListArgs) -> Result<i32> {
    let views = coordinator.locks.list_all(args.include_stale)?;
    if args.json {
        print_json(&views)?;
        return Ok(0);
    }
    if views.is_empty() {
        println!("no locks held");
        return Ok(0);
    }
    for view in views {
        println!(
            "{}  {}  {}s  {}{}",
            view.record.filepath,
            view.record.agent_id,
            view.age_secs,
            view.record.reason,
            if view.stale { "  [stale]" } else { "" },
        );
    }
    Ok(0)
}

pub fn cleanup(coordinator: &Coordinator) -> Result<i32> {
    let removed = coordinator.locks.cleanup_stale()?;
    println!("removed {} stale lock(s)", removed.len());
    for record in removed {
        println!("  {} ({})", record.filepath, record.agent_id);
    }
    Ok(0)
}
