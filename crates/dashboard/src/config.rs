// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Read-only dashboard over swarm coordination state.
#[derive(Debug, Clone, Parser)]
#[command(name = "swarm-dashboard", version, about)]
pub struct DashboardConfig {
    /// Host address to bind to. Local by default; the dashboard has no
    /// authentication layer.
    #[arg(long, env = "SWARM_DASHBOARD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "SWARM_DASHBOARD_PORT", default_value = "8787")]
    pub port: u16,

    /// Project root override; must be an existing directory.
    #[arg(long, env = "SWARM_PROJECT_ROOT")]
    pub project_root: Option<PathBuf>,

    /// Seconds between heartbeat events on /api/stream.
    #[arg(long, env = "SWARM_DASHBOARD_HEARTBEAT", default_value = "15")]
    pub heartbeat_secs: u64,

    /// Milliseconds between polling sweeps when file events are unavailable.
    #[arg(long, env = "SWARM_DASHBOARD_POLL_MS", default_value = "1000")]
    pub poll_ms: u64,
}
