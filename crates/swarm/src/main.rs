// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use swarm::command::{Command, GlobalArgs};

/// Pane-local coordination for AI coding agents.
#[derive(Parser)]
#[command(name = "swarm", version, about)]
struct Cli {
    /// Project root override; must be an existing directory.
    #[arg(long, global = true, env = "SWARM_PROJECT_ROOT")]
    project_root: Option<PathBuf>,

    /// Address an isolated tmux server socket.
    #[arg(long, global = true, env = "SWARM_TMUX_SOCKET")]
    tmux_socket: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "SWARM_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Log format (text or json).
    #[arg(long, global = true, env = "SWARM_LOG_FORMAT", default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    if cli.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).with_writer(std::io::stderr).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let globals = GlobalArgs {
        project_root: cli.project_root,
        tmux_socket: cli.tmux_socket,
    };
    std::process::exit(swarm::command::run(cli.command, globals).await);
}
