// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only dashboard over a project's coordination state.
//!
//! Serves JSON snapshots of the agent registry, message log, and lock
//! directory, plus a server-sent-events stream that fires whenever one of
//! the backing files changes. The dashboard never writes project state.

pub mod config;
pub mod http;
pub mod state;
pub mod stream;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::DashboardConfig;
use crate::state::DashState;

/// Run the dashboard until the process is interrupted.
pub async fn run(config: DashboardConfig) -> anyhow::Result<()> {
    let state = Arc::new(DashState::open(&config)?);
    let shutdown = CancellationToken::new();

    tokio::spawn(stream::watch_files(Arc::clone(&state), shutdown.clone()));

    let router = http::build_router(Arc::clone(&state));
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, root = %state.paths.root().display(), "dashboard listening");

    let server = axum::serve(listener, router).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
            shutdown.cancel();
        }
    });
    server.await?;
    Ok(())
}
