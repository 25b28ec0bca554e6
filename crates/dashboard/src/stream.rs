// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File watcher feeding `/api/stream`.
//!
//! Uses `notify` for filesystem events on the project root with a polling
//! sweep as fallback. A change is only broadcast when a backing file's
//! modification time actually advanced, so editor noise elsewhere in the
//! tree stays quiet.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::state::{DashState, StreamEvent};

/// The files backing each stream event kind.
fn watched(state: &DashState) -> Vec<(&'static str, PathBuf)> {
    vec![
        ("agents", state.paths.registry()),
        ("messages", state.paths.message_log()),
        ("locks", state.paths.lock_dir()),
    ]
}

/// Watch coordination files until shutdown, broadcasting snapshots.
pub async fn watch_files(state: Arc<DashState>, shutdown: CancellationToken) {
    let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
    let _watcher = setup_notify_watcher(&state, wake_tx);

    let mut mtimes: Vec<(&'static str, Option<SystemTime>)> =
        watched(&state).iter().map(|(kind, path)| (*kind, mtime(path))).collect();

    let mut poll = tokio::time::interval(Duration::from_millis(state.config.poll_ms.max(100)));
    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(state.config.heartbeat_secs.max(1)));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = wake_rx.recv() => {}
            _ = poll.tick() => {}
            _ = heartbeat.tick() => {
                let _ = state.events.send(StreamEvent {
                    kind: "heartbeat",
                    data: "{}".to_owned(),
                });
                continue;
            }
        }

        let mut any_changed = false;
        for (slot, (kind, path)) in mtimes.iter_mut().zip(watched(&state)) {
            let current = mtime(&path);
            if current == slot.1 {
                continue;
            }
            slot.1 = current;
            any_changed = true;
            if let Some(event) = snapshot(&state, kind) {
                debug!(kind, "state file changed");
                let _ = state.events.send(event);
            }
        }
        if any_changed {
            if let Some(event) = snapshot(&state, "stats") {
                let _ = state.events.send(event);
            }
        }
    }
}

fn snapshot(state: &DashState, kind: &'static str) -> Option<StreamEvent> {
    let data = match kind {
        "agents" => serde_json::to_string(&state.agents_snapshot()).ok()?,
        "messages" => serde_json::to_string(&state.messages_snapshot(50).ok()?).ok()?,
        "locks" => serde_json::to_string(&state.locks_snapshot().ok()?).ok()?,
        "stats" => serde_json::to_string(&state.stats_snapshot().ok()?).ok()?,
        _ => return None,
    };
    Some(StreamEvent { kind, data })
}

fn mtime(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Watch the project root non-recursively; state files live directly in it.
fn setup_notify_watcher(
    state: &DashState,
    wake_tx: mpsc::Sender<()>,
) -> Option<notify::RecommendedWatcher> {
    use notify::{RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |_: notify::Result<notify::Event>| {
        let _ = wake_tx.try_send(());
    })
    .ok()?;

    watcher.watch(state.paths.root(), RecursiveMode::NonRecursive).ok()?;
    // The lock directory is a subdirectory; watch it separately once it
    // exists.
    let _ = watcher.watch(&state.paths.lock_dir(), RecursiveMode::NonRecursive);
    Some(watcher)
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
