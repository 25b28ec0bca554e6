// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::envelope::MessageType;
use crate::registry::{AgentRecord, AgentStatus, RegistryFile};
use crate::test_support::{FakeInspector, FakePanes, ManualClock, StaticSecret};

fn coordinator(dir: &std::path::Path) -> (Coordinator, Arc<FakePanes>) {
    let root = dir.canonicalize().unwrap();
    let clock = Arc::new(ManualClock::at_secs(1_000_000));
    let panes = Arc::new(FakePanes::new());
    let coordinator = Coordinator::build(
        root,
        SwarmConfig::default(),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&panes) as Arc<dyn Multiplexer>,
        Arc::new(FakeInspector::new()),
        Arc::new(StaticSecret([1u8; 32])),
    )
    .unwrap();
    (coordinator, panes)
}

fn seed_agents(coordinator: &Coordinator, panes: &FakePanes, count: u32) {
    let mut agents = Vec::new();
    for i in 0..count {
        panes.add_pane(&format!("%{i}"), "main", 0, i, 100 + i);
        agents.push(AgentRecord {
            id: format!("agent-{i}"),
            pane_id: format!("%{i}"),
            pane_index: format!("main:0.{i}"),
            pid: 200 + i,
            session_name: "main".into(),
            window: 0,
            status: AgentStatus::Active,
            last_seen: coordinator.clock.now_utc(),
            cwd: None,
        });
    }
    let file = RegistryFile {
        session_name: "main".into(),
        updated_at: Some(coordinator.clock.now_utc()),
        agents,
    };
    std::fs::write(
        coordinator.registry.path(),
        serde_json::to_vec_pretty(&file).unwrap(),
    )
    .unwrap();
}

#[test]
fn refresh_options_follow_config() {
    let dir = tempfile::tempdir().unwrap();
    let (mut coordinator, _panes) = coordinator(dir.path());
    let opts = coordinator.refresh_options();
    assert_eq!(opts.stale_threshold, coordinator.config.stale_threshold);
    assert_eq!(opts.include_unknown_cwd, None);

    coordinator.config.strict_project_isolation = true;
    assert_eq!(coordinator.refresh_options().include_unknown_cwd, Some(false));
}

#[tokio::test]
async fn one_shot_ack_flush_persists_pending_table() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (coordinator, panes) = coordinator(dir.path());
    seed_agents(&coordinator, &panes, 2);

    coordinator
        .messenger
        .send("agent-0", "agent-1", MessageType::Question, "confirm?", true)
        .await?;
    coordinator.flush_pending_acks();

    assert_eq!(coordinator.acks.pending_ids().len(), 1);
    assert!(coordinator.paths.pending_acks().exists());
    Ok(())
}

#[tokio::test]
async fn ack_tracker_spawns_once() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(dir.path());
    let shutdown = tokio_util::sync::CancellationToken::new();

    let first = coordinator.spawn_ack_tracker(shutdown.clone());
    let second = coordinator.spawn_ack_tracker(shutdown.clone());
    assert!(first.is_some());
    assert!(second.is_none());

    shutdown.cancel();
    if let Some(task) = first {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), task).await;
    }
}

#[tokio::test]
async fn end_to_end_send_lock_and_coordinate_share_one_root() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (coordinator, panes) = coordinator(dir.path());
    seed_agents(&coordinator, &panes, 2);

    // Message flows through the messenger into the shared log.
    coordinator
        .messenger
        .send("agent-0", "agent-1", MessageType::Info, "starting work", false)
        .await?;
    assert_eq!(coordinator.log.tail(5)?.len(), 1);

    // Locks and the coordination document live under the same root.
    let outcome = coordinator.locks.acquire(
        "src/main.rs",
        "agent-0",
        "implementing",
        std::time::Duration::ZERO,
    )?;
    assert!(outcome.is_acquired());
    coordinator.coordination.set_work_row("agent-0", "main.rs rewrite", "in-progress")?;

    assert!(coordinator.paths.lock_dir().exists());
    assert!(coordinator.paths.coordination().exists());
    assert_eq!(coordinator.coordination.read()?.work_rows().len(), 1);
    Ok(())
}
