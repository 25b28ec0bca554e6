// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use swarm::clock::{Clock, SystemClock};
use swarm::envelope::{Envelope, MessageLog, MessageType};
use swarm::lock::LockManager;
use swarm::project::StatePaths;
use swarm::registry::{AgentRecord, AgentStatus, RegistryFile};

use crate::config::DashboardConfig;
use crate::state::DashState;

use super::build_router;

fn seeded_state(dir: &std::path::Path) -> Arc<DashState> {
    let root = dir.canonicalize().unwrap();
    let paths = StatePaths::new(&root);
    let clock = SystemClock;

    // Registry with one active and one stale agent.
    let file = RegistryFile {
        session_name: "main".into(),
        updated_at: Some(clock.now_utc()),
        agents: vec![
            AgentRecord {
                id: "agent-0".into(),
                pane_id: "%0".into(),
                pane_index: "main:0.0".into(),
                pid: 100,
                session_name: "main".into(),
                window: 0,
                status: AgentStatus::Active,
                last_seen: clock.now_utc(),
                cwd: None,
            },
            AgentRecord {
                id: "agent-1".into(),
                pane_id: "%1".into(),
                pane_index: "main:0.1".into(),
                pid: 101,
                session_name: "main".into(),
                window: 0,
                status: AgentStatus::Stale,
                last_seen: clock.now_utc(),
                cwd: None,
            },
        ],
    };
    std::fs::write(paths.registry(), serde_json::to_vec_pretty(&file).unwrap()).unwrap();

    // One held lock.
    let locks = LockManager::new(&root, paths.lock_dir(), Arc::new(SystemClock));
    locks.acquire("src/main.rs", "agent-0", "editing", Duration::ZERO).unwrap();

    // Two log entries signed with a throwaway key (the dashboard has no
    // secret in tests, so verification is skipped).
    let log = MessageLog::new(paths.message_log());
    for content in ["first", "second"] {
        let envelope =
            Envelope::new("agent-0", "agent-1", MessageType::Info, content, &clock)
                .sign(&[5u8; 32]);
        log.append(&envelope).unwrap();
    }

    let config = DashboardConfig::parse_from([
        "swarm-dashboard",
        "--project-root",
        &root.to_string_lossy(),
    ]);
    let mut state = DashState::open(&config).unwrap();
    // Force the no-secret path regardless of the host environment.
    state.secret = None;
    Arc::new(state)
}

#[tokio::test]
async fn agents_endpoint_serves_registry() {
    let dir = tempfile::tempdir().unwrap();
    let server = axum_test::TestServer::new(build_router(seeded_state(dir.path()))).unwrap();

    let body: serde_json::Value = server.get("/api/agents").await.json();
    assert_eq!(body["session_name"], "main");
    assert_eq!(body["agents"].as_array().unwrap().len(), 2);
    assert_eq!(body["agents"][0]["id"], "agent-0");
}

#[tokio::test]
async fn messages_endpoint_honors_limit() {
    let dir = tempfile::tempdir().unwrap();
    let server = axum_test::TestServer::new(build_router(seeded_state(dir.path()))).unwrap();

    let body: serde_json::Value = server.get("/api/messages").add_query_param("limit", 1).await.json();
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["content"], "second");
    assert!(entries[0]["trusted"].is_null(), "no secret, no verification verdict");
}

#[tokio::test]
async fn locks_endpoint_lists_holders() {
    let dir = tempfile::tempdir().unwrap();
    let server = axum_test::TestServer::new(build_router(seeded_state(dir.path()))).unwrap();

    let body: serde_json::Value = server.get("/api/locks").await.json();
    let locks = body.as_array().unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0]["filepath"], "src/main.rs");
    assert_eq!(locks[0]["agent_id"], "agent-0");
    assert_eq!(locks[0]["stale"], false);
}

#[tokio::test]
async fn stats_endpoint_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let server = axum_test::TestServer::new(build_router(seeded_state(dir.path()))).unwrap();

    let body: serde_json::Value = server.get("/api/stats").await.json();
    assert_eq!(body["agents_active"], 1);
    assert_eq!(body["agents_stale"], 1);
    assert_eq!(body["locks_held"], 1);
    assert_eq!(body["locks_stale"], 0);
    assert!(body["log_bytes"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn empty_project_serves_empty_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let config = DashboardConfig::parse_from([
        "swarm-dashboard",
        "--project-root",
        &root.to_string_lossy(),
    ]);
    let mut state = DashState::open(&config).unwrap();
    state.secret = None;
    let server = axum_test::TestServer::new(build_router(Arc::new(state))).unwrap();

    let agents: serde_json::Value = server.get("/api/agents").await.json();
    assert_eq!(agents["agents"].as_array().unwrap().len(), 0);

    let messages: serde_json::Value = server.get("/api/messages").await.json();
    assert_eq!(messages.as_array().unwrap().len(), 0);

    let locks: serde_json::Value = server.get("/api/locks").await.json();
    assert_eq!(locks.as_array().unwrap().len(), 0);
}
