// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use swarm::clock::SystemClock;
use swarm::envelope::{LogEntry, MessageLog};
use swarm::error::Result;
use swarm::lock::{LockManager, LockView};
use swarm::project::{resolve_project_root, StatePaths};
use swarm::registry::{AgentRegistry, AgentStatus, RegistryFile};
use swarm::secret::{FileSecretStore, SecretSource, SECRET_LEN};

use crate::config::DashboardConfig;

/// One event on `/api/stream`: the event name and a JSON snapshot.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub kind: &'static str,
    pub data: String,
}

/// Shared dashboard state. Strictly read-only over project files.
pub struct DashState {
    pub paths: StatePaths,
    pub config: DashboardConfig,
    pub registry: AgentRegistry,
    pub locks: Arc<LockManager>,
    pub log: MessageLog,
    /// Present when the local secret is readable; verification is skipped
    /// (and `trusted` reported as null) otherwise.
    pub secret: Option<[u8; SECRET_LEN]>,
    pub events: broadcast::Sender<StreamEvent>,
}

/// Aggregate counters for `/api/stats`.
#[derive(Debug, Serialize)]
pub struct Stats {
    pub agents_active: usize,
    pub agents_stale: usize,
    pub locks_held: usize,
    pub locks_stale: usize,
    pub log_bytes: u64,
}

impl DashState {
    pub fn open(config: &DashboardConfig) -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| swarm::error::SwarmError::io("determine working directory", &e))?;
        let root = resolve_project_root(&cwd, config.project_root.as_deref())?;
        let paths = StatePaths::new(root);

        let clock = Arc::new(SystemClock);
        let locks = Arc::new(LockManager::new(
            paths.root(),
            paths.lock_dir(),
            Arc::clone(&clock) as Arc<dyn swarm::clock::Clock>,
        ));
        let registry = AgentRegistry::new(
            paths.clone(),
            Arc::clone(&clock) as Arc<dyn swarm::clock::Clock>,
            Arc::clone(&locks),
        );
        let log = MessageLog::new(paths.message_log());

        let secret = match FileSecretStore::default_location().and_then(|s| s.secret()) {
            Ok(secret) => Some(secret),
            Err(err) => {
                warn!(err = %err, "secret unavailable; messages will not be verified");
                None
            }
        };

        let (events, _) = broadcast::channel(64);
        Ok(Self {
            paths,
            config: config.clone(),
            registry,
            locks,
            log,
            secret,
            events,
        })
    }

    pub fn agents_snapshot(&self) -> RegistryFile {
        self.registry.load()
    }

    pub fn messages_snapshot(&self, limit: usize) -> Result<Vec<LogEntry>> {
        match self.secret {
            Some(ref secret) => self.log.tail_verified(limit, secret),
            None => self.log.tail(limit),
        }
    }

    pub fn locks_snapshot(&self) -> Result<Vec<LockView>> {
        self.locks.list_all(true)
    }

    pub fn stats_snapshot(&self) -> Result<Stats> {
        let agents = self.agents_snapshot();
        let locks = self.locks_snapshot()?;
        let log_bytes =
            std::fs::metadata(self.paths.message_log()).map(|m| m.len()).unwrap_or(0);
        Ok(Stats {
            agents_active:
                agents.agents.iter().filter(|a| a.status == AgentStatus::Active).count(),
            agents_stale:
                agents.agents.iter().filter(|a| a.status == AgentStatus::Stale).count(),
            locks_held: locks.iter().filter(|l| !l.stale).count(),
            locks_stale: locks.iter().filter(|l| l.stale).count(),
            log_bytes,
        })
    }
}
