// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk agent registry with liveness transitions.
//!
//! `refresh` reconciles the multiplexer's pane list against the previous
//! registry: observed agents stay `active`, briefly absent ones are retained,
//! longer absences become `stale`, and agents unseen for two stale intervals
//! are dropped. The file is written through a per-process mutex plus the
//! file-lock manager, always via temp-and-rename, so readers only ever see a
//! complete registry.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Result, SwarmError};
use crate::fsio;
use crate::inspect::{Cwd, ProcessInspector};
use crate::lock::{Acquire, LockManager};
use crate::project::{StatePaths, REGISTRY_FILE};
use crate::tmux::Multiplexer;

/// Seconds of absence before an agent turns stale. Removal happens after a
/// further interval of the same length.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(120);

/// How long a refresh waits for the registry's own file lock.
const REGISTRY_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Liveness classification of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Stale,
    Dead,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stale => "stale",
            Self::Dead => "dead",
        }
    }
}

/// One registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Stable id within a session, `agent-<n>`.
    pub id: String,
    /// Multiplexer-native pane id, `%<digits>`.
    pub pane_id: String,
    /// Human-readable coordinate, `session:window.pane`.
    pub pane_index: String,
    /// PID of the assistant process, not the pane's shell.
    pub pid: u32,
    pub session_name: String,
    pub window: u32,
    pub status: AgentStatus,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// The persisted registry document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RegistryFile {
    #[serde(default)]
    pub session_name: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agents: Vec<AgentRecord>,
}

/// Options controlling one refresh pass.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub stale_threshold: Duration,
    /// Keep agents whose CWD lies outside the project root.
    pub cross_project: bool,
    /// Restrict discovery to one multiplexer session.
    pub session: Option<String>,
    /// Keep agents with an unknown CWD. `None` applies the secure default:
    /// included only when the platform cannot report CWDs at all.
    pub include_unknown_cwd: Option<bool>,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            cross_project: false,
            session: None,
            include_unknown_cwd: None,
        }
    }
}

/// Result of a refresh pass.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub file: RegistryFile,
    /// Agents dropped as dead during this pass.
    pub removed: Vec<AgentRecord>,
    /// Set when discovery could not run but prior state was preserved.
    pub warning: Option<SwarmError>,
}

/// Registry over `ACTIVE_AGENTS.json`.
pub struct AgentRegistry {
    paths: StatePaths,
    clock: Arc<dyn Clock>,
    locks: Arc<LockManager>,
    write_guard: Mutex<()>,
}

impl AgentRegistry {
    pub fn new(paths: StatePaths, clock: Arc<dyn Clock>, locks: Arc<LockManager>) -> Self {
        Self { paths, clock, locks, write_guard: Mutex::new(()) }
    }

    /// Reconcile the registry against live panes and persist the result.
    pub async fn refresh(
        &self,
        mux: &dyn Multiplexer,
        inspector: &dyn ProcessInspector,
        opts: &RefreshOptions,
    ) -> Result<RefreshOutcome> {
        let prior = self.load();

        let panes = match mux.list_panes().await {
            Ok(panes) => panes,
            Err(err @ SwarmError::MultiplexerMissing) => {
                // Discovery found nothing, but the previous registry file is
                // deliberately left untouched.
                return Ok(RefreshOutcome {
                    file: RegistryFile {
                        session_name: prior.session_name,
                        updated_at: Some(self.clock.now_utc()),
                        agents: Vec::new(),
                    },
                    removed: Vec::new(),
                    warning: Some(err),
                });
            }
            Err(err) => return Err(err),
        };

        let include_unknown =
            opts.include_unknown_cwd.unwrap_or_else(|| !inspector.cwd_supported());
        let now = self.clock.now_utc();

        // Observe: one assistant per pane at most, filtered to the project.
        let mut observed = Vec::new();
        for pane in &panes {
            if let Some(ref session) = opts.session {
                if &pane.session != session {
                    continue;
                }
            }
            let assistant = match inspector.assistant_under(pane.shell_pid) {
                Ok(Some(assistant)) => assistant,
                Ok(None) => continue,
                Err(err) => {
                    warn!(pane = %pane.pane_id, err = %err, "skipping uninspectable pane");
                    continue;
                }
            };
            let keep = match &assistant.cwd {
                Cwd::Known(cwd) => opts.cross_project || cwd.starts_with(self.paths.root()),
                Cwd::Unknown => opts.cross_project || include_unknown,
            };
            if keep {
                observed.push((pane.clone(), assistant));
            }
        }

        // Carry ids forward by (pane_id, pid); everything retained counts as
        // an occupied id slot.
        let mut prior_by_key: HashMap<(String, u32), AgentRecord> = prior
            .agents
            .iter()
            .map(|a| ((a.pane_id.clone(), a.pid), a.clone()))
            .collect();

        let mut used_slots: HashSet<u64> = HashSet::new();
        let mut agents: Vec<AgentRecord> = Vec::new();
        let mut pending_new = Vec::new();

        for (pane, assistant) in observed {
            let key = (pane.pane_id.clone(), assistant.pid);
            let cwd = match assistant.cwd {
                Cwd::Known(path) => Some(path.to_string_lossy().into_owned()),
                Cwd::Unknown => None,
            };
            match prior_by_key.remove(&key) {
                Some(existing) => {
                    if let Some(slot) = slot_of(&existing.id) {
                        used_slots.insert(slot);
                    }
                    agents.push(AgentRecord {
                        pane_index: pane.pane_index,
                        session_name: pane.session,
                        window: pane.window,
                        status: AgentStatus::Active,
                        last_seen: now,
                        cwd,
                        ..existing
                    });
                }
                None => pending_new.push((pane, assistant.pid, cwd)),
            }
        }

        // Liveness pass over prior entries no longer observed. A pane that
        // now hosts a different assistant PID supersedes its old record
        // immediately; everything else ages out on the stale clock.
        let occupied_panes: HashSet<String> = agents
            .iter()
            .map(|a| a.pane_id.clone())
            .chain(pending_new.iter().map(|(pane, _, _)| pane.pane_id.clone()))
            .collect();
        let mut removed = Vec::new();
        let stale = chrono_duration(opts.stale_threshold);
        let dead = stale * 2;
        for (_, record) in prior_by_key.drain() {
            if occupied_panes.contains(record.pane_id.as_str()) {
                removed.push(AgentRecord { status: AgentStatus::Dead, ..record });
                continue;
            }
            let age = now.signed_duration_since(record.last_seen);
            if age < stale {
                // Brief absence: keep the record as-is.
                if let Some(slot) = slot_of(&record.id) {
                    used_slots.insert(slot);
                }
                agents.push(record);
            } else if age < dead {
                if let Some(slot) = slot_of(&record.id) {
                    used_slots.insert(slot);
                }
                agents.push(AgentRecord { status: AgentStatus::Stale, ..record });
            } else {
                removed.push(AgentRecord { status: AgentStatus::Dead, ..record });
            }
        }

        // New panes take the lowest free numeric slots, keeping ids dense.
        for (pane, pid, cwd) in pending_new {
            let slot = (0..).find(|slot| !used_slots.contains(slot)).unwrap_or_default();
            used_slots.insert(slot);
            agents.push(AgentRecord {
                id: format!("agent-{slot}"),
                pane_id: pane.pane_id,
                pane_index: pane.pane_index,
                pid,
                session_name: pane.session,
                window: pane.window,
                status: AgentStatus::Active,
                last_seen: now,
                cwd,
            });
        }

        agents.sort_by_key(|a| slot_of(&a.id).unwrap_or(u64::MAX));

        let session_name = opts
            .session
            .clone()
            .or_else(|| agents.first().map(|a| a.session_name.clone()))
            .unwrap_or(prior.session_name);

        let file = RegistryFile { session_name, updated_at: Some(now), agents };
        self.persist(&file)?;
        debug!(agents = file.agents.len(), removed = removed.len(), "registry refreshed");
        Ok(RefreshOutcome { file, removed, warning: None })
    }

    /// Path of the registry file on disk.
    pub fn path(&self) -> std::path::PathBuf {
        self.paths.registry()
    }

    /// Load the registry, tolerating an absent or malformed file.
    pub fn load(&self) -> RegistryFile {
        match std::fs::read(self.paths.registry()) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(err = %e, "malformed registry file, starting empty");
                RegistryFile::default()
            }),
            Err(_) => RegistryFile::default(),
        }
    }

    /// Agents currently marked active.
    pub fn list_active(&self) -> Vec<AgentRecord> {
        self.load().agents.into_iter().filter(|a| a.status == AgentStatus::Active).collect()
    }

    /// Look up one agent by id.
    pub fn get(&self, id: &str) -> Option<AgentRecord> {
        self.load().agents.into_iter().find(|a| a.id == id)
    }

    /// Look up the agent pinned to a pane, used by `whoami`.
    pub fn find_by_pane(&self, pane_id: &str) -> Option<AgentRecord> {
        self.load().agents.into_iter().find(|a| a.pane_id == pane_id)
    }

    /// Count agents per status.
    pub fn count_by_status(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for agent in self.load().agents {
            *counts.entry(agent.status.as_str().to_owned()).or_insert(0) += 1;
        }
        counts
    }

    fn persist(&self, file: &RegistryFile) -> Result<()> {
        let _guard = self.write_guard.lock();

        let writer = format!("registry-{}", std::process::id());
        let acquired =
            self.locks.acquire(REGISTRY_FILE, &writer, "registry refresh", REGISTRY_LOCK_TIMEOUT)?;
        if let Acquire::Conflict(conflict) = acquired {
            return Err(SwarmError::LockIo {
                filepath: REGISTRY_FILE.to_owned(),
                detail: format!("registry is being written by {}", conflict.holder),
            });
        }

        let result = (|| {
            let json = serde_json::to_vec_pretty(file).map_err(|e| SwarmError::Io {
                context: "encode registry".into(),
                detail: e.to_string(),
            })?;
            fsio::write_atomic(&self.paths.registry(), &json, fsio::FILE_MODE)
                .map_err(|e| SwarmError::io("write registry", &e))
        })();

        if let Err(err) = self.locks.release(REGISTRY_FILE, &writer) {
            warn!(err = %err, "failed to release registry lock");
        }
        result
    }
}

/// Numeric slot of an `agent-<n>` id.
fn slot_of(id: &str) -> Option<u64> {
    id.strip_prefix("agent-").and_then(|n| n.parse().ok())
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
