// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process exclusive locks on project paths.
//!
//! One lock is one file in `.agent_locks/` named by a deterministic encoding
//! of the project-relative path. Acquisition uses exclusive create; refresh
//! and stale reclamation rewrite through a sibling temp file and a single
//! atomic rename, so a held lock file is never momentarily absent.
//!
//! A lock's `filepath` may be a glob pattern. Conflict detection is
//! symmetric: a concrete path conflicts with any overlapping pattern held by
//! another agent and vice versa; pattern-vs-pattern overlap is a
//! conservative literal-prefix check.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use globset::GlobBuilder;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::Clock;
use crate::error::{Result, SwarmError};
use crate::fsio;
use crate::validate::{validate_agent_id, validate_file_path};

/// A lock older than this is reclaimable by any agent.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(300);

/// Backoff bounds for `acquire` with a deadline.
const BACKOFF_BASE: Duration = Duration::from_millis(50);
const BACKOFF_CAP: Duration = Duration::from_millis(500);

/// On-disk lock record. `locked_at` is seconds since the epoch, stamped
/// from the monotonic clock so ages cannot shrink on a wall-clock step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub filepath: String,
    pub agent_id: String,
    pub locked_at: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Why an acquire did not go through. A structured result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct LockConflict {
    pub filepath: String,
    pub holder: String,
    pub reason: String,
    pub age: Duration,
}

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquire {
    /// The caller now holds the lock. `refreshed` marks a re-acquire of a
    /// lock the caller already held; `reclaimed` marks a stale takeover.
    Acquired { refreshed: bool, reclaimed: bool },
    Conflict(LockConflict),
}

impl Acquire {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }
}

/// A held lock with derived staleness, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockView {
    #[serde(flatten)]
    pub record: LockRecord,
    pub stale: bool,
    pub age_secs: u64,
    /// Whether the recorded holder PID is still running, when one was
    /// recorded. Diagnostic only; staleness is decided by age.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_alive: Option<bool>,
}

/// Checks whether a process with the given PID is alive.
fn is_process_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid_i32), None).is_ok()
}

/// Observed state of one lock file.
enum LockState {
    Missing,
    Corrupt,
    Held(LockRecord),
}

/// Manager for one project's lock directory.
pub struct LockManager {
    root: PathBuf,
    dir: PathBuf,
    stale_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(root: impl Into<PathBuf>, dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self { root: root.into(), dir: dir.into(), stale_timeout: DEFAULT_STALE_TIMEOUT, clock }
    }

    pub fn with_stale_timeout(mut self, stale_timeout: Duration) -> Self {
        self.stale_timeout = stale_timeout;
        self
    }

    pub fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }

    /// Acquire the lock on `path` for `agent_id`. With a zero `timeout` this
    /// is a single attempt; otherwise conflicting attempts retry with
    /// jittered exponential backoff until the deadline.
    pub fn acquire(
        &self,
        path: &str,
        agent_id: &str,
        reason: &str,
        timeout: Duration,
    ) -> Result<Acquire> {
        validate_agent_id(agent_id)?;
        let rel = self.relative(path)?;
        self.ensure_dir()?;

        let deadline =
            (!timeout.is_zero()).then(|| std::time::Instant::now() + timeout);
        let mut attempt: u32 = 0;

        loop {
            let outcome = self.acquire_once(&rel, agent_id, reason)?;
            let retry = match (&outcome, deadline) {
                (Acquire::Conflict(_), Some(deadline)) => std::time::Instant::now() < deadline,
                _ => false,
            };
            if !retry {
                return Ok(outcome);
            }
            let backoff = BACKOFF_BASE.saturating_mul(1 << attempt.min(4)).min(BACKOFF_CAP);
            let jitter = Duration::from_millis(rand::rng().random_range(0..25));
            std::thread::sleep(backoff + jitter);
            attempt = attempt.saturating_add(1);
        }
    }

    fn acquire_once(&self, rel: &str, agent_id: &str, reason: &str) -> Result<Acquire> {
        // Overlap scan first: an exact-path clash is caught by exclusive
        // create below, but a pattern held by someone else only shows up
        // here. Stale overlapping locks do not block.
        if let Some(conflict) = self.overlapping_conflict(rel, agent_id)? {
            return Ok(Acquire::Conflict(conflict));
        }

        let lock_path = self.lock_path(rel);
        // Two passes: a lock that vanishes between the failed create and the
        // read is retried once before giving up.
        for _ in 0..2 {
            match self.create_exclusive(&lock_path, rel, agent_id, reason) {
                Ok(()) => return Ok(Acquire::Acquired { refreshed: false, reclaimed: false }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(SwarmError::lock_io(rel, &e)),
            }

            match self.read_state(&lock_path)? {
                LockState::Missing => continue, // released mid-race; retry the create
                LockState::Corrupt => {
                    // Unparseable records are treated as absent. The file is
                    // still present, so reclaim it in place atomically.
                    warn!(filepath = %rel, "reclaiming corrupt lock file");
                    self.write_over(&lock_path, rel, agent_id, reason)?;
                    return Ok(Acquire::Acquired { refreshed: false, reclaimed: true });
                }
                LockState::Held(existing) if existing.agent_id == agent_id => {
                    self.write_over(&lock_path, rel, agent_id, reason)?;
                    return Ok(Acquire::Acquired { refreshed: true, reclaimed: false });
                }
                LockState::Held(existing) if self.is_stale(&existing) => {
                    self.write_over(&lock_path, rel, agent_id, reason)?;
                    return Ok(Acquire::Acquired { refreshed: false, reclaimed: true });
                }
                LockState::Held(existing) => {
                    return Ok(Acquire::Conflict(self.conflict_of(&existing)));
                }
            }
        }
        // Lost the create race twice in a row; report whoever holds it now.
        match self.read_record(&lock_path)? {
            Some(existing) => Ok(Acquire::Conflict(self.conflict_of(&existing))),
            None => Err(SwarmError::LockIo {
                filepath: rel.to_owned(),
                detail: "lock file flapping between create attempts".into(),
            }),
        }
    }

    /// Release `path`. Succeeds silently when the lock does not exist,
    /// refuses when another agent holds it.
    pub fn release(&self, path: &str, agent_id: &str) -> Result<()> {
        validate_agent_id(agent_id)?;
        let rel = self.relative(path)?;
        let lock_path = self.lock_path(&rel);

        match self.read_record(&lock_path)? {
            None => {
                if lock_path.exists() {
                    // Corrupt record: unowned garbage, clear it.
                    warn!(filepath = %rel, "removing corrupt lock file on release");
                    std::fs::remove_file(&lock_path)
                        .or_else(ignore_not_found)
                        .map_err(|e| SwarmError::lock_io(&rel, &e))?;
                }
                Ok(())
            }
            Some(record) if record.agent_id == agent_id => std::fs::remove_file(&lock_path)
                .or_else(ignore_not_found)
                .map_err(|e| SwarmError::lock_io(&rel, &e)),
            Some(record) => Err(SwarmError::LockDenied {
                filepath: rel,
                holder: record.agent_id,
                requester: agent_id.to_owned(),
            }),
        }
    }

    /// Refresh the owner's lock: timestamp and reason are overwritten via a
    /// sibling temp file and one atomic rename. The lock file is never
    /// absent during the operation, so no other agent can race in.
    pub fn refresh(&self, path: &str, agent_id: &str, reason: &str) -> Result<()> {
        validate_agent_id(agent_id)?;
        let rel = self.relative(path)?;
        let lock_path = self.lock_path(&rel);

        match self.read_record(&lock_path)? {
            Some(record) if record.agent_id != agent_id => Err(SwarmError::LockDenied {
                filepath: rel,
                holder: record.agent_id,
                requester: agent_id.to_owned(),
            }),
            // Held by us, or absent (keepalive after a sweep): both end with
            // our fresh record in place.
            _ => {
                self.ensure_dir()?;
                self.write_over(&lock_path, &rel, agent_id, reason)
            }
        }
    }

    /// Current holder of `path`, if any.
    pub fn who_has(&self, path: &str) -> Result<Option<LockView>> {
        let rel = self.relative(path)?;
        Ok(self.read_record(&self.lock_path(&rel))?.map(|r| self.view_of(r)))
    }

    /// All locks on disk. `include_stale` keeps entries past the stale
    /// timeout in the listing.
    pub fn list_all(&self, include_stale: bool) -> Result<Vec<LockView>> {
        let mut views: Vec<LockView> = self
            .read_all()?
            .into_iter()
            .map(|(_, record)| self.view_of(record))
            .filter(|view| include_stale || !view.stale)
            .collect();
        views.sort_by(|a, b| a.record.filepath.cmp(&b.record.filepath));
        Ok(views)
    }

    /// Remove every stale lock. Returns the records that were removed.
    pub fn cleanup_stale(&self) -> Result<Vec<LockRecord>> {
        let mut removed = Vec::new();
        for (path, record) in self.read_all()? {
            if !self.is_stale(&record) {
                continue;
            }
            // Re-read immediately before unlinking so a lock that was
            // reclaimed mid-sweep survives.
            match self.read_record(&path)? {
                Some(current) if current == record => {
                    std::fs::remove_file(&path)
                        .or_else(ignore_not_found)
                        .map_err(|e| SwarmError::lock_io(&record.filepath, &e))?;
                    removed.push(record);
                }
                _ => {}
            }
        }
        Ok(removed)
    }

    // -- internals ------------------------------------------------------------

    fn relative(&self, path: &str) -> Result<String> {
        let rel = validate_file_path(path, Some(&self.root))?;
        Ok(rel.to_string_lossy().into_owned())
    }

    fn ensure_dir(&self) -> Result<()> {
        fsio::ensure_private_dir(&self.dir)
            .map_err(|e| SwarmError::io(format!("create {}", self.dir.display()), &e))
    }

    fn lock_path(&self, rel: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", encode_name(rel)))
    }

    fn record_for(&self, rel: &str, agent_id: &str, reason: &str) -> LockRecord {
        LockRecord {
            filepath: rel.to_owned(),
            agent_id: agent_id.to_owned(),
            locked_at: self.clock.monotonic().as_secs_f64(),
            reason: reason.to_owned(),
            pid: Some(std::process::id()),
        }
    }

    fn create_exclusive(
        &self,
        lock_path: &Path,
        rel: &str,
        agent_id: &str,
        reason: &str,
    ) -> std::io::Result<()> {
        let record = self.record_for(rel, agent_id, reason);
        let json = serde_json::to_vec(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fsio::create_exclusive(lock_path, &json, fsio::FILE_MODE)
    }

    /// Rewrite the lock with our record via temp sibling + atomic rename.
    fn write_over(&self, lock_path: &Path, rel: &str, agent_id: &str, reason: &str) -> Result<()> {
        let record = self.record_for(rel, agent_id, reason);
        let json = serde_json::to_vec(&record)
            .map_err(|e| SwarmError::Io { context: "encode lock record".into(), detail: e.to_string() })?;
        fsio::write_atomic(lock_path, &json, fsio::FILE_MODE)
            .map_err(|e| SwarmError::lock_io(rel, &e))
    }

    /// Read one lock record. `Ok(None)` covers both an absent file and a
    /// corrupt one; corruption is logged.
    fn read_record(&self, lock_path: &Path) -> Result<Option<LockRecord>> {
        Ok(match self.read_state(lock_path)? {
            LockState::Held(record) => Some(record),
            LockState::Missing | LockState::Corrupt => None,
        })
    }

    fn read_state(&self, lock_path: &Path) -> Result<LockState> {
        match std::fs::read(lock_path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => Ok(LockState::Held(record)),
                Err(e) => {
                    warn!(path = %lock_path.display(), err = %e, "corrupt lock file");
                    Ok(LockState::Corrupt)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LockState::Missing),
            Err(e) => Err(SwarmError::lock_io(lock_path.to_string_lossy(), &e)),
        }
    }

    fn read_all(&self) -> Result<Vec<(PathBuf, LockRecord)>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SwarmError::io(format!("read {}", self.dir.display()), &e)),
        };

        let mut locks = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            if let Some(record) = self.read_record(&path)? {
                locks.push((path, record));
            }
        }
        Ok(locks)
    }

    fn is_stale(&self, record: &LockRecord) -> bool {
        self.age_of(record) > self.stale_timeout
    }

    fn age_of(&self, record: &LockRecord) -> Duration {
        let now = self.clock.monotonic().as_secs_f64();
        Duration::from_secs_f64((now - record.locked_at).max(0.0))
    }

    fn view_of(&self, record: LockRecord) -> LockView {
        let stale = self.is_stale(&record);
        let age_secs = self.age_of(&record).as_secs();
        let pid_alive = record.pid.map(is_process_alive);
        LockView { record, stale, age_secs, pid_alive }
    }

    fn conflict_of(&self, record: &LockRecord) -> LockConflict {
        LockConflict {
            filepath: record.filepath.clone(),
            holder: record.agent_id.clone(),
            reason: record.reason.clone(),
            age: self.age_of(record),
        }
    }

    /// A live lock by another agent whose claim overlaps `rel`, excluding
    /// the exact path (handled by exclusive create).
    fn overlapping_conflict(&self, rel: &str, agent_id: &str) -> Result<Option<LockConflict>> {
        if is_pattern(rel) {
            // Invalid patterns never reach the directory.
            GlobBuilder::new(rel).build().map_err(|e| {
                SwarmError::validation("path", rel, format!("invalid glob: {e}"))
            })?;
        }
        for (_, record) in self.read_all()? {
            if record.agent_id == agent_id
                || record.filepath == rel
                || self.is_stale(&record)
            {
                continue;
            }
            if claims_overlap(rel, &record.filepath) {
                return Ok(Some(self.conflict_of(&record)));
            }
        }
        Ok(None)
    }
}

fn ignore_not_found(e: std::io::Error) -> std::io::Result<()> {
    if e.kind() == std::io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(e)
    }
}

/// Deterministic, collision-free file name for a project-relative path.
/// Alphanumerics plus `._-` pass through; every other byte becomes `%XX`.
fn encode_name(rel: &str) -> String {
    let mut out = String::with_capacity(rel.len());
    for byte in rel.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(byte as char)
            }
            other => {
                out.push('%');
                out.push_str(&format!("{other:02X}"));
            }
        }
    }
    out
}

/// Whether a stored filepath is a glob pattern.
pub fn is_pattern(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// Symmetric overlap between two lock claims.
pub fn claims_overlap(a: &str, b: &str) -> bool {
    match (is_pattern(a), is_pattern(b)) {
        (false, false) => a == b,
        (true, false) => glob_matches(a, b),
        (false, true) => glob_matches(b, a),
        // Conservative: patterns conflict when their literal prefixes are
        // compatible. May report phantom conflicts, never misses an overlap
        // between prefix-disjoint trees.
        (true, true) => {
            let (pa, pb) = (literal_prefix(a), literal_prefix(b));
            pa.starts_with(&pb) || pb.starts_with(&pa)
        }
    }
}

/// Match a concrete path against a pattern. `**` crosses separators; a
/// single `*` does not. An unbuildable pattern counts as overlapping.
fn glob_matches(pattern: &str, path: &str) -> bool {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher().is_match(path))
        .unwrap_or(true)
}

/// Everything before the first glob metacharacter.
fn literal_prefix(pattern: &str) -> String {
    pattern.chars().take_while(|&c| !matches!(c, '*' | '?' | '[')).collect()
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
