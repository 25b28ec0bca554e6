// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project root resolution and the layout of per-project state files.
//!
//! Everything the kernel persists lives directly under the project root, so
//! all subsystems agree on where shared state is by agreeing on the root.

use std::path::{Path, PathBuf};

use crate::error::{Result, SwarmError};

/// Registry of discovered agents.
pub const REGISTRY_FILE: &str = "ACTIVE_AGENTS.json";
/// Directory holding one file per held lock.
pub const LOCK_DIR: &str = ".agent_locks";
/// Append-only message log.
pub const MESSAGE_LOG: &str = "agent_messages.log";
/// Shared coordination document.
pub const COORDINATION_FILE: &str = "COORDINATION.md";
/// Optional project configuration (parsed).
pub const CONFIG_TOML: &str = ".claudeswarm.toml";
/// Optional project configuration (recognized as a marker only).
pub const CONFIG_YAML: &str = ".claudeswarm.yaml";
/// Environment variable overriding project-root autodetection.
pub const PROJECT_ROOT_ENV: &str = "SWARM_PROJECT_ROOT";

/// Markers that identify a directory as a project root, in detection order.
const ROOT_MARKERS: &[&str] = &[
    ".git",
    CONFIG_TOML,
    CONFIG_YAML,
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    REGISTRY_FILE,
    COORDINATION_FILE,
];

/// Walk from `start` up toward the filesystem root and return the first
/// directory containing a root marker. Falls back to `start` when nothing
/// matches. `override_root`, when given, wins unconditionally but must name
/// an existing directory.
pub fn resolve_project_root(start: &Path, override_root: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = override_root {
        if !root.is_dir() {
            return Err(SwarmError::validation(
                "project_root",
                root.display().to_string(),
                "override must name an existing directory",
            ));
        }
        return root
            .canonicalize()
            .map_err(|e| SwarmError::io(format!("canonicalize {}", root.display()), &e));
    }

    let start = start
        .canonicalize()
        .map_err(|e| SwarmError::io(format!("canonicalize {}", start.display()), &e))?;

    let mut dir: &Path = &start;
    loop {
        if ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Ok(start),
        }
    }
}

/// Locations of every state file for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.root.join(LOCK_DIR)
    }

    pub fn message_log(&self) -> PathBuf {
        self.root.join(MESSAGE_LOG)
    }

    pub fn coordination(&self) -> PathBuf {
        self.root.join(COORDINATION_FILE)
    }

    pub fn config_toml(&self) -> PathBuf {
        self.root.join(CONFIG_TOML)
    }

    pub fn config_yaml(&self) -> PathBuf {
        self.root.join(CONFIG_YAML)
    }

    /// Pending-acknowledgement table, flushed on shutdown for resume.
    pub fn pending_acks(&self) -> PathBuf {
        self.root.join(".agent_pending_acks.json")
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
