// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared coordination document.
//!
//! `COORDINATION.md` is parsed into an ordered list of top-level sections.
//! Every mutation replaces one section body, re-serializes the whole
//! document, and writes it atomically while holding the file-lock manager's
//! lock on the document. Unknown sections round-trip untouched; a missing
//! target section is appended.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Result, SwarmError};
use crate::fsio;
use crate::lock::{Acquire, LockManager};
use crate::project::COORDINATION_FILE;

/// Sections every fresh document starts with.
pub const STANDARD_SECTIONS: [&str; 5] =
    ["Sprint Goals", "Current Work", "Blocked Items", "Code Review Queue", "Decisions"];

/// Longest a writer waits for the document lock.
const DOC_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// One top-level section: the heading text (without `## `) and its body
/// lines, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub body: Vec<String>,
}

/// Parsed document: preamble lines before the first section, then sections
/// in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoordinationDoc {
    pub preamble: Vec<String>,
    pub sections: Vec<Section>,
}

impl CoordinationDoc {
    /// Parse markdown into sections split on `## ` headings.
    pub fn parse(text: &str) -> Self {
        let mut doc = CoordinationDoc::default();
        let mut current: Option<Section> = None;

        for line in text.lines() {
            if let Some(heading) = line.strip_prefix("## ") {
                if let Some(section) = current.take() {
                    doc.sections.push(section);
                }
                current = Some(Section { heading: heading.trim().to_owned(), body: Vec::new() });
            } else {
                match current {
                    Some(ref mut section) => section.body.push(line.to_owned()),
                    None => doc.preamble.push(line.to_owned()),
                }
            }
        }
        if let Some(section) = current.take() {
            doc.sections.push(section);
        }
        doc
    }

    /// Serialize back to markdown. Trailing blank lines of each body are
    /// normalized to exactly one separating blank line.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for line in &self.preamble {
            out.push_str(line);
            out.push('\n');
        }
        for section in &self.sections {
            out.push_str("## ");
            out.push_str(&section.heading);
            out.push('\n');
            let trimmed_len =
                section.body.iter().rposition(|l| !l.trim().is_empty()).map_or(0, |i| i + 1);
            for line in &section.body[..trimmed_len] {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    /// Fresh skeleton with the standard sections.
    pub fn skeleton() -> Self {
        Self {
            preamble: vec!["# Team Coordination".to_owned(), String::new()],
            sections: STANDARD_SECTIONS
                .iter()
                .map(|heading| Section { heading: (*heading).to_owned(), body: Vec::new() })
                .collect(),
        }
    }

    pub fn section(&self, heading: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.heading == heading)
    }

    /// Mutable body of `heading`, appending the section when absent.
    pub fn body_mut(&mut self, heading: &str) -> &mut Vec<String> {
        if let Some(index) = self.sections.iter().position(|s| s.heading == heading) {
            return &mut self.sections[index].body;
        }
        self.sections.push(Section { heading: heading.to_owned(), body: Vec::new() });
        let last = self.sections.len() - 1;
        &mut self.sections[last].body
    }

    /// Bullet items (`- `) of a section.
    pub fn bullet_items(&self, heading: &str) -> Vec<String> {
        self.section(heading)
            .map(|s| {
                s.body
                    .iter()
                    .filter_map(|l| l.trim_start().strip_prefix("- "))
                    .map(|item| item.trim().to_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rows of the Current Work table, skipping header and separator rows.
    pub fn work_rows(&self) -> Vec<WorkRow> {
        let Some(section) = self.section("Current Work") else {
            return Vec::new();
        };
        section
            .body
            .iter()
            .filter_map(|line| {
                let line = line.trim();
                let cells: Vec<&str> = line
                    .strip_prefix('|')?
                    .strip_suffix('|')?
                    .split('|')
                    .map(str::trim)
                    .collect();
                if cells.len() < 3 || cells[0].eq_ignore_ascii_case("agent") {
                    return None;
                }
                if cells.iter().all(|c| c.chars().all(|ch| ch == '-' || ch == ':')) {
                    return None;
                }
                Some(WorkRow {
                    agent: cells[0].to_owned(),
                    task: cells[1].to_owned(),
                    status: cells[2].to_owned(),
                })
            })
            .collect()
    }
}

/// One row of the Current Work table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkRow {
    pub agent: String,
    pub task: String,
    pub status: String,
}

/// Handle over the on-disk document, serializing writers through the lock
/// manager.
pub struct CoordinationFile {
    path: PathBuf,
    locks: Arc<LockManager>,
}

impl CoordinationFile {
    pub fn new(path: impl Into<PathBuf>, locks: Arc<LockManager>) -> Self {
        Self { path: path.into(), locks }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read the current document; absent file yields the skeleton.
    pub fn read(&self) -> Result<CoordinationDoc> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(CoordinationDoc::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CoordinationDoc::skeleton()),
            Err(e) => Err(SwarmError::io(format!("read {}", self.path.display()), &e)),
        }
    }

    /// Replace one section's body under the document lock. The lock is
    /// released on every path out, including mutation errors.
    pub fn update_section(
        &self,
        agent_id: &str,
        heading: &str,
        mutate: impl FnOnce(&mut Vec<String>),
    ) -> Result<()> {
        let acquired = self.locks.acquire(
            COORDINATION_FILE,
            agent_id,
            &format!("update {heading}"),
            DOC_LOCK_TIMEOUT,
        )?;
        if let Acquire::Conflict(conflict) = acquired {
            return Err(SwarmError::LockIo {
                filepath: COORDINATION_FILE.to_owned(),
                detail: format!(
                    "document locked by {} ({}s, {})",
                    conflict.holder,
                    conflict.age.as_secs(),
                    conflict.reason
                ),
            });
        }

        let result = (|| {
            let mut doc = self.read()?;
            mutate(doc.body_mut(heading));
            fsio::write_atomic(&self.path, doc.serialize().as_bytes(), fsio::FILE_MODE)
                .map_err(|e| SwarmError::io(format!("write {}", self.path.display()), &e))
        })();

        let released = self.locks.release(COORDINATION_FILE, agent_id);
        result.and(released)
    }

    /// Append a bullet item to a section.
    pub fn append_item(&self, agent_id: &str, heading: &str, item: &str) -> Result<()> {
        let entry = format!("- {item}");
        self.update_section(agent_id, heading, move |body| {
            if body.iter().all(|l| l.trim().is_empty()) {
                body.clear();
            }
            body.push(entry);
        })
    }

    /// Add or replace `agent_id`'s row in the Current Work table.
    pub fn set_work_row(&self, agent_id: &str, task: &str, status: &str) -> Result<()> {
        let agent = agent_id.to_owned();
        let row = format!("| {agent_id} | {task} | {status} |");
        self.update_section(agent_id, "Current Work", move |body| {
            let has_header = body.iter().any(|l| l.trim_start().starts_with('|'));
            if !has_header {
                body.clear();
                body.push("| Agent | Task | Status |".to_owned());
                body.push("| --- | --- | --- |".to_owned());
            }
            let needle = format!("| {agent} |");
            match body.iter().position(|l| l.trim_start().starts_with(&needle)) {
                Some(index) => body[index] = row,
                None => body.push(row),
            }
        })
    }
}

#[cfg(test)]
#[path = "coordination_tests.rs"]
mod tests;
