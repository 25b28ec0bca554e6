// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process inspection: find the assistant process running under a pane's
//! shell and discover its working directory.
//!
//! The descendant walk is breadth-first and depth-bounded. Failure to read
//! any single process is never fatal; the process is skipped or its CWD
//! reported as unknown. The inspector never reports its own process or the
//! chain of its ancestors.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

use crate::error::{Result, SwarmError};

/// Default pattern matching assistant command lines.
pub const DEFAULT_ASSISTANT_PATTERN: &str = r"(^|/)claude(\s|$)";

/// Bound on the BFS depth below a pane's shell.
const MAX_DEPTH: usize = 6;

/// Working directory of a process, as far as the platform can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cwd {
    Known(PathBuf),
    Unknown,
}

/// An assistant process discovered under a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantProcess {
    pub pid: u32,
    pub command: String,
    pub cwd: Cwd,
}

/// Capability to discover a process's working directory.
pub trait ProcessLocator: Send + Sync {
    fn cwd_of(&self, pid: u32) -> Cwd;

    /// Whether this platform can report working directories at all. When
    /// false, unknown CWDs are not evidence of anything.
    fn supported(&self) -> bool;
}

/// Capability to find the assistant under a pane's shell.
pub trait ProcessInspector: Send + Sync {
    fn assistant_under(&self, shell_pid: u32) -> Result<Option<AssistantProcess>>;

    /// Whether CWD discovery is supported on this host.
    fn cwd_supported(&self) -> bool;
}

/// Production inspector over the OS process table.
pub struct ProcInspector {
    pattern: Regex,
    locator: Arc<dyn ProcessLocator>,
}

impl std::fmt::Debug for ProcInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcInspector")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl ProcInspector {
    /// Build with the given assistant command pattern and the platform's
    /// native locator.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            SwarmError::validation("assistant_pattern", pattern, e.to_string())
        })?;
        Ok(Self { pattern, locator: platform_locator() })
    }

    /// Substitute a locator. Used by tests.
    pub fn with_locator(mut self, locator: Arc<dyn ProcessLocator>) -> Self {
        self.locator = locator;
        self
    }
}

impl ProcessInspector for ProcInspector {
    fn assistant_under(&self, shell_pid: u32) -> Result<Option<AssistantProcess>> {
        let table = process_table()?;
        let excluded = self_and_ancestors(&table);

        // Depth-bounded BFS from the shell. The first matching descendant
        // (closest to the shell) wins.
        let mut queue: VecDeque<(u32, usize)> = VecDeque::from([(shell_pid, 0)]);
        let mut seen: HashSet<u32> = HashSet::from([shell_pid]);

        while let Some((pid, depth)) = queue.pop_front() {
            if depth >= MAX_DEPTH {
                continue;
            }
            for &child in table.children.get(&pid).map(Vec::as_slice).unwrap_or(&[]) {
                if !seen.insert(child) || excluded.contains(&child) {
                    continue;
                }
                if let Some(command) = command_line(child) {
                    if self.pattern.is_match(&command) {
                        return Ok(Some(AssistantProcess {
                            pid: child,
                            command,
                            cwd: self.locator.cwd_of(child),
                        }));
                    }
                }
                queue.push_back((child, depth + 1));
            }
        }
        Ok(None)
    }

    fn cwd_supported(&self) -> bool {
        self.locator.supported()
    }
}

/// Snapshot of parent/child edges in the process table.
struct ProcessTable {
    children: HashMap<u32, Vec<u32>>,
    parent: HashMap<u32, u32>,
}

/// The inspector's own PID plus every ancestor, all of which are excluded
/// from discovery results.
fn self_and_ancestors(table: &ProcessTable) -> HashSet<u32> {
    let mut excluded = HashSet::new();
    let mut pid = std::process::id();
    // Bounded in case of a cyclic snapshot from a racing /proc scan.
    for _ in 0..128 {
        if !excluded.insert(pid) || pid <= 1 {
            break;
        }
        match table.parent.get(&pid) {
            Some(&ppid) => pid = ppid,
            None => break,
        }
    }
    excluded
}

#[cfg(target_os = "linux")]
fn process_table() -> Result<ProcessTable> {
    let entries = std::fs::read_dir("/proc")
        .map_err(|e| SwarmError::io("read /proc", &e))?;

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut parent: HashMap<u32, u32> = HashMap::new();

    for entry in entries.filter_map(|e| e.ok()) {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        let Some(ppid) = stat_ppid(pid) else {
            continue;
        };
        parent.insert(pid, ppid);
        children.entry(ppid).or_default().push(pid);
    }
    Ok(ProcessTable { children, parent })
}

/// Parse the parent PID out of `/proc/<pid>/stat`. The comm field may
/// contain spaces and parentheses, so split after the last `)`.
#[cfg(target_os = "linux")]
fn stat_ppid(pid: u32) -> Option<u32> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

#[cfg(target_os = "linux")]
fn command_line(pid: u32) -> Option<String> {
    let raw = std::fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    if raw.is_empty() {
        return None;
    }
    let joined = raw
        .split(|&b| b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

#[cfg(not(target_os = "linux"))]
fn process_table() -> Result<ProcessTable> {
    // Platforms without /proc enumerate via `ps` with a fixed format.
    let output = bounded_output(
        std::process::Command::new("ps").args(["-axo", "pid=,ppid="]),
        std::time::Duration::from_secs(3),
    )
    .map_err(|e| SwarmError::io("run ps", &e))?;

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut parent: HashMap<u32, u32> = HashMap::new();
    for line in String::from_utf8_lossy(&output).lines() {
        let mut fields = line.split_whitespace();
        let (Some(pid), Some(ppid)) = (fields.next(), fields.next()) else {
            continue;
        };
        let (Ok(pid), Ok(ppid)) = (pid.parse::<u32>(), ppid.parse::<u32>()) else {
            continue;
        };
        parent.insert(pid, ppid);
        children.entry(ppid).or_default().push(pid);
    }
    Ok(ProcessTable { children, parent })
}

#[cfg(not(target_os = "linux"))]
fn command_line(pid: u32) -> Option<String> {
    let output = bounded_output(
        std::process::Command::new("ps").args(["-o", "command=", "-p", &pid.to_string()]),
        std::time::Duration::from_secs(2),
    )
    .ok()?;
    let command = String::from_utf8_lossy(&output).trim().to_owned();
    (!command.is_empty()).then_some(command)
}

/// Run a subprocess with a hard deadline, reading stdout from a separate
/// thread so a chatty child cannot deadlock against a full pipe.
#[cfg(not(target_os = "linux"))]
fn bounded_output(
    cmd: &mut std::process::Command,
    budget: std::time::Duration,
) -> std::io::Result<Vec<u8>> {
    use std::io::Read;

    let mut child = cmd
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .spawn()?;

    let mut stdout = child.stdout.take();
    let reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut out) = stdout {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });

    let deadline = std::time::Instant::now() + budget;
    loop {
        if child.try_wait()?.is_some() {
            break;
        }
        if std::time::Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "subprocess timeout"));
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    Ok(reader.join().unwrap_or_default())
}

/// Locator for the current platform.
pub fn platform_locator() -> Arc<dyn ProcessLocator> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(ProcCwdLocator)
    }
    #[cfg(target_os = "macos")]
    {
        Arc::new(LsofCwdLocator)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Arc::new(UnsupportedLocator)
    }
}

/// Linux: `/proc/<pid>/cwd` is a symlink to the working directory.
#[cfg(target_os = "linux")]
pub struct ProcCwdLocator;

#[cfg(target_os = "linux")]
impl ProcessLocator for ProcCwdLocator {
    fn cwd_of(&self, pid: u32) -> Cwd {
        match std::fs::read_link(format!("/proc/{pid}/cwd")) {
            Ok(path) => Cwd::Known(path),
            Err(_) => Cwd::Unknown,
        }
    }

    fn supported(&self) -> bool {
        true
    }
}

/// macOS: ask lsof for the single `cwd` descriptor of one PID.
#[cfg(target_os = "macos")]
pub struct LsofCwdLocator;

#[cfg(target_os = "macos")]
impl ProcessLocator for LsofCwdLocator {
    fn cwd_of(&self, pid: u32) -> Cwd {
        let output = bounded_output(
            std::process::Command::new("lsof")
                .args(["-a", "-p", &pid.to_string(), "-d", "cwd", "-Fn"]),
            std::time::Duration::from_secs(3),
        );
        let Ok(output) = output else {
            return Cwd::Unknown;
        };
        String::from_utf8_lossy(&output)
            .lines()
            .find_map(|line| line.strip_prefix('n').map(|p| Cwd::Known(PathBuf::from(p))))
            .unwrap_or(Cwd::Unknown)
    }

    fn supported(&self) -> bool {
        true
    }
}

/// Platforms with no way to inspect another process's working directory.
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub struct UnsupportedLocator;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
impl ProcessLocator for UnsupportedLocator {
    fn cwd_of(&self, _pid: u32) -> Cwd {
        Cwd::Unknown
    }

    fn supported(&self) -> bool {
        false
    }
}

#[cfg(test)]
#[path = "inspect_tests.rs"]
mod tests;
