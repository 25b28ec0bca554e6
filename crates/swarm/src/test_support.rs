// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory capability fakes for tests: a controllable clock, a scripted
//! pane source, and a scripted process inspector. Production wiring never
//! touches this module.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::{Result, SwarmError};
use crate::inspect::{AssistantProcess, Cwd, ProcessInspector};
use crate::tmux::{Multiplexer, Pane, PaneSource};

/// Clock that only moves when told to. Wall and monotonic readings advance
/// in lockstep, so tests exercise both paths with one `advance`.
pub struct ManualClock {
    epoch: Mutex<Duration>,
}

impl ManualClock {
    pub fn at_secs(secs: u64) -> Self {
        Self { epoch: Mutex::new(Duration::from_secs(secs)) }
    }

    pub fn advance(&self, by: Duration) {
        *self.epoch.lock() += by;
    }
}

impl Clock for ManualClock {
    fn epoch(&self) -> Duration {
        *self.epoch.lock()
    }

    fn monotonic(&self) -> Duration {
        *self.epoch.lock()
    }
}

/// Scripted multiplexer. Panes are added and removed by tests; sent
/// keystrokes are recorded for assertions.
#[derive(Default)]
pub struct FakePanes {
    panes: Mutex<Vec<Pane>>,
    /// Pane ids that exist but refuse keystrokes, simulating a dead pane.
    unreachable: Mutex<HashSet<String>>,
    /// When true, every call fails as if no server were running.
    down: Mutex<bool>,
    sent: Mutex<Vec<(String, String)>>,
}

impl FakePanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pane; the index coordinate is derived the way tmux reports it.
    pub fn add_pane(&self, pane_id: &str, session: &str, window: u32, index: u32, shell_pid: u32) {
        self.panes.lock().push(Pane {
            pane_id: pane_id.to_owned(),
            pane_index: format!("{session}:{window}.{index}"),
            session: session.to_owned(),
            window,
            shell_pid,
        });
    }

    pub fn remove_pane(&self, pane_id: &str) {
        self.panes.lock().retain(|p| p.pane_id != pane_id);
    }

    /// Keep the pane listed but make keystroke delivery fail.
    pub fn make_unreachable(&self, pane_id: &str) {
        self.unreachable.lock().insert(pane_id.to_owned());
    }

    pub fn set_down(&self, down: bool) {
        *self.down.lock() = down;
    }

    /// Keystrokes delivered so far, as `(pane_id, text)` pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    fn check_up(&self) -> Result<()> {
        if *self.down.lock() {
            Err(SwarmError::MultiplexerMissing)
        } else {
            Ok(())
        }
    }
}

impl PaneSource for FakePanes {
    fn list_panes<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<Pane>>> + Send + 'a>> {
        Box::pin(async move {
            self.check_up()?;
            Ok(self.panes.lock().clone())
        })
    }
}

impl Multiplexer for FakePanes {
    fn send_keys<'a>(
        &'a self,
        pane_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.check_up()?;
            let exists = self.panes.lock().iter().any(|p| p.pane_id == pane_id);
            if !exists || self.unreachable.lock().contains(pane_id) {
                return Err(SwarmError::MultiplexerFailure {
                    detail: format!("can't find pane: {pane_id}"),
                });
            }
            self.sent.lock().push((pane_id.to_owned(), text.to_owned()));
            Ok(())
        })
    }

    fn pane_exists<'a>(
        &'a self,
        pane_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            self.check_up()?;
            Ok(self.panes.lock().iter().any(|p| p.pane_id == pane_id))
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.check_up() })
    }
}

/// Scripted inspector mapping shell PIDs to assistant processes.
pub struct FakeInspector {
    by_shell: Mutex<HashMap<u32, AssistantProcess>>,
    cwd_supported: bool,
}

impl FakeInspector {
    pub fn new() -> Self {
        Self { by_shell: Mutex::new(HashMap::new()), cwd_supported: true }
    }

    pub fn without_cwd_support() -> Self {
        Self { by_shell: Mutex::new(HashMap::new()), cwd_supported: false }
    }

    /// Script an assistant with a known working directory under `shell_pid`.
    pub fn add_assistant(&self, shell_pid: u32, pid: u32, cwd: &std::path::Path) {
        self.by_shell.lock().insert(
            shell_pid,
            AssistantProcess {
                pid,
                command: "claude".to_owned(),
                cwd: Cwd::Known(cwd.to_path_buf()),
            },
        );
    }

    /// Script an assistant whose working directory cannot be determined.
    pub fn add_assistant_unknown_cwd(&self, shell_pid: u32, pid: u32) {
        self.by_shell.lock().insert(
            shell_pid,
            AssistantProcess { pid, command: "claude".to_owned(), cwd: Cwd::Unknown },
        );
    }

    pub fn remove_assistant(&self, shell_pid: u32) {
        self.by_shell.lock().remove(&shell_pid);
    }
}

impl Default for FakeInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector for FakeInspector {
    fn assistant_under(&self, shell_pid: u32) -> Result<Option<AssistantProcess>> {
        Ok(self.by_shell.lock().get(&shell_pid).cloned())
    }

    fn cwd_supported(&self) -> bool {
        self.cwd_supported
    }
}

/// Fixed secret for signing tests.
pub struct StaticSecret(pub [u8; crate::secret::SECRET_LEN]);

impl crate::secret::SecretSource for StaticSecret {
    fn secret(&self) -> Result<[u8; crate::secret::SECRET_LEN]> {
        Ok(self.0)
    }
}
