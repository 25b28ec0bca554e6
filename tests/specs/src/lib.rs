// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary tests.
//!
//! Spawns the real `swarm` binary against a temp project directory with an
//! isolated home and an unreachable tmux socket, so every run is hermetic:
//! no real tmux server, registry, or user secret is ever touched.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Resolve the path to the compiled `swarm` binary.
pub fn swarm_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("swarm")
}

/// A temp project directory plus the isolated environment every spawned
/// `swarm` invocation runs in.
pub struct SwarmProject {
    dir: tempfile::TempDir,
    home: tempfile::TempDir,
}

impl SwarmProject {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { dir: tempfile::tempdir()?, home: tempfile::tempdir()? })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a state file under the project root.
    pub fn state_file(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    /// Seed the shared secret in the isolated home, returning its bytes.
    pub fn seed_secret(&self) -> anyhow::Result<[u8; 32]> {
        let secret = [42u8; 32];
        let dir = self.home.path().join(".claude-swarm");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("secret"), secret)?;
        Ok(secret)
    }

    /// Run `swarm <args>` in the project, fully isolated.
    pub fn run(&self, args: &[&str]) -> anyhow::Result<Output> {
        let binary = swarm_binary();
        anyhow::ensure!(binary.exists(), "swarm binary not found at {}", binary.display());

        let output = Command::new(&binary)
            .args(args)
            .current_dir(self.root())
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("HOME", self.home.path())
            .env("SWARM_PROJECT_ROOT", self.root())
            // A socket under an empty directory: connecting always fails,
            // whether or not tmux is installed on the host.
            .env("SWARM_TMUX_SOCKET", self.home.path().join("no-server").join("sock"))
            .env("SWARM_LOG_LEVEL", "error")
            .output()?;
        Ok(output)
    }
}

/// Convenience accessors over a finished process.
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub fn exit_code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}
