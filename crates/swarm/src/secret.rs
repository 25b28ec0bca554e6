// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared HMAC key storage under the user profile.
//!
//! The key lives at `~/.claude-swarm/secret` (directory 0700, file 0600).
//! First use generates 32 bytes from the system CSPRNG and writes them
//! atomically; later reads validate the length and refuse to regenerate a
//! damaged key on their own.

use std::path::PathBuf;

use ring::rand::SecureRandom;

use crate::error::{Result, SwarmError};
use crate::fsio;

/// Required key length in bytes.
pub const SECRET_LEN: usize = 32;

/// Directory under the user home holding swarm-wide secrets.
const SECRET_DIR: &str = ".claude-swarm";
const SECRET_FILE: &str = "secret";

/// Capability that yields the shared signing key.
pub trait SecretSource: Send + Sync {
    fn secret(&self) -> Result<[u8; SECRET_LEN]>;
}

/// File-backed secret store.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    /// Store at the default per-user location.
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| SwarmError::Secret { detail: "cannot determine home directory".into() })?;
        Ok(Self { path: home.join(SECRET_DIR).join(SECRET_FILE) })
    }

    /// Store at an explicit path. Used by tests and sandboxed deployments.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn generate(&self) -> Result<[u8; SECRET_LEN]> {
        let mut key = [0u8; SECRET_LEN];
        ring::rand::SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| SwarmError::Secret { detail: "system CSPRNG unavailable".into() })?;

        if let Some(parent) = self.path.parent() {
            fsio::ensure_private_dir(parent)
                .map_err(|e| SwarmError::io(format!("create {}", parent.display()), &e))?;
        }
        fsio::write_atomic(&self.path, &key, fsio::FILE_MODE)
            .map_err(|e| SwarmError::io(format!("write {}", self.path.display()), &e))?;
        Ok(key)
    }
}

impl SecretSource for FileSecretStore {
    fn secret(&self) -> Result<[u8; SECRET_LEN]> {
        match std::fs::read(&self.path) {
            Ok(bytes) => bytes.as_slice().try_into().map_err(|_| SwarmError::Secret {
                detail: format!(
                    "{} holds {} bytes, expected {SECRET_LEN}; remove the file to \
                     regenerate (this invalidates signatures from running agents)",
                    self.path.display(),
                    bytes.len()
                ),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.generate(),
            Err(e) => Err(SwarmError::io(format!("read {}", self.path.display()), &e)),
        }
    }
}

#[cfg(test)]
#[path = "secret_tests.rs"]
mod tests;
