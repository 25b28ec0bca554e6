// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic filesystem primitives shared by every on-disk mutator.
//!
//! The write pattern is always the same: sibling temp file with restricted
//! mode, write, fsync, atomic rename. No component deletes-then-rewrites a
//! live file.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Owner-only directory mode.
pub const DIR_MODE: u32 = 0o700;
/// Owner-only file mode.
pub const FILE_MODE: u32 = 0o600;

/// Write `bytes` to `path` atomically: temp sibling, fsync, rename.
///
/// The temp file is created with `mode` before any content is written, so a
/// concurrent reader never observes a partially written or world-readable
/// state file.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> std::io::Result<()> {
    let tmp = temp_sibling(path);
    let mut open = std::fs::OpenOptions::new();
    open.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        open.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let result = (|| {
        let mut file = open.open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Create `path` with `bytes` only if it does not already exist.
///
/// The content is staged in a temp sibling and published with `link(2)`, so
/// the file appears atomically with its full content; no reader can observe
/// an empty or partial file. Fails with `AlreadyExists` when another process
/// won the race.
pub fn create_exclusive(path: &Path, bytes: &[u8], mode: u32) -> std::io::Result<()> {
    let tmp = temp_sibling(path);
    let mut open = std::fs::OpenOptions::new();
    open.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        open.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let result = (|| {
        let mut file = open.open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        std::fs::hard_link(&tmp, path)
    })();

    let _ = std::fs::remove_file(&tmp);
    result
}

/// Create `dir` (and parents) if absent and restrict it to the owning user.
pub fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    set_mode(dir, DIR_MODE)
}

/// Apply `mode` to an existing path. No-op on platforms without Unix modes.
pub fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

/// Name a temp sibling unique to this process and write, kept in the same
/// directory so the final rename stays on one filesystem.
fn temp_sibling(path: &Path) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEQ: AtomicU64 = AtomicU64::new(0);

    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.tmp-{}-{seq}", std::process::id()))
}

#[cfg(test)]
#[path = "fsio_tests.rs"]
mod tests;
