// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn finds_git_marker_in_ancestor() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("repo");
    let nested = root.join("src").join("deep");
    std::fs::create_dir_all(&nested)?;
    std::fs::create_dir_all(root.join(".git"))?;

    let resolved = resolve_project_root(&nested, None)?;
    assert_eq!(resolved, root.canonicalize()?);
    Ok(())
}

#[test]
fn registry_file_is_a_marker() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("ws");
    let nested = root.join("sub");
    std::fs::create_dir_all(&nested)?;
    std::fs::write(root.join(REGISTRY_FILE), "{}")?;

    let resolved = resolve_project_root(&nested, None)?;
    assert_eq!(resolved, root.canonicalize()?);
    Ok(())
}

#[test]
fn falls_back_to_start_when_unmarked() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let start = dir.path().join("bare");
    std::fs::create_dir_all(&start)?;

    // An ancestor of the temp dir may carry a marker on a developer machine,
    // so the resolved root is either the start itself or one of its parents.
    let start = start.canonicalize()?;
    let resolved = resolve_project_root(&start, None)?;
    assert!(start.starts_with(&resolved), "{resolved:?} is not an ancestor of {start:?}");
    Ok(())
}

#[test]
fn override_wins_and_must_exist() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let elsewhere = tempfile::tempdir()?;

    let resolved = resolve_project_root(dir.path(), Some(elsewhere.path()))?;
    assert_eq!(resolved, elsewhere.path().canonicalize()?);

    let missing = dir.path().join("nope");
    let err = resolve_project_root(dir.path(), Some(&missing)).unwrap_err();
    assert_eq!(err.category(), "ValidationError");
    Ok(())
}

#[test]
fn state_paths_layout() {
    let paths = StatePaths::new("/work/project");
    assert_eq!(paths.registry(), PathBuf::from("/work/project/ACTIVE_AGENTS.json"));
    assert_eq!(paths.lock_dir(), PathBuf::from("/work/project/.agent_locks"));
    assert_eq!(paths.message_log(), PathBuf::from("/work/project/agent_messages.log"));
    assert_eq!(paths.coordination(), PathBuf::from("/work/project/COORDINATION.md"));
    assert_eq!(paths.config_toml(), PathBuf::from("/work/project/.claudeswarm.toml"));
}
