// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests of the `swarm` binary's CLI contract: exit codes,
//! stderr categories, JSON output, and on-disk state layout.

use swarm::clock::SystemClock;
use swarm::envelope::{Envelope, MessageType};

use swarm_specs::{exit_code, stderr, stdout, SwarmProject};

// -- locks --------------------------------------------------------------------

#[test]
fn lock_conflict_lifecycle() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;

    let acquired = project.run(&["acquire-file-lock", "src/auth.py", "agent-1", "impl"])?;
    assert_eq!(exit_code(&acquired), 0, "stderr: {}", stderr(&acquired));

    let conflicted = project.run(&["acquire-file-lock", "src/auth.py", "agent-2", "review"])?;
    assert_eq!(exit_code(&conflicted), 1);
    let err = stderr(&conflicted);
    assert!(err.contains("LockConflict"), "stderr: {err}");
    assert!(err.contains("agent-1"), "stderr must name the holder: {err}");
    assert!(err.contains("impl"), "stderr must carry the reason: {err}");

    let released = project.run(&["release-file-lock", "src/auth.py", "agent-1"])?;
    assert_eq!(exit_code(&released), 0);

    let reacquired = project.run(&["acquire-file-lock", "src/auth.py", "agent-2", "review"])?;
    assert_eq!(exit_code(&reacquired), 0);
    Ok(())
}

#[test]
fn release_by_non_owner_fails_and_keeps_lock() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    project.run(&["acquire-file-lock", "x", "agent-0", "w"])?;

    let denied = project.run(&["release-file-lock", "x", "agent-1"])?;
    assert_eq!(exit_code(&denied), 1);
    assert!(stderr(&denied).contains("LockDenied"), "stderr: {}", stderr(&denied));

    let who = project.run(&["who-has-lock", "x", "--json"])?;
    let view: serde_json::Value = serde_json::from_str(&stdout(&who))?;
    assert_eq!(view["agent_id"], "agent-0");
    Ok(())
}

#[test]
fn who_has_lock_json_schema() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    project.run(&["acquire-file-lock", "src/db.rs", "agent-3", "migration"])?;

    let who = project.run(&["who-has-lock", "src/db.rs", "--json"])?;
    assert_eq!(exit_code(&who), 0);
    let view: serde_json::Value = serde_json::from_str(&stdout(&who))?;
    assert_eq!(view["filepath"], "src/db.rs");
    assert_eq!(view["agent_id"], "agent-3");
    assert_eq!(view["reason"], "migration");
    assert!(view["locked_at"].is_number());
    assert_eq!(view["stale"], false);

    let unlocked = project.run(&["who-has-lock", "src/other.rs", "--json"])?;
    assert_eq!(stdout(&unlocked).trim(), "null");
    Ok(())
}

#[test]
fn glob_lock_blocks_matching_literal_via_cli() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let pattern = project.run(&["acquire-file-lock", "src/**/*.py", "agent-1", "refactor"])?;
    assert_eq!(exit_code(&pattern), 0, "stderr: {}", stderr(&pattern));

    let blocked = project.run(&["acquire-file-lock", "src/auth/token.py", "agent-2", "fix"])?;
    assert_eq!(exit_code(&blocked), 1);
    assert!(stderr(&blocked).contains("agent-1"));

    let elsewhere = project.run(&["acquire-file-lock", "docs/notes.md", "agent-2", "docs"])?;
    assert_eq!(exit_code(&elsewhere), 0);
    Ok(())
}

#[test]
fn list_and_cleanup_locks() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    project.run(&["acquire-file-lock", "a.rs", "agent-0", "one"])?;
    project.run(&["acquire-file-lock", "b.rs", "agent-1", "two"])?;

    let listed = project.run(&["list-all-locks", "--json"])?;
    let views: serde_json::Value = serde_json::from_str(&stdout(&listed))?;
    assert_eq!(views.as_array().map(Vec::len), Some(2));

    // Nothing is stale yet, so cleanup removes nothing.
    let swept = project.run(&["cleanup-stale-locks"])?;
    assert_eq!(exit_code(&swept), 0);
    assert!(stdout(&swept).contains("removed 0"));

    let after = project.run(&["list-all-locks", "--json"])?;
    let views: serde_json::Value = serde_json::from_str(&stdout(&after))?;
    assert_eq!(views.as_array().map(Vec::len), Some(2));
    Ok(())
}

#[test]
fn traversal_path_is_rejected_with_category() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let output = project.run(&["acquire-file-lock", "../escape.rs", "agent-0", "no"])?;
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("ValidationError"), "stderr: {}", stderr(&output));
    Ok(())
}

// -- discovery and messaging --------------------------------------------------

#[test]
fn discover_agents_fails_nonzero_without_multiplexer() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let output = project.run(&["discover-agents"])?;
    assert_eq!(exit_code(&output), 1);
    assert!(
        stderr(&output).contains("MultiplexerMissing"),
        "stderr: {}",
        stderr(&output)
    );
    // The registry file must not be created by a failed scan.
    assert!(!project.state_file("ACTIVE_AGENTS.json").exists());
    Ok(())
}

#[test]
fn list_agents_on_empty_project() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let output = project.run(&["list-agents"])?;
    assert_eq!(exit_code(&output), 0);
    assert!(stdout(&output).contains("no agents registered"));
    Ok(())
}

#[test]
fn send_message_to_unknown_recipient() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let output =
        project.run(&["send-message", "agent-0", "agent-9", "INFO", "hello there"])?;
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("AgentNotFound"), "stderr: {}", stderr(&output));
    Ok(())
}

#[test]
fn send_message_rejects_invalid_type() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let output = project.run(&["send-message", "agent-0", "agent-1", "SHOUT", "hello"])?;
    assert_ne!(exit_code(&output), 0);
    Ok(())
}

#[test]
fn check_messages_on_empty_log() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let output = project.run(&["check-messages"])?;
    assert_eq!(exit_code(&output), 0);
    assert!(stdout(&output).contains("no messages"));
    Ok(())
}

#[test]
fn check_messages_reads_seeded_log_and_flags_tampering() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let secret = project.seed_secret()?;

    let good = Envelope::new("agent-0", "agent-1", MessageType::Info, "honest", &SystemClock)
        .sign(&secret);
    let mut forged =
        Envelope::new("agent-0", "agent-1", MessageType::Info, "original", &SystemClock)
            .sign(&secret);
    forged.content = "tampered".into();

    let log = project.state_file("agent_messages.log");
    let mut lines = good.to_json().map_err(|e| anyhow::anyhow!("{e}"))?;
    lines.push('\n');
    lines.push_str(&forged.to_json().map_err(|e| anyhow::anyhow!("{e}"))?);
    lines.push('\n');
    std::fs::write(&log, lines)?;

    let output = project.run(&["check-messages", "--limit", "10"])?;
    assert_eq!(exit_code(&output), 0);
    let text = stdout(&output);
    assert!(text.contains("honest"));
    assert!(text.contains("tampered"));
    assert!(text.contains("[UNVERIFIED]"), "tampered line must be flagged: {text}");
    Ok(())
}

#[test]
fn whoami_outside_tmux_prints_unknown() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let output = project.run(&["whoami"])?;
    assert_eq!(exit_code(&output), 0);
    assert_eq!(stdout(&output).trim(), "unknown");
    Ok(())
}

// -- agent-notify -------------------------------------------------------------

#[test]
fn agent_notify_displays_verified_message() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let secret = project.seed_secret()?;
    let envelope =
        Envelope::new("agent-0", "agent-1", MessageType::Question, "need a review", &SystemClock)
            .sign(&secret);

    let payload = envelope.to_json().map_err(|e| anyhow::anyhow!("{e}"))?;
    let output = project.run(&["agent-notify", &payload])?;
    assert_eq!(exit_code(&output), 0, "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("QUESTION"));
    assert!(text.contains("agent-0"));
    assert!(text.contains("need a review"));
    assert!(text.contains(&envelope.message_id), "reply hint must carry the id: {text}");
    Ok(())
}

#[test]
fn agent_notify_rejects_tampered_payload() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let secret = project.seed_secret()?;
    let mut envelope =
        Envelope::new("agent-0", "agent-1", MessageType::Info, "genuine", &SystemClock)
            .sign(&secret);
    envelope.content = "altered".into();

    let payload = envelope.to_json().map_err(|e| anyhow::anyhow!("{e}"))?;
    let output = project.run(&["agent-notify", &payload])?;
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("SignatureInvalid"), "stderr: {}", stderr(&output));
    Ok(())
}

#[test]
fn agent_notify_rejects_garbage() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    project.seed_secret()?;
    let output = project.run(&["agent-notify", "not json at all"])?;
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("ValidationError"));
    Ok(())
}

// -- state layout -------------------------------------------------------------

#[test]
fn lock_state_lands_in_agent_locks_dir() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    project.run(&["acquire-file-lock", "src/lib.rs", "agent-0", "edit"])?;

    let lock_dir = project.state_file(".agent_locks");
    assert!(lock_dir.is_dir());
    let names: Vec<String> = std::fs::read_dir(&lock_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["src%2Flib.rs.lock"]);

    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(lock_dir.join(&names[0]))?)?;
    assert_eq!(record["filepath"], "src/lib.rs");
    assert_eq!(record["agent_id"], "agent-0");
    assert!(record["locked_at"].is_number());
    assert_eq!(record["reason"], "edit");
    Ok(())
}
