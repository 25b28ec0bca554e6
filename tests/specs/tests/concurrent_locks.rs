// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process lock safety: real `swarm` processes race for the same
//! path, which is the deployment model the lock manager exists for.

use std::process::{Command, Stdio};

use swarm_specs::{exit_code, swarm_binary, SwarmProject};

/// Processes racing for one lock in each round.
const RACERS: usize = 6;
/// Rounds of the race; each round uses a fresh path.
const ROUNDS: usize = 5;

#[test]
fn concurrent_processes_one_winner_per_path() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;
    let binary = swarm_binary();
    anyhow::ensure!(binary.exists(), "swarm binary not found at {}", binary.display());

    for round in 0..ROUNDS {
        let path = format!("contended-{round}.rs");
        let mut children = Vec::new();
        for racer in 0..RACERS {
            let child = Command::new(&binary)
                .args([
                    "acquire-file-lock",
                    &path,
                    &format!("agent-{racer}"),
                    "race",
                ])
                .current_dir(project.root())
                .env("SWARM_PROJECT_ROOT", project.root())
                .env("SWARM_LOG_LEVEL", "error")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?;
            children.push(child);
        }

        let mut winners = 0;
        for mut child in children {
            if child.wait()?.success() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "round {round}: exactly one process may win");
    }
    Ok(())
}

#[test]
fn winner_survives_and_losers_see_its_record() -> anyhow::Result<()> {
    let project = SwarmProject::new()?;

    let first = project.run(&["acquire-file-lock", "shared.rs", "agent-0", "setup"])?;
    assert_eq!(exit_code(&first), 0);

    // Ten sequential contenders all lose without corrupting the record.
    for i in 1..=10 {
        let losing = project.run(&["acquire-file-lock", "shared.rs", &format!("agent-{i}"), "want"])?;
        assert_eq!(exit_code(&losing), 1);
    }

    let who = project.run(&["who-has-lock", "shared.rs", "--json"])?;
    let view: serde_json::Value = serde_json::from_str(&swarm_specs::stdout(&who))?;
    assert_eq!(view["agent_id"], "agent-0");
    assert_eq!(view["reason"], "setup");
    Ok(())
}
