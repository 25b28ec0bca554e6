// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel configuration: built-in defaults, overlaid by the optional
//! project-local `.claudeswarm.toml`, overlaid by CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::ack::AckConfig;
use crate::error::{Result, SwarmError};
use crate::inspect::DEFAULT_ASSISTANT_PATTERN;
use crate::project::StatePaths;
use crate::ratelimit::RateLimitConfig;
use crate::registry::DEFAULT_STALE_THRESHOLD;
use crate::validate::{validate_retry_count, validate_timeout};

/// Resolved kernel settings.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Seconds of absence before an agent goes stale.
    pub stale_threshold: Duration,
    /// Seconds before a lock becomes reclaimable.
    pub lock_stale_timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub ack: AckConfig,
    /// Regex matched against descendant command lines to spot assistants.
    pub assistant_pattern: String,
    /// Exclude unknown-CWD agents even on hosts without CWD support.
    pub strict_project_isolation: bool,
    /// Include agents working outside this project root.
    pub cross_project: bool,
    /// Address an isolated tmux server socket instead of the default.
    pub tmux_socket: Option<PathBuf>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            lock_stale_timeout: crate::lock::DEFAULT_STALE_TIMEOUT,
            rate_limit: RateLimitConfig::default(),
            ack: AckConfig::default(),
            assistant_pattern: DEFAULT_ASSISTANT_PATTERN.to_owned(),
            strict_project_isolation: false,
            cross_project: false,
            tmux_socket: None,
        }
    }
}

/// On-disk configuration file shape. Every field optional; absent fields
/// keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub stale_threshold_secs: Option<u64>,
    pub lock_stale_secs: Option<u64>,
    pub rate_limit_max: Option<u32>,
    pub rate_limit_window_secs: Option<u64>,
    pub ack_retry_secs: Option<u64>,
    pub ack_max_retries: Option<u32>,
    pub assistant_pattern: Option<String>,
    pub strict_project_isolation: Option<bool>,
    pub cross_project: Option<bool>,
}

impl FileConfig {
    /// Load `.claudeswarm.toml` when present. A `.claudeswarm.yaml` sibling
    /// is recognized as a project marker but not parsed; its presence earns
    /// a warning.
    pub fn load(paths: &StatePaths) -> Result<Self> {
        if paths.config_yaml().exists() {
            warn!(
                path = %paths.config_yaml().display(),
                "YAML configuration is not parsed; use .claudeswarm.toml"
            );
        }
        let toml_path = paths.config_toml();
        let text = match std::fs::read_to_string(&toml_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(SwarmError::io(format!("read {}", toml_path.display()), &e)),
        };
        toml::from_str(&text).map_err(|e| {
            SwarmError::validation("config", toml_path.display().to_string(), e.to_string())
        })
    }
}

impl SwarmConfig {
    /// Overlay a file config, validating every provided value.
    pub fn apply(mut self, file: FileConfig) -> Result<Self> {
        if let Some(secs) = file.stale_threshold_secs {
            self.stale_threshold = Duration::from_secs(validate_timeout(secs)?);
        }
        if let Some(secs) = file.lock_stale_secs {
            self.lock_stale_timeout = Duration::from_secs(validate_timeout(secs)?);
        }
        match (file.rate_limit_max, file.rate_limit_window_secs) {
            (None, None) => {}
            (max, window) => {
                self.rate_limit = RateLimitConfig::new(
                    max.unwrap_or(self.rate_limit.max_per_window),
                    window.unwrap_or(self.rate_limit.window.as_secs()),
                )?;
            }
        }
        if let Some(secs) = file.ack_retry_secs {
            self.ack.retry_interval = Duration::from_secs(validate_timeout(secs)?);
        }
        if let Some(retries) = file.ack_max_retries {
            self.ack.max_retries = validate_retry_count(retries)?;
        }
        if let Some(pattern) = file.assistant_pattern {
            self.assistant_pattern = pattern;
        }
        if let Some(strict) = file.strict_project_isolation {
            self.strict_project_isolation = strict;
        }
        if let Some(cross) = file.cross_project {
            self.cross_project = cross;
        }
        Ok(self)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
