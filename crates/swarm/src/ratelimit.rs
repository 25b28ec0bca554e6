// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-sender sliding-window rate limiting.
//!
//! One mutex guards the whole table; check-and-record is the only entry
//! point for admission decisions, so callers cannot double-count or bypass
//! the window. State is in-process only: a second process using the same
//! sender id gets an independent budget.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::Result;
use crate::validate::validate_rate_limit_config;

/// Default budget: 10 messages per minute per sender.
pub const DEFAULT_MAX_PER_WINDOW: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Validated limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_per_window: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_per_window: DEFAULT_MAX_PER_WINDOW, window: DEFAULT_WINDOW }
    }
}

impl RateLimitConfig {
    pub fn new(max_per_window: u32, window_secs: u64) -> Result<Self> {
        let (max_per_window, window_secs) =
            validate_rate_limit_config(max_per_window, window_secs)?;
        Ok(Self { max_per_window, window: Duration::from_secs(window_secs) })
    }
}

/// Sliding-window limiter keyed by sender id. Timestamps are monotonic
/// readings, so a wall-clock step cannot widen or collapse a window.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, VecDeque<f64>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock, windows: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Admit one send for `sender` if the window has room, recording it.
    pub fn check_and_record(&self, sender: &str) -> bool {
        let now = self.clock.monotonic().as_secs_f64();
        let horizon = now - self.config.window.as_secs_f64();
        let mut windows = self.windows.lock();

        // Lazily drop aged entries, and evict senders idle for a full window.
        windows.retain(|_, stamps| {
            while stamps.front().is_some_and(|&t| t <= horizon) {
                stamps.pop_front();
            }
            !stamps.is_empty()
        });

        let stamps = windows.entry(sender.to_owned()).or_default();
        if stamps.len() >= self.config.max_per_window as usize {
            return false;
        }
        stamps.push_back(now);
        true
    }

    /// Seconds until `sender` has a free slot. Zero when a send would be
    /// admitted right now.
    pub fn seconds_until_slot(&self, sender: &str) -> u64 {
        let now = self.clock.monotonic().as_secs_f64();
        let horizon = now - self.config.window.as_secs_f64();
        let windows = self.windows.lock();

        let Some(stamps) = windows.get(sender) else {
            return 0;
        };
        let live = stamps.iter().filter(|&&t| t > horizon).count();
        if live < self.config.max_per_window as usize {
            return 0;
        }
        // The oldest live entry ages out first.
        stamps
            .iter()
            .find(|&&t| t > horizon)
            .map(|&oldest| (oldest - horizon).ceil().max(0.0) as u64)
            .unwrap_or(0)
    }

    /// Number of senders currently tracked, for diagnostics.
    pub fn tracked_senders(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
#[path = "ratelimit_tests.rs"]
mod tests;
