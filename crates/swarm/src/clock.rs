// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock capability. Stale detection, lock ages, rate limiting, and retry
//! scheduling all read time through this trait so tests can drive it
//! explicitly. Serialized timestamps are RFC 3339 UTC from the wall clock;
//! interval math uses the monotonic reading, which never moves backward.

use std::sync::LazyLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};

/// Source of wall-clock and monotonic time.
pub trait Clock: Send + Sync {
    /// Wall-clock time since the Unix epoch. Used only where a timestamp is
    /// serialized for humans or other processes to read.
    fn epoch(&self) -> Duration;

    /// Monotonically advancing time since the Unix epoch: the wall clock is
    /// sampled once per process and advanced by a monotonic timer from then
    /// on. Interval math (lock ages, rate windows, retry schedules) reads
    /// this so a backward wall-clock step cannot make elapsed time shrink,
    /// while on-disk stamps stay comparable across processes.
    fn monotonic(&self) -> Duration;

    /// Current instant as a UTC datetime.
    fn now_utc(&self) -> DateTime<Utc> {
        let epoch = self.epoch();
        Utc.timestamp_opt(epoch.as_secs() as i64, epoch.subsec_nanos())
            .single()
            .unwrap_or_default()
    }

    /// RFC 3339 timestamp with second precision, for on-disk records.
    fn timestamp(&self) -> String {
        self.now_utc().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}

/// Production clock backed by `SystemTime` and `Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

/// Process-wide anchor pairing one wall-clock sample with the `Instant` it
/// was taken at. Everything monotonic is measured from here.
static MONOTONIC_ANCHOR: LazyLock<(Duration, Instant)> = LazyLock::new(|| {
    let wall = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (wall, Instant::now())
});

impl Clock for SystemClock {
    fn epoch(&self) -> Duration {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
    }

    fn monotonic(&self) -> Duration {
        let (wall, instant) = *MONOTONIC_ANCHOR;
        wall + instant.elapsed()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
