// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::{Clock, SystemClock};
use crate::test_support::ManualClock;

#[test]
fn system_clock_is_past_2020() {
    let epoch = SystemClock.epoch();
    assert!(epoch > Duration::from_secs(1_577_836_800));
}

#[test]
fn system_monotonic_tracks_epoch_and_never_regresses() {
    let clock = SystemClock;
    let first = clock.monotonic();
    assert!(first > Duration::from_secs(1_577_836_800));

    // Anchored to the wall clock, so the two readings stay close.
    let drift = clock.epoch().as_secs_f64() - first.as_secs_f64();
    assert!(drift.abs() < 5.0, "monotonic drifted {drift}s from wall clock");

    for _ in 0..100 {
        let next = clock.monotonic();
        assert!(next >= first, "monotonic reading moved backward");
    }
}

#[test]
fn manual_clock_advances_both_readings() {
    let clock = ManualClock::at_secs(1_700_000_000);
    assert_eq!(clock.epoch(), Duration::from_secs(1_700_000_000));
    assert_eq!(clock.monotonic(), Duration::from_secs(1_700_000_000));

    clock.advance(Duration::from_secs(90));
    assert_eq!(clock.epoch(), Duration::from_secs(1_700_000_090));
    assert_eq!(clock.monotonic(), Duration::from_secs(1_700_000_090));
}

#[test]
fn timestamp_is_rfc3339_utc() {
    let clock = ManualClock::at_secs(1_700_000_000);
    assert_eq!(clock.timestamp(), "2023-11-14T22:13:20Z");
}
