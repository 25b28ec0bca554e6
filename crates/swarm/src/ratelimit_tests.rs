// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::test_support::ManualClock;

fn limiter(max: u32, window_secs: u64, clock: Arc<ManualClock>) -> RateLimiter {
    let config = RateLimitConfig::new(max, window_secs).unwrap();
    RateLimiter::new(config, clock)
}

#[test]
fn tenth_send_passes_eleventh_fails() {
    let clock = Arc::new(ManualClock::at_secs(0));
    let limiter = limiter(10, 60, Arc::clone(&clock));

    for i in 0..10 {
        assert!(limiter.check_and_record("agent-0"), "send {i} should pass");
    }
    assert!(!limiter.check_and_record("agent-0"), "11th send must be rejected");
}

#[test]
fn window_slides_past_oldest_entry() {
    let clock = Arc::new(ManualClock::at_secs(0));
    let limiter = limiter(3, 10, Arc::clone(&clock));

    assert!(limiter.check_and_record("agent-0"));
    assert!(limiter.check_and_record("agent-0"));
    assert!(limiter.check_and_record("agent-0"));

    clock.advance(Duration::from_secs(1));
    assert!(!limiter.check_and_record("agent-0"), "4th send at t=1 must fail");

    clock.advance(Duration::from_secs(10));
    assert!(limiter.check_and_record("agent-0"), "send at t=11 passes after slide");
}

#[test]
fn budgets_are_per_sender() {
    let clock = Arc::new(ManualClock::at_secs(0));
    let limiter = limiter(1, 60, Arc::clone(&clock));

    assert!(limiter.check_and_record("agent-0"));
    assert!(!limiter.check_and_record("agent-0"));
    assert!(limiter.check_and_record("agent-1"), "other senders keep their budget");
}

#[test]
fn seconds_until_slot_counts_down() {
    let clock = Arc::new(ManualClock::at_secs(100));
    let limiter = limiter(2, 30, Arc::clone(&clock));

    assert_eq!(limiter.seconds_until_slot("agent-0"), 0);
    limiter.check_and_record("agent-0");
    limiter.check_and_record("agent-0");
    assert_eq!(limiter.seconds_until_slot("agent-0"), 30);

    clock.advance(Duration::from_secs(12));
    assert_eq!(limiter.seconds_until_slot("agent-0"), 18);

    clock.advance(Duration::from_secs(19));
    assert_eq!(limiter.seconds_until_slot("agent-0"), 0);
}

#[test]
fn idle_senders_are_evicted() {
    let clock = Arc::new(ManualClock::at_secs(0));
    let limiter = limiter(5, 10, Arc::clone(&clock));

    limiter.check_and_record("agent-0");
    limiter.check_and_record("agent-1");
    assert_eq!(limiter.tracked_senders(), 2);

    clock.advance(Duration::from_secs(11));
    limiter.check_and_record("agent-2");
    assert_eq!(limiter.tracked_senders(), 1, "aged-out senders are dropped");
}

#[test]
fn concurrent_checks_admit_exactly_the_budget() {
    let clock = Arc::new(ManualClock::at_secs(0));
    let limiter = Arc::new(limiter(50, 60, clock));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let limiter = Arc::clone(&limiter);
        handles.push(std::thread::spawn(move || {
            (0..20).filter(|_| limiter.check_and_record("agent-0")).count()
        }));
    }
    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap_or(0)).sum();
    assert_eq!(admitted, 50);
}
