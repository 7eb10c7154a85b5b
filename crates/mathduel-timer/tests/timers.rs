//! Integration tests for deadlines, the sweep scheduler, and the clock.
//!
//! Uses `start_paused = true` so Tokio auto-advances the clock whenever
//! every task is idle; sleeps resolve instantly in real time.

use std::time::Duration;

use mathduel_timer::{Deadline, SweepConfig, SweepScheduler, unix_millis};
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

fn no_jitter(period: Duration) -> SweepConfig {
    SweepConfig {
        period,
        initial_jitter: Duration::ZERO,
    }
}

// =========================================================================
// Deadline
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_unarmed_deadline_never_fires() {
    let mut d = Deadline::new();
    let result = tokio::time::timeout(Duration::from_secs(3600), d.wait()).await;
    assert!(result.is_err(), "unarmed deadline should pend forever");
}

#[tokio::test(start_paused = true)]
async fn test_armed_deadline_fires_after_duration() {
    let mut d = Deadline::new();
    let started = Instant::now();
    d.arm(Duration::from_secs(60));
    assert!(d.is_armed());

    d.wait().await;

    assert!(started.elapsed() >= Duration::from_secs(60));
    assert!(!d.is_armed(), "deadline disarms after firing");
}

#[tokio::test(start_paused = true)]
async fn test_fired_deadline_does_not_fire_twice() {
    let mut d = Deadline::new();
    d.arm(Duration::from_secs(1));
    d.wait().await;

    let again = tokio::time::timeout(Duration::from_secs(10), d.wait()).await;
    assert!(again.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_disarm_cancels_pending_fire() {
    let mut d = Deadline::new();
    d.arm(Duration::from_secs(5));
    d.disarm();
    assert!(!d.is_armed());

    let result = tokio::time::timeout(Duration::from_secs(30), d.wait()).await;
    assert!(result.is_err(), "disarmed deadline should not fire");
}

#[tokio::test(start_paused = true)]
async fn test_rearm_replaces_previous_instant() {
    let mut d = Deadline::new();
    let started = Instant::now();
    d.arm(Duration::from_secs(5));
    d.arm(Duration::from_secs(20));

    d.wait().await;
    assert!(started.elapsed() >= Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stays_armed_when_wait_is_dropped() {
    let mut d = Deadline::new();
    d.arm(Duration::from_secs(10));

    tokio::select! {
        () = d.wait() => panic!("should not fire before the sleep"),
        () = tokio::time::sleep(Duration::from_secs(1)) => {}
    }

    assert!(d.is_armed());
    let left = d.remaining().unwrap();
    assert!(left <= Duration::from_secs(9));
    d.wait().await;
}

// =========================================================================
// SweepScheduler
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_sweep_fires_every_period() {
    let mut s = SweepScheduler::new(no_jitter(Duration::from_secs(4)));
    let started = Instant::now();

    for expected in 1..=3 {
        let info = s.tick().await;
        assert_eq!(info.sweep, expected);
    }

    assert_eq!(s.sweep_count(), 3);
    assert_eq!(s.period(), Duration::from_secs(4));
    assert!(started.elapsed() >= Duration::from_secs(12));
}

#[tokio::test(start_paused = true)]
async fn test_first_sweep_waits_a_full_period() {
    let mut s = SweepScheduler::new(no_jitter(Duration::from_secs(4)));
    let early = tokio::time::timeout(Duration::from_secs(3), s.tick()).await;
    assert!(early.is_err(), "first sweep must not fire immediately");
}

#[tokio::test(start_paused = true)]
async fn test_jitter_delays_first_sweep_within_bound() {
    let mut s = SweepScheduler::new(SweepConfig {
        period: Duration::from_secs(4),
        initial_jitter: Duration::from_millis(500),
    });
    let started = Instant::now();
    s.tick().await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(4));
    assert!(elapsed < Duration::from_millis(4_500));
}

#[tokio::test(start_paused = true)]
async fn test_slow_sweep_skips_instead_of_bursting() {
    let mut s = SweepScheduler::new(no_jitter(Duration::from_secs(4)));
    s.tick().await;

    // Stall for several periods.
    tokio::time::sleep(Duration::from_secs(13)).await;
    s.tick().await;

    // The next tick is on the regular grid, not immediately.
    let started = Instant::now();
    s.tick().await;
    assert!(started.elapsed() > Duration::ZERO);
}

// =========================================================================
// Clock
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_unix_millis_follows_paused_clock() {
    let before = unix_millis();
    tokio::time::sleep(Duration::from_secs(5)).await;
    let after = unix_millis();
    assert!(after >= before + 4_000, "clock should advance with tokio time");
}

#[tokio::test(start_paused = true)]
async fn test_unix_millis_is_frozen_while_paused_and_idle() {
    let a = unix_millis();
    let b = unix_millis();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_unix_millis_is_a_plausible_epoch() {
    // 2020-01-01 in unix millis.
    assert!(unix_millis() > 1_577_836_800_000);
}
