//! Tests for the async tick driver.
//!
//! Uses paused tokio time so `sleep_until` resolves as soon as every task
//! is idle.

use std::time::Duration;

use multiplay_tick::{TickConfig, TickDriver};

// =========================================================================
// Helpers
// =========================================================================

fn config_20hz() -> TickConfig {
    TickConfig {
        initial_jitter_us: 0,
        ..TickConfig::with_rate(20)
    }
}

// =========================================================================
// Creation
// =========================================================================

#[test]
fn test_driver_initial_state() {
    let driver = TickDriver::new(config_20hz());
    assert_eq!(driver.tick_count(), 0);
    assert_eq!(driver.tick_rate_hz(), 20);
    assert_eq!(driver.tick_duration(), Duration::from_millis(50));
    assert!(!driver.is_paused());
    assert_eq!(driver.metrics().total_ticks, 0);
}

#[test]
fn test_zero_rate_is_clamped_to_one_hz() {
    let driver = TickDriver::with_rate(0);
    assert_eq!(driver.tick_rate_hz(), 1);
    assert_eq!(driver.tick_duration(), Duration::from_secs(1));
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_increments_monotonically() {
    let mut driver = TickDriver::new(config_20hz());
    for expected in 1..=4 {
        let info = driver.wait_for_tick().await;
        assert_eq!(info.tick, expected);
        assert_eq!(info.dt, Duration::from_millis(50));
        assert!(!info.overrun);
    }
    assert_eq!(driver.metrics().total_ticks, 4);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_updates_metrics() {
    let mut driver = TickDriver::new(config_20hz());
    driver.wait_for_tick().await;
    driver.record_tick_end();
    assert!(driver.metrics().budget_utilization >= 0.0);
    // A second call without a new tick is ignored.
    driver.record_tick_end();
}

// =========================================================================
// Pause / resume
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_paused_driver_pends() {
    let mut driver = TickDriver::new(config_20hz());
    driver.wait_for_tick().await;
    driver.pause();
    let result = tokio::time::timeout(Duration::from_secs(1), driver.wait_for_tick()).await;
    assert!(result.is_err(), "paused driver should pend");
}

#[tokio::test(start_paused = true)]
async fn test_resume_continues_counting() {
    let mut driver = TickDriver::new(config_20hz());
    driver.wait_for_tick().await;
    driver.pause();
    driver.pause();
    driver.resume();
    assert!(!driver.is_paused());
    assert_eq!(driver.wait_for_tick().await.tick, 2);
}
