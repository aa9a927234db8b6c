//! Tests for the cooperative job scheduler.
//!
//! Time is synthetic: every test builds `Instant`s from one base value so
//! results do not depend on the machine clock.

use std::time::{Duration, Instant};

use multiplay_tick::{JobScheduler, TickPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Gather,
    Ping,
    Reconnect,
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// =========================================================================
// One-shot jobs
// =========================================================================

#[test]
fn test_once_fires_exactly_once_at_deadline() {
    let t0 = Instant::now();
    let mut jobs = JobScheduler::default();
    jobs.schedule_once(Kind::Reconnect, t0 + ms(2000));

    assert!(jobs.due(t0 + ms(1999)).is_empty());
    assert_eq!(jobs.due(t0 + ms(2000)), vec![Kind::Reconnect]);
    assert!(jobs.due(t0 + ms(5000)).is_empty());
    assert!(!jobs.is_scheduled(Kind::Reconnect));
}

#[test]
fn test_cancel_removes_pending_once() {
    let t0 = Instant::now();
    let mut jobs = JobScheduler::default();
    let id = jobs.schedule_once(Kind::Reconnect, t0 + ms(10));
    assert!(jobs.cancel(id));
    assert!(!jobs.cancel(id));
    assert!(jobs.due(t0 + ms(20)).is_empty());
}

// =========================================================================
// Periodic jobs
// =========================================================================

#[test]
fn test_periodic_fires_each_period() {
    let t0 = Instant::now();
    let mut jobs = JobScheduler::default();
    jobs.schedule_periodic(Kind::Gather, t0, ms(50));

    assert_eq!(jobs.due(t0), vec![Kind::Gather]);
    assert!(jobs.due(t0 + ms(49)).is_empty());
    assert_eq!(jobs.due(t0 + ms(50)), vec![Kind::Gather]);
    assert!(jobs.is_scheduled(Kind::Gather));
}

#[test]
fn test_skip_runs_once_after_stall() {
    let t0 = Instant::now();
    let mut jobs = JobScheduler::new(TickPolicy::Skip);
    jobs.schedule_periodic(Kind::Gather, t0, ms(50));
    jobs.due(t0);

    assert_eq!(jobs.due(t0 + ms(260)), vec![Kind::Gather]);
    // Rescheduled from the stall, not from the missed deadline.
    assert!(jobs.due(t0 + ms(300)).is_empty());
    assert_eq!(jobs.due(t0 + ms(310)), vec![Kind::Gather]);
}

#[test]
fn test_catch_up_is_capped() {
    let t0 = Instant::now();
    let mut jobs = JobScheduler::new(TickPolicy::CatchUp { max_catchup: 2 });
    jobs.schedule_periodic(Kind::Gather, t0, ms(50));
    jobs.due(t0);

    // Due at 50; at 260 four more periods (100..250) were missed.
    let runs = jobs.due(t0 + ms(260));
    assert_eq!(runs, vec![Kind::Gather; 3]);
    assert_eq!(jobs.due(t0 + ms(300)), vec![Kind::Gather]);
}

#[test]
fn test_drop_keeps_cadence() {
    let t0 = Instant::now();
    let mut jobs = JobScheduler::new(TickPolicy::Drop);
    jobs.schedule_periodic(Kind::Gather, t0, ms(50));
    jobs.due(t0);

    assert_eq!(jobs.due(t0 + ms(260)), vec![Kind::Gather]);
    assert_eq!(jobs.due(t0 + ms(300)), vec![Kind::Gather]);
}

#[test]
fn test_due_orders_by_deadline() {
    let t0 = Instant::now();
    let mut jobs = JobScheduler::default();
    jobs.schedule_periodic(Kind::Ping, t0 + ms(20), ms(1000));
    jobs.schedule_periodic(Kind::Gather, t0 + ms(10), ms(50));
    assert_eq!(jobs.due(t0 + ms(30)), vec![Kind::Gather, Kind::Ping]);
}

#[test]
fn test_cancel_kind_and_all() {
    let t0 = Instant::now();
    let mut jobs = JobScheduler::default();
    jobs.schedule_periodic(Kind::Gather, t0, ms(50));
    jobs.schedule_periodic(Kind::Ping, t0, ms(1000));
    jobs.schedule_once(Kind::Reconnect, t0);

    assert_eq!(jobs.cancel_kind(Kind::Gather), 1);
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs.next_deadline(), Some(t0));
    jobs.cancel_all();
    assert!(jobs.is_empty());
    assert!(jobs.due(t0 + ms(5000)).is_empty());
}
