//! Async fixed-rate tick driver.
//!
//! Paces an update loop on a tokio runtime and watches how much of each
//! tick's budget the update used.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.recv() => break,
//!         info = driver.wait_for_tick() => {
//!             host.update(info.now, &mut simulation);
//!             driver.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

use crate::{TickConfig, TickPolicy};

/// Information about one fired tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    /// Fixed delta time, always `1 / tick_rate`.
    pub dt: Duration,
    /// When the tick fired, for the owner's `update(now)`.
    pub now: Instant,
    pub overrun: bool,
    pub ticks_skipped: u64,
}

/// Runtime statistics of a [`TickDriver`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of update time (alpha 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Last update time over the budget; above 1.0 is an overrun.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduling the next tick
// ---------------------------------------------------------------------------

/// Where the following tick is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// One period after the moment the tick actually fired.
    Now,
    /// This many periods after the moment the tick was due.
    Due(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lateness {
    overrun: bool,
    skipped: u64,
    anchor: Anchor,
}

/// Decides how to continue after a tick fired `late_by` past its due
/// time. Lateness above a tenth of a period counts as an overrun.
fn plan_next(policy: TickPolicy, late_by: Duration, period: Duration) -> Lateness {
    let overrun = late_by > period / 10;
    let missed = (late_by.as_nanos() / period.as_nanos().max(1)) as u64;
    match policy {
        TickPolicy::Skip => Lateness {
            overrun,
            skipped: if overrun { missed } else { 0 },
            anchor: Anchor::Now,
        },
        TickPolicy::CatchUp { max_catchup } => {
            let cap = u64::from(max_catchup);
            Lateness {
                overrun,
                skipped: if overrun { missed.saturating_sub(cap) } else { 0 },
                anchor: if missed <= cap { Anchor::Due(1) } else { Anchor::Now },
            }
        }
        TickPolicy::Drop => Lateness {
            overrun,
            skipped: 0,
            anchor: Anchor::Due(u32::try_from(missed).unwrap_or(u32::MAX).saturating_add(1)),
        },
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct TickDriver {
    config: TickConfig,
    period: Duration,
    fired: u64,
    due: TokioInstant,
    started_at: Option<Instant>,
    paused: bool,
    metrics: TickMetrics,
}

impl TickDriver {
    /// The first tick is delayed by a random jitter from the config.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.tick_duration();
        let jitter = match config.initial_jitter_us {
            0 => Duration::ZERO,
            max => Duration::from_micros(rand::rng().random_range(0..max)),
        };
        debug!(
            rate_hz = config.tick_rate_hz,
            period_ms = period.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "tick driver created"
        );
        Self {
            due: TokioInstant::now() + period + jitter,
            config,
            period,
            fired: 0,
            started_at: None,
            paused: false,
            metrics: TickMetrics::default(),
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Waits until the next tick is due. Pends forever while paused.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        if self.paused {
            std::future::pending::<()>().await;
        }
        let due = self.due;
        time::sleep_until(due).await;

        let fired_at = TokioInstant::now();
        let wall = Instant::now();
        self.fired += 1;
        self.started_at = Some(wall);

        let late_by = fired_at.saturating_duration_since(due);
        let plan = plan_next(self.config.policy, late_by, self.period);
        self.due = match plan.anchor {
            Anchor::Now => fired_at + self.period,
            Anchor::Due(periods) => due + self.period * periods,
        };
        if plan.overrun {
            warn!(
                tick = self.fired,
                late_ms = late_by.as_secs_f64() * 1000.0,
                skipped = plan.skipped,
                policy = ?self.config.policy,
                "tick overrun"
            );
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += plan.skipped;
        self.metrics.total_ticks += 1;
        trace!(tick = self.fired, "tick fired");

        TickInfo {
            tick: self.fired,
            dt: self.period,
            now: wall,
            overrun: plan.overrun,
            ticks_skipped: plan.skipped,
        }
    }

    /// Call after the update for the current tick returned.
    pub fn record_tick_end(&mut self) {
        let Some(started_at) = self.started_at.take() else {
            return;
        };
        let elapsed = started_at.elapsed();
        let used = elapsed.as_secs_f64() / self.period.as_secs_f64();
        self.metrics.budget_utilization = used;

        if used >= self.config.budget_warn_threshold {
            let critical = used >= self.config.budget_critical_threshold;
            warn!(
                tick = self.fired,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                used_pct = format!("{:.1}", used * 100.0),
                critical,
                "tick update near or over budget"
            );
        }

        if self.config.metrics_enabled {
            let metrics = &mut self.metrics;
            metrics.max_tick_time = metrics.max_tick_time.max(elapsed);
            metrics.avg_tick_time = Duration::from_secs_f64(
                metrics.avg_tick_time.as_secs_f64() * 0.9 + elapsed.as_secs_f64() * 0.1,
            );
        }
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.fired, "tick driver paused");
        }
    }

    /// Restarts from now, so time spent paused does not count as overrun.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.due = TokioInstant::now() + self.period;
            debug!(tick = self.fired, "tick driver resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn tick_count(&self) -> u64 {
        self.fired
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn tick_duration(&self) -> Duration {
        self.period
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
