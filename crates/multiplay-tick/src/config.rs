//! Tick configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// What to do when the tick loop falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickPolicy {
    /// Run once and schedule the next run from now.
    #[default]
    Skip,
    /// Run each missed period again, up to `max_catchup` extra runs.
    CatchUp { max_catchup: u32 },
    /// Run once and keep the original cadence.
    Drop,
}

/// Configuration of the simulation tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Ticks per second, `1..=MAX_TICK_RATE_HZ`.
    pub tick_rate_hz: u32,
    pub policy: TickPolicy,
    /// Fraction of the tick budget (0.0 to 1.0) above which a warning is
    /// logged.
    pub budget_warn_threshold: f64,
    /// Fraction of the tick budget above which the warning is critical.
    pub budget_critical_threshold: f64,
    pub metrics_enabled: bool,
    /// Random delay (0 to this many microseconds) before the first tick,
    /// so sessions started together do not tick in lockstep.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.80,
            budget_critical_threshold: 1.0,
            metrics_enabled: true,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values:
    /// - `tick_rate_hz` into `1..=MAX_TICK_RATE_HZ`.
    /// - Thresholds into `0.0..=1.0`, with warn ≤ critical.
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            let clamped = self.tick_rate_hz.clamp(1, Self::MAX_TICK_RATE_HZ);
            warn!(
                rate = self.tick_rate_hz,
                clamped,
                "tick_rate_hz out of range, clamping"
            );
            self.tick_rate_hz = clamped;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self.budget_critical_threshold = self.budget_critical_threshold.clamp(0.0, 1.0);
        if self.budget_warn_threshold > self.budget_critical_threshold {
            self.budget_warn_threshold = self.budget_critical_threshold;
        }
        self
    }

    /// Duration of one tick. A zero rate is treated as 1 Hz.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}
