//! Tick-ordered receive buffers.
//!
//! Tick-tagged payloads are not applied on arrival. They wait in a
//! [`TickHistory`] until the local clock reaches their tick, and are then
//! handed out in tick order regardless of the order they arrived in.

use std::collections::VecDeque;

use multiplay_protocol::Tick;
use serde::{Deserialize, Serialize};

/// Bounds of a [`TickHistory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries more than this many ticks older than the newest received
    /// tick are dropped.
    pub retention_ticks: u32,
    /// Hard cap on buffered entries; the oldest go first.
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_ticks: 32,
            max_entries: 256,
        }
    }
}

impl HistoryConfig {
    /// Forces both bounds to at least one.
    pub fn validated(mut self) -> Self {
        self.retention_ticks = self.retention_ticks.max(1);
        self.max_entries = self.max_entries.max(1);
        self
    }
}

/// What [`TickHistory::push`] did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Buffered until its tick arrives.
    Buffered,
    /// Older than the last applied tick of this history; applying it would
    /// break tick order.
    Stale,
    /// Outside the retention window relative to the newest tick.
    Expired,
}

/// Entries of one kind, ordered by tick.
#[derive(Debug, Clone)]
pub struct TickHistory<T> {
    config: HistoryConfig,
    entries: VecDeque<(Tick, T)>,
    newest: Option<Tick>,
    last_applied: Option<Tick>,
    dropped: u64,
}

impl<T> Default for TickHistory<T> {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl<T> TickHistory<T> {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config: config.validated(),
            entries: VecDeque::new(),
            newest: None,
            last_applied: None,
            dropped: 0,
        }
    }

    /// Buffers `item` for `tick`. Entries with equal ticks keep their
    /// arrival order.
    pub fn push(&mut self, tick: Tick, item: T) -> PushOutcome {
        if self.last_applied.is_some_and(|applied| tick < applied) {
            self.dropped += 1;
            return PushOutcome::Stale;
        }

        let newest = match self.newest {
            Some(newest) if newest >= tick => newest,
            _ => tick,
        };
        self.newest = Some(newest);
        if newest.since(tick) > self.config.retention_ticks {
            self.dropped += 1;
            return PushOutcome::Expired;
        }

        let at = self.entries.partition_point(|(t, _)| *t <= tick);
        self.entries.insert(at, (tick, item));
        self.prune();
        PushOutcome::Buffered
    }

    fn prune(&mut self) {
        if let Some(newest) = self.newest {
            while self
                .entries
                .front()
                .is_some_and(|(t, _)| newest.since(*t) > self.config.retention_ticks)
            {
                self.entries.pop_front();
                self.dropped += 1;
            }
        }
        while self.entries.len() > self.config.max_entries {
            self.entries.pop_front();
            self.dropped += 1;
        }
    }

    /// Removes and returns every entry with a tick at or before `up_to`,
    /// in tick order.
    pub fn drain_ready(&mut self, up_to: Tick) -> Vec<(Tick, T)> {
        let count = self.entries.partition_point(|(t, _)| *t <= up_to);
        let ready: Vec<_> = self.entries.drain(..count).collect();
        if let Some((tick, _)) = ready.last() {
            self.last_applied = Some(*tick);
        }
        ready
    }

    /// Tick of the oldest buffered entry.
    pub fn oldest(&self) -> Option<Tick> {
        self.entries.front().map(|(t, _)| *t)
    }

    /// Newest tick ever pushed, buffered or not.
    pub fn newest(&self) -> Option<Tick> {
        self.newest
    }

    pub fn last_applied(&self) -> Option<Tick> {
        self.last_applied
    }

    /// Entries dropped as stale, expired, or over capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn config(&self) -> HistoryConfig {
        self.config
    }

    /// Forgets everything, including the newest and last applied ticks.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.newest = None;
        self.last_applied = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(entries: &[(Tick, &'static str)]) -> Vec<u32> {
        entries.iter().map(|(t, _)| t.0).collect()
    }

    #[test]
    fn test_drain_ready_orders_out_of_order_arrivals() {
        let mut history = TickHistory::default();
        history.push(Tick(3), "a");
        history.push(Tick(5), "c");
        history.push(Tick(4), "b");
        let ready = history.drain_ready(Tick(10));
        assert_eq!(ticks(&ready), vec![3, 4, 5]);
        assert!(history.is_empty());
    }

    #[test]
    fn test_drain_ready_leaves_future_entries() {
        let mut history = TickHistory::default();
        history.push(Tick(1), "now");
        history.push(Tick(2), "later");
        assert_eq!(ticks(&history.drain_ready(Tick(1))), vec![1]);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last_applied(), Some(Tick(1)));
    }

    #[test]
    fn test_equal_ticks_keep_arrival_order() {
        let mut history = TickHistory::default();
        history.push(Tick(2), "first");
        history.push(Tick(2), "second");
        let ready = history.drain_ready(Tick(2));
        assert_eq!(ready[0].1, "first");
        assert_eq!(ready[1].1, "second");
    }

    #[test]
    fn test_push_before_last_applied_is_stale() {
        let mut history = TickHistory::default();
        history.push(Tick(5), "x");
        history.drain_ready(Tick(5));
        assert_eq!(history.push(Tick(4), "late"), PushOutcome::Stale);
        assert_eq!(history.push(Tick(5), "same tick"), PushOutcome::Buffered);
        assert_eq!(history.dropped(), 1);
    }

    #[test]
    fn test_retention_window_drops_old_entries() {
        let mut history = TickHistory::new(HistoryConfig {
            retention_ticks: 4,
            max_entries: 100,
        });
        history.push(Tick(1), "old");
        history.push(Tick(3), "kept");
        history.push(Tick(6), "newest");
        // 6 - 1 > 4, so tick 1 is gone; 6 - 3 <= 4 stays.
        assert_eq!(history.oldest(), Some(Tick(3)));
        assert_eq!(history.push(Tick(1), "too old"), PushOutcome::Expired);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_max_entries_evicts_oldest() {
        let mut history = TickHistory::new(HistoryConfig {
            retention_ticks: 1000,
            max_entries: 2,
        });
        history.push(Tick(1), "a");
        history.push(Tick(2), "b");
        history.push(Tick(3), "c");
        assert_eq!(ticks(&history.drain_ready(Tick(3))), vec![2, 3]);
    }
}
