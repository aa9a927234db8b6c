//! Bandwidth statistics for cache updates.

use std::collections::BTreeMap;

use multiplay_protocol::ComponentId;

/// Size statistics over a series of updates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BitStats {
    pub updates: u64,
    pub total_bits: u64,
    pub peak_bits: u32,
    /// `None` until the first update is recorded.
    pub lowest_bits: Option<u32>,
}

impl BitStats {
    pub fn record(&mut self, bits: u32) {
        self.updates += 1;
        self.total_bits += u64::from(bits);
        self.peak_bits = self.peak_bits.max(bits);
        self.lowest_bits = Some(self.lowest_bits.map_or(bits, |low| low.min(bits)));
    }

    pub fn average_bits(&self) -> f64 {
        if self.updates == 0 {
            0.0
        } else {
            self.total_bits as f64 / self.updates as f64
        }
    }
}

/// Statistics for the whole update body and for each component id.
#[derive(Debug, Clone, Default)]
pub struct UpdateStatistics {
    overall: BitStats,
    per_component: BTreeMap<ComponentId, BitStats>,
}

impl UpdateStatistics {
    pub(crate) fn record_update(&mut self, bits: u32) {
        self.overall.record(bits);
    }

    pub(crate) fn record_component(&mut self, component: ComponentId, bits: u32) {
        self.per_component.entry(component).or_default().record(bits);
    }

    pub fn overall(&self) -> &BitStats {
        &self.overall
    }

    pub fn component(&self, component: ComponentId) -> Option<&BitStats> {
        self.per_component.get(&component)
    }

    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &BitStats)> {
        self.per_component.iter().map(|(id, stats)| (*id, stats))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
