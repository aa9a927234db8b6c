//! Host and client map caches.
//!
//! The host keeps, per tracked entity and component, the values it last
//! sent, and each tick serializes only what moved since then. The client
//! keeps the reconstructed values and applies buffered updates once their
//! tick has arrived.
//!
//! `DATA_UPDATE` body layout:
//!
//! ```text
//! [entity count: var]
//!   [entity id: var][component count: var]
//!     [component id: u16][change bits][changed values]
//! ```

use std::collections::{BTreeMap, HashSet, VecDeque};

use multiplay_protocol::messages::{EntityCreation, TickBatch};
use multiplay_protocol::{
    BitWriter, ComponentId, EntityId, ProtocolError, RawBits, Tick, WireFormat,
};

use crate::CacheError;
use crate::history::{HistoryConfig, PushOutcome, TickHistory};
use crate::record::{CacheRecord, ComponentDiff, write_diff};
use crate::schema::{ComponentRegistry, ComponentState};
use crate::stats::UpdateStatistics;
use crate::world::{WorldSink, WorldSource};

/// Default number of remembered entity removals.
pub const DEFAULT_REMOVED_HISTORY: usize = 128;

// ---------------------------------------------------------------------------
// Removed-entity history
// ---------------------------------------------------------------------------

/// Bounded record of recently removed entities.
///
/// Lets the client ignore late updates for an entity it already destroyed.
#[derive(Debug, Clone)]
pub struct RemovedHistory {
    capacity: usize,
    order: VecDeque<(Tick, EntityId)>,
    members: HashSet<EntityId>,
}

impl RemovedHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    pub fn record(&mut self, tick: Tick, entity: EntityId) {
        if self.members.insert(entity) {
            self.order.push_back((tick, entity));
        }
        while self.order.len() > self.capacity {
            if let Some((_, old)) = self.order.pop_front() {
                self.members.remove(&old);
            }
        }
    }

    /// Drops `entity` from the history, e.g. when its id is reused.
    pub fn forget(&mut self, entity: EntityId) {
        if self.members.remove(&entity) {
            self.order.retain(|(_, e)| *e != entity);
        }
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.members.contains(&entity)
    }

    /// Tick at which `entity` was removed.
    pub fn removed_at(&self, entity: EntityId) -> Option<Tick> {
        self.order.iter().find(|(_, e)| *e == entity).map(|(t, _)| *t)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

// ---------------------------------------------------------------------------
// Host side
// ---------------------------------------------------------------------------

/// Host-side cache: diff detection and `DATA_UPDATE` body serialization.
///
/// A component record exists exactly while its entity and component pair
/// is tracked. Untracking an entity drops all of its records.
#[derive(Debug)]
pub struct HostMapCache {
    registry: ComponentRegistry,
    entities: BTreeMap<EntityId, BTreeMap<ComponentId, CacheRecord>>,
    removed: RemovedHistory,
    stats: UpdateStatistics,
}

impl HostMapCache {
    pub fn new(registry: ComponentRegistry, removed_capacity: usize) -> Self {
        Self {
            registry,
            entities: BTreeMap::new(),
            removed: RemovedHistory::new(removed_capacity),
            stats: UpdateStatistics::default(),
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Starts tracking `entity` with the core data set plus `components`.
    ///
    /// # Errors
    /// [`CacheError::AlreadyTracked`] or [`CacheError::UnknownComponent`];
    /// nothing is tracked on error.
    pub fn track(&mut self, entity: EntityId, components: &[ComponentId]) -> Result<(), CacheError> {
        if self.entities.contains_key(&entity) {
            return Err(CacheError::AlreadyTracked(entity));
        }
        for component in components {
            self.registry.require(*component)?;
        }
        let mut records = BTreeMap::new();
        records.insert(ComponentId::CORE, CacheRecord::new());
        for component in components {
            records.insert(*component, CacheRecord::new());
        }
        self.entities.insert(entity, records);
        self.removed.forget(entity);
        tracing::trace!(%entity, components = components.len(), "entity tracked");
        Ok(())
    }

    /// Adds one dynamic component to a tracked entity. Tracking an already
    /// tracked component is a no-op.
    pub fn track_component(
        &mut self,
        entity: EntityId,
        component: ComponentId,
    ) -> Result<(), CacheError> {
        self.registry.require(component)?;
        let records = self
            .entities
            .get_mut(&entity)
            .ok_or(CacheError::NotTracked(entity))?;
        records.entry(component).or_default();
        Ok(())
    }

    /// Stops tracking one dynamic component. The core set cannot be
    /// removed on its own.
    pub fn untrack_component(&mut self, entity: EntityId, component: ComponentId) -> bool {
        if component == ComponentId::CORE {
            return false;
        }
        self.entities
            .get_mut(&entity)
            .is_some_and(|records| records.remove(&component).is_some())
    }

    /// Drops every record of `entity` and remembers the removal.
    pub fn untrack(&mut self, entity: EntityId, tick: Tick) -> bool {
        if self.entities.remove(&entity).is_some() {
            self.removed.record(tick, entity);
            tracing::trace!(%entity, %tick, "entity untracked");
            true
        } else {
            false
        }
    }

    pub fn is_tracked(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn tracked_count(&self) -> usize {
        self.entities.len()
    }

    pub fn tracked_components(&self, entity: EntityId) -> Vec<ComponentId> {
        self.entities
            .get(&entity)
            .map(|records| records.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn removed(&self) -> &RemovedHistory {
        &self.removed
    }

    pub fn statistics(&self) -> &UpdateStatistics {
        &self.stats
    }

    /// Forgets every record, so the next update starts from scratch.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.removed.clear();
    }

    /// Diffs every tracked record against `world`, writes the changed
    /// fields, and updates the cache to what was written.
    ///
    /// Entities or components missing from the world are skipped for this
    /// tick. States that do not match their schema are skipped with a
    /// warning rather than corrupting the stream.
    pub fn update_cache(&mut self, world: &dyn WorldSource) -> RawBits {
        let epsilon = self.registry.float_epsilon();
        let mut changed: Vec<(EntityId, Vec<(ComponentId, Vec<bool>, ComponentState)>)> = Vec::new();

        for (&entity, records) in &self.entities {
            let mut components = Vec::new();
            for (&component, record) in records {
                let current = if component == ComponentId::CORE {
                    world.transform(entity).map(ComponentState::from)
                } else {
                    world.component(entity, component).cloned()
                };
                let Some(current) = current else {
                    continue;
                };
                let Some(schema) = self.registry.get(component) else {
                    continue;
                };
                if let Err(err) = schema.validate(&current) {
                    tracing::warn!(%entity, %component, error = %err, "skipping invalid component state");
                    continue;
                }
                if let Some(mask) = record.diff(&current, epsilon) {
                    components.push((component, mask, current));
                }
            }
            if !components.is_empty() {
                changed.push((entity, components));
            }
        }

        let mut writer = BitWriter::new();
        writer.write_var_u32(changed.len() as u32);
        for (entity, components) in &changed {
            entity.write(&mut writer);
            writer.write_var_u32(components.len() as u32);
            for (component, mask, current) in components {
                let start = writer.bits_written();
                component.write(&mut writer);
                if let Some(schema) = self.registry.get(*component) {
                    write_diff(schema, mask, current, &mut writer);
                }
                self.stats
                    .record_component(*component, writer.bits_written() - start);
            }
        }

        for (entity, components) in &changed {
            if let Some(records) = self.entities.get_mut(entity) {
                for (component, mask, current) in components {
                    if let Some(record) = records.get_mut(component) {
                        record.commit(current, mask);
                    }
                }
            }
        }

        let bits = writer.bits_written();
        self.stats.record_update(bits);
        tracing::trace!(entities = changed.len(), bits, "cache update written");
        writer.into_raw()
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// All changes to one entity within one update.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpdate {
    pub entity: EntityId,
    pub components: Vec<ComponentDiff>,
}

/// Decodes and validates a complete `DATA_UPDATE` body.
///
/// # Errors
/// Fails on unknown component ids, truncated data, or trailing bits. No
/// partial result is returned, so a malformed body never touches state.
pub fn decode_update(
    registry: &ComponentRegistry,
    body: &RawBits,
) -> Result<Vec<EntityUpdate>, CacheError> {
    let mut reader = body.reader();
    let entity_count = reader.read_len()?;
    let mut updates = Vec::with_capacity(entity_count.min(1024));
    for _ in 0..entity_count {
        let entity = EntityId::read(&mut reader)?;
        let component_count = reader.read_len()?;
        let mut components = Vec::with_capacity(component_count.min(64));
        for _ in 0..component_count {
            let component = ComponentId::read(&mut reader)?;
            let schema = registry.require(component)?;
            components.push(ComponentDiff::read(schema, &mut reader)?);
        }
        updates.push(EntityUpdate { entity, components });
    }
    if !reader.is_exhausted() {
        return Err(ProtocolError::InvalidValue(format!(
            "{} trailing bits after cache update",
            reader.remaining_bits()
        ))
        .into());
    }
    Ok(updates)
}

/// Counts from one [`ClientMapCache::apply_ready`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
    /// Updates skipped because their entity was recently removed.
    pub ignored: usize,
}

/// Client-side cache: buffers decoded updates by tick and reconstructs
/// field values as ticks arrive.
#[derive(Debug)]
pub struct ClientMapCache {
    registry: ComponentRegistry,
    records: BTreeMap<EntityId, BTreeMap<ComponentId, ComponentState>>,
    removed: RemovedHistory,
    creates: TickHistory<EntityCreation>,
    updates: TickHistory<Vec<EntityUpdate>>,
    destroys: TickHistory<EntityId>,
}

impl ClientMapCache {
    pub fn new(registry: ComponentRegistry, history: HistoryConfig, removed_capacity: usize) -> Self {
        Self {
            registry,
            records: BTreeMap::new(),
            removed: RemovedHistory::new(removed_capacity),
            creates: TickHistory::new(history),
            updates: TickHistory::new(history),
            destroys: TickHistory::new(history),
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Decodes a `DATA_UPDATE` body and buffers it for `tick`.
    pub fn receive_update(&mut self, tick: Tick, body: &RawBits) -> Result<PushOutcome, CacheError> {
        let decoded = decode_update(&self.registry, body)?;
        let outcome = self.updates.push(tick, decoded);
        if outcome != PushOutcome::Buffered {
            tracing::warn!(%tick, ?outcome, "cache update dropped");
        }
        Ok(outcome)
    }

    /// Buffers a `CREATE_ENTITY` batch. Returns how many were kept.
    pub fn receive_creates(&mut self, batch: TickBatch<EntityCreation>) -> usize {
        let tick = batch.tick;
        batch
            .items
            .into_iter()
            .map(|creation| self.creates.push(tick, creation))
            .filter(|outcome| *outcome == PushOutcome::Buffered)
            .count()
    }

    /// Buffers a `DESTROY_ENTITY` batch. Returns how many were kept.
    pub fn receive_destroys(&mut self, batch: TickBatch<EntityId>) -> usize {
        let tick = batch.tick;
        batch
            .items
            .into_iter()
            .map(|entity| self.destroys.push(tick, entity))
            .filter(|outcome| *outcome == PushOutcome::Buffered)
            .count()
    }

    /// Applies everything buffered up to and including `tick`.
    ///
    /// Ticks are applied in order. Within one tick, creations come first,
    /// then field updates, then destructions, so a final update to an
    /// entity is never applied after it is gone.
    pub fn apply_ready(&mut self, tick: Tick, sink: &mut dyn WorldSink) -> ApplySummary {
        let mut summary = ApplySummary::default();
        let mut creates = self.creates.drain_ready(tick).into_iter().peekable();
        let mut updates = self.updates.drain_ready(tick).into_iter().peekable();
        let mut destroys = self.destroys.drain_ready(tick).into_iter().peekable();

        loop {
            let next = [
                creates.peek().map(|(t, _)| *t),
                updates.peek().map(|(t, _)| *t),
                destroys.peek().map(|(t, _)| *t),
            ]
            .into_iter()
            .flatten()
            .min();
            let Some(current) = next else {
                break;
            };

            while let Some((_, creation)) = creates.next_if(|(t, _)| *t == current) {
                self.removed.forget(creation.entity);
                self.records.entry(creation.entity).or_default();
                sink.create_entity(&creation);
                summary.created += 1;
            }

            while let Some((_, batch)) = updates.next_if(|(t, _)| *t == current) {
                for update in batch {
                    if self.removed.contains(update.entity) {
                        summary.ignored += 1;
                        continue;
                    }
                    let records = self.records.entry(update.entity).or_default();
                    for diff in &update.components {
                        let Some(schema) = self.registry.get(diff.component) else {
                            continue;
                        };
                        let state = records
                            .entry(diff.component)
                            .or_insert_with(|| schema.default_state());
                        diff.apply_to(state);
                        if diff.component == ComponentId::CORE {
                            if let Some(transform) = state.to_transform() {
                                sink.apply_transform(update.entity, transform);
                            }
                        } else {
                            sink.apply_component(update.entity, diff.component, state);
                        }
                    }
                    summary.updated += 1;
                }
            }

            while let Some((_, entity)) = destroys.next_if(|(t, _)| *t == current) {
                self.records.remove(&entity);
                self.removed.record(current, entity);
                sink.destroy_entity(entity);
                summary.destroyed += 1;
            }
        }

        summary
    }

    /// Reconstructed state of one component.
    pub fn component(&self, entity: EntityId, component: ComponentId) -> Option<&ComponentState> {
        self.records.get(&entity)?.get(&component)
    }

    pub fn transform(&self, entity: EntityId) -> Option<multiplay_protocol::Transform> {
        self.component(entity, ComponentId::CORE)?.to_transform()
    }

    pub fn entity_count(&self) -> usize {
        self.records.len()
    }

    pub fn removed(&self) -> &RemovedHistory {
        &self.removed
    }

    /// Newest tick seen in any buffered kind.
    pub fn newest_tick(&self) -> Option<Tick> {
        [
            self.creates.newest(),
            self.updates.newest(),
            self.destroys.newest(),
        ]
        .into_iter()
        .flatten()
        .max()
    }

    /// Entries waiting for their tick, across all kinds.
    pub fn pending(&self) -> usize {
        self.creates.len() + self.updates.len() + self.destroys.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.removed.clear();
        self.creates.clear();
        self.updates.clear();
        self.destroys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_history_evicts_oldest() {
        let mut removed = RemovedHistory::new(2);
        removed.record(Tick(1), EntityId(1));
        removed.record(Tick(2), EntityId(2));
        removed.record(Tick(3), EntityId(3));
        assert!(!removed.contains(EntityId(1)));
        assert!(removed.contains(EntityId(3)));
        assert_eq!(removed.removed_at(EntityId(2)), Some(Tick(2)));
        assert_eq!(removed.len(), 2);
    }

    #[test]
    fn test_removed_history_forget() {
        let mut removed = RemovedHistory::new(4);
        removed.record(Tick(1), EntityId(9));
        removed.forget(EntityId(9));
        assert!(removed.is_empty());
    }

    #[test]
    fn test_track_unknown_component_tracks_nothing() {
        let mut cache = HostMapCache::new(ComponentRegistry::new(), 8);
        assert_eq!(
            cache.track(EntityId(1), &[ComponentId(7)]),
            Err(CacheError::UnknownComponent(ComponentId(7)))
        );
        assert!(!cache.is_tracked(EntityId(1)));
    }

    #[test]
    fn test_track_twice_is_rejected() {
        let mut cache = HostMapCache::new(ComponentRegistry::new(), 8);
        cache.track(EntityId(1), &[]).unwrap();
        assert_eq!(
            cache.track(EntityId(1), &[]),
            Err(CacheError::AlreadyTracked(EntityId(1)))
        );
        assert_eq!(cache.tracked_components(EntityId(1)), vec![ComponentId::CORE]);
    }

    #[test]
    fn test_core_component_cannot_be_untracked_alone() {
        let mut cache = HostMapCache::new(ComponentRegistry::new(), 8);
        cache.track(EntityId(1), &[]).unwrap();
        assert!(!cache.untrack_component(EntityId(1), ComponentId::CORE));
        assert!(cache.untrack(EntityId(1), Tick(4)));
        assert!(cache.removed().contains(EntityId(1)));
    }

    #[test]
    fn test_decode_update_rejects_unknown_component() {
        let mut writer = BitWriter::new();
        writer.write_var_u32(1);
        EntityId(1).write(&mut writer);
        writer.write_var_u32(1);
        ComponentId(42).write(&mut writer);
        let err = decode_update(&ComponentRegistry::new(), &writer.into_raw()).unwrap_err();
        assert_eq!(err, CacheError::UnknownComponent(ComponentId(42)));
    }

    #[test]
    fn test_decode_update_rejects_trailing_bits() {
        let mut writer = BitWriter::new();
        writer.write_var_u32(0);
        writer.write_bool(true);
        assert!(matches!(
            decode_update(&ComponentRegistry::new(), &writer.into_raw()),
            Err(CacheError::Protocol(ProtocolError::InvalidValue(_)))
        ));
    }
}
