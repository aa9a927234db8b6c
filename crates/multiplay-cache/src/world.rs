//! The seam between the cache and the simulation.
//!
//! The cache never holds references into the simulation. It asks a
//! [`WorldSource`] for current values by entity id on the host and pushes
//! reconstructed values into a [`WorldSink`] on the client. A destroyed
//! entity simply answers "not found".

use std::collections::BTreeMap;

use multiplay_protocol::messages::EntityCreation;
use multiplay_protocol::{ComponentId, EntityId, Transform};

use crate::schema::ComponentState;

/// Host-side read access to live simulation state.
pub trait WorldSource {
    fn transform(&self, entity: EntityId) -> Option<Transform>;
    fn component(&self, entity: EntityId, component: ComponentId) -> Option<&ComponentState>;
}

/// Client-side write access to the simulation.
pub trait WorldSink {
    fn create_entity(&mut self, creation: &EntityCreation);
    fn destroy_entity(&mut self, entity: EntityId);
    fn apply_transform(&mut self, entity: EntityId, transform: Transform);
    fn apply_component(&mut self, entity: EntityId, component: ComponentId, state: &ComponentState);
}

/// A plain in-memory world. Serves as the simulation in tests and demos.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorld {
    entities: BTreeMap<EntityId, MemoryEntity>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryEntity {
    pub template: String,
    pub transform: Transform,
    pub components: BTreeMap<ComponentId, ComponentState>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, entity: EntityId, template: impl Into<String>, transform: Transform) {
        self.entities.insert(
            entity,
            MemoryEntity {
                template: template.into(),
                transform,
                components: BTreeMap::new(),
            },
        );
    }

    pub fn despawn(&mut self, entity: EntityId) -> bool {
        self.entities.remove(&entity).is_some()
    }

    pub fn set_transform(&mut self, entity: EntityId, transform: Transform) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.transform = transform;
        }
    }

    pub fn set_component(&mut self, entity: EntityId, component: ComponentId, state: ComponentState) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.components.insert(component, state);
        }
    }

    pub fn get(&self, entity: EntityId) -> Option<&MemoryEntity> {
        self.entities.get(&entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }
}

impl WorldSource for MemoryWorld {
    fn transform(&self, entity: EntityId) -> Option<Transform> {
        self.entities.get(&entity).map(|e| e.transform)
    }

    fn component(&self, entity: EntityId, component: ComponentId) -> Option<&ComponentState> {
        self.entities.get(&entity)?.components.get(&component)
    }
}

impl WorldSink for MemoryWorld {
    fn create_entity(&mut self, creation: &EntityCreation) {
        self.spawn(creation.entity, creation.template.clone(), creation.transform);
    }

    fn destroy_entity(&mut self, entity: EntityId) {
        self.despawn(entity);
    }

    fn apply_transform(&mut self, entity: EntityId, transform: Transform) {
        self.set_transform(entity, transform);
    }

    fn apply_component(&mut self, entity: EntityId, component: ComponentId, state: &ComponentState) {
        self.set_component(entity, component, state.clone());
    }
}
