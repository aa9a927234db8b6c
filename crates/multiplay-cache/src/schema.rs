//! Component schemas: the per-type field layout the cache diffs against.
//!
//! Host and client must register the same schemas in the same way; the
//! wire format carries only component ids and changed field values.

use std::collections::BTreeMap;

use multiplay_protocol::{
    BitReader, BitWriter, ComponentId, EntityId, ProtocolError, Transform, Vec3, WireFormat,
};
use serde::{Deserialize, Serialize};

use crate::CacheError;

/// Default tolerance below which a float change is not worth sending.
pub const DEFAULT_FLOAT_EPSILON: f32 = 0.0005;

/// The shape of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    /// Unsigned integer packed into `bits` bits (1 to 32).
    Unsigned { bits: u8 },
    Signed,
    Float,
    Text,
    /// Reference to another entity, possibly none.
    Entity,
}

impl FieldKind {
    /// The value a client assumes before it has received anything.
    pub fn default_value(self) -> FieldValue {
        match self {
            Self::Bool => FieldValue::Bool(false),
            Self::Unsigned { .. } => FieldValue::Unsigned(0),
            Self::Signed => FieldValue::Signed(0),
            Self::Float => FieldValue::Float(0.0),
            Self::Text => FieldValue::Text(String::new()),
            Self::Entity => FieldValue::Entity(None),
        }
    }

    /// Whether `value` can be stored in a field of this kind.
    pub fn accepts(self, value: &FieldValue) -> bool {
        match (self, value) {
            (Self::Bool, FieldValue::Bool(_))
            | (Self::Signed, FieldValue::Signed(_))
            | (Self::Float, FieldValue::Float(_))
            | (Self::Text, FieldValue::Text(_))
            | (Self::Entity, FieldValue::Entity(_)) => true,
            (Self::Unsigned { bits }, FieldValue::Unsigned(v)) => {
                bits >= 32 || u64::from(*v) < (1u64 << bits)
            }
            _ => false,
        }
    }

    pub(crate) fn write(self, value: &FieldValue, writer: &mut BitWriter) {
        match (self, value) {
            (Self::Bool, FieldValue::Bool(v)) => writer.write_bool(*v),
            (Self::Unsigned { bits }, FieldValue::Unsigned(v)) => {
                writer.write_bits(*v, bits.clamp(1, 32))
            }
            (Self::Signed, FieldValue::Signed(v)) => writer.write_i32(*v),
            (Self::Float, FieldValue::Float(v)) => writer.write_f32(*v),
            (Self::Text, FieldValue::Text(v)) => writer.write_string(v),
            (Self::Entity, FieldValue::Entity(v)) => v.write(writer),
            // Callers validate states against the schema before writing.
            _ => {}
        }
    }

    pub(crate) fn read(self, reader: &mut BitReader<'_>) -> Result<FieldValue, ProtocolError> {
        Ok(match self {
            Self::Bool => FieldValue::Bool(reader.read_bool()?),
            Self::Unsigned { bits } => FieldValue::Unsigned(reader.read_bits(bits.clamp(1, 32))?),
            Self::Signed => FieldValue::Signed(reader.read_i32()?),
            Self::Float => FieldValue::Float(reader.read_f32()?),
            Self::Text => FieldValue::Text(reader.read_string()?),
            Self::Entity => FieldValue::Entity(Option::<EntityId>::read(reader)?),
        })
    }
}

/// One field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Unsigned(u32),
    Signed(i32),
    Float(f32),
    Text(String),
    Entity(Option<EntityId>),
}

impl FieldValue {
    /// Whether moving from `self` to `other` is a change worth sending.
    /// Floats within `epsilon` of each other count as equal.
    pub fn differs_from(&self, other: &FieldValue, epsilon: f32) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => (a - b).abs() > epsilon || a.is_nan() != b.is_nan(),
            _ => self != other,
        }
    }
}

/// Live or cached values of one component, one per schema field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentState {
    values: Vec<FieldValue>,
}

impl ComponentState {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn get(&self, field: usize) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Replaces one value. Out-of-range indices are ignored.
    pub fn set(&mut self, field: usize, value: FieldValue) {
        if let Some(slot) = self.values.get_mut(field) {
            *slot = value;
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Transform> for ComponentState {
    fn from(transform: Transform) -> Self {
        let Transform { position, yaw } = transform;
        Self::new(vec![
            FieldValue::Float(position.x),
            FieldValue::Float(position.y),
            FieldValue::Float(position.z),
            FieldValue::Float(yaw),
        ])
    }
}

impl ComponentState {
    /// Reads the state back as a transform, if it has the core layout.
    pub fn to_transform(&self) -> Option<Transform> {
        match self.values.as_slice() {
            [
                FieldValue::Float(x),
                FieldValue::Float(y),
                FieldValue::Float(z),
                FieldValue::Float(yaw),
            ] => Some(Transform::new(Vec3::new(*x, *y, *z), *yaw)),
            _ => None,
        }
    }
}

/// Field layout of one component type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSchema {
    pub id: ComponentId,
    pub name: String,
    pub fields: Vec<FieldKind>,
}

impl ComponentSchema {
    pub fn new(id: ComponentId, name: impl Into<String>, fields: Vec<FieldKind>) -> Self {
        Self {
            id,
            name: name.into(),
            fields,
        }
    }

    /// The always-tracked core data set: position x, y, z and yaw.
    pub fn core() -> Self {
        Self::new(ComponentId::CORE, "transform", vec![FieldKind::Float; 4])
    }

    /// A state holding every field's default value.
    pub fn default_state(&self) -> ComponentState {
        ComponentState::new(self.fields.iter().map(|f| f.default_value()).collect())
    }

    /// Checks that `state` has exactly one value of the right kind per field.
    pub fn validate(&self, state: &ComponentState) -> Result<(), CacheError> {
        if state.len() != self.fields.len() {
            return Err(CacheError::FieldCount {
                component: self.id,
                expected: self.fields.len(),
                found: state.len(),
            });
        }
        for (field, (kind, value)) in self.fields.iter().zip(state.values()).enumerate() {
            if !kind.accepts(value) {
                return Err(CacheError::FieldKindMismatch {
                    component: self.id,
                    field,
                });
            }
        }
        Ok(())
    }
}

/// Every component type that can be synchronized, keyed by id.
///
/// The core transform schema is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRegistry {
    schemas: BTreeMap<ComponentId, ComponentSchema>,
    float_epsilon: f32,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert(ComponentId::CORE, ComponentSchema::core());
        Self {
            schemas,
            float_epsilon: DEFAULT_FLOAT_EPSILON,
        }
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_float_epsilon(mut self, epsilon: f32) -> Self {
        self.float_epsilon = epsilon.max(0.0);
        self
    }

    pub fn float_epsilon(&self) -> f32 {
        self.float_epsilon
    }

    /// Adds a dynamic component schema.
    ///
    /// # Errors
    /// [`CacheError::DuplicateComponent`] if the id is taken, including the
    /// reserved core id.
    pub fn register(&mut self, schema: ComponentSchema) -> Result<(), CacheError> {
        if self.schemas.contains_key(&schema.id) {
            return Err(CacheError::DuplicateComponent(schema.id));
        }
        tracing::debug!(component = %schema.id, name = %schema.name, "component schema registered");
        self.schemas.insert(schema.id, schema);
        Ok(())
    }

    pub fn get(&self, id: ComponentId) -> Option<&ComponentSchema> {
        self.schemas.get(&id)
    }

    pub(crate) fn require(&self, id: ComponentId) -> Result<&ComponentSchema, CacheError> {
        self.get(id).ok_or(CacheError::UnknownComponent(id))
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.schemas.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.schemas.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health_schema() -> ComponentSchema {
        ComponentSchema::new(
            ComponentId(3),
            "health",
            vec![FieldKind::Unsigned { bits: 7 }, FieldKind::Bool],
        )
    }

    #[test]
    fn test_registry_default_contains_core() {
        let registry = ComponentRegistry::new();
        assert!(registry.contains(ComponentId::CORE));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.float_epsilon(), DEFAULT_FLOAT_EPSILON);
    }

    #[test]
    fn test_register_rejects_duplicates_and_core() {
        let mut registry = ComponentRegistry::new();
        registry.register(health_schema()).unwrap();
        assert_eq!(
            registry.register(health_schema()),
            Err(CacheError::DuplicateComponent(ComponentId(3)))
        );
        assert_eq!(
            registry.register(ComponentSchema::new(ComponentId::CORE, "x", vec![])),
            Err(CacheError::DuplicateComponent(ComponentId::CORE))
        );
    }

    #[test]
    fn test_validate_checks_count_and_kinds() {
        let schema = health_schema();
        assert!(schema
            .validate(&ComponentState::new(vec![
                FieldValue::Unsigned(100),
                FieldValue::Bool(true)
            ]))
            .is_ok());
        assert!(matches!(
            schema.validate(&ComponentState::new(vec![FieldValue::Unsigned(1)])),
            Err(CacheError::FieldCount { expected: 2, found: 1, .. })
        ));
        // 128 does not fit in 7 bits.
        assert!(matches!(
            schema.validate(&ComponentState::new(vec![
                FieldValue::Unsigned(128),
                FieldValue::Bool(true)
            ])),
            Err(CacheError::FieldKindMismatch { field: 0, .. })
        ));
    }

    #[test]
    fn test_float_difference_respects_epsilon() {
        let a = FieldValue::Float(1.0);
        assert!(!a.differs_from(&FieldValue::Float(1.0004), DEFAULT_FLOAT_EPSILON));
        assert!(a.differs_from(&FieldValue::Float(1.001), DEFAULT_FLOAT_EPSILON));
        assert!(FieldValue::Text("a".into()).differs_from(&FieldValue::Text("b".into()), 1.0));
    }

    #[test]
    fn test_transform_state_conversion() {
        let transform = Transform::new(Vec3::new(1.0, 2.0, 3.0), 0.5);
        let state = ComponentState::from(transform);
        ComponentSchema::core().validate(&state).unwrap();
        assert_eq!(state.to_transform(), Some(transform));
    }

    #[test]
    fn test_schema_from_json() {
        let json = r#"{
            "id": 4,
            "name": "ladder",
            "fields": [{"kind": "bool"}, {"kind": "unsigned", "bits": 3}, {"kind": "entity"}]
        }"#;
        let schema: ComponentSchema = serde_json::from_str(json).unwrap();
        assert_eq!(schema.id, ComponentId(4));
        assert_eq!(
            schema.fields,
            vec![FieldKind::Bool, FieldKind::Unsigned { bits: 3 }, FieldKind::Entity]
        );
    }
}
