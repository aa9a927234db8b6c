//! Error types for the map cache.

use multiplay_protocol::{ComponentId, EntityId, ProtocolError};

/// Errors raised while tracking entities or encoding and decoding cache
/// updates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    /// The update body could not be read.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A component id with no registered schema.
    #[error("component {0} is not registered")]
    UnknownComponent(ComponentId),

    /// A schema was registered twice, or under the reserved core id.
    #[error("component {0} is already registered")]
    DuplicateComponent(ComponentId),

    /// A component state does not have one value per schema field.
    #[error("component {component} expects {expected} fields, got {found}")]
    FieldCount {
        component: ComponentId,
        expected: usize,
        found: usize,
    },

    /// A value does not match the kind its schema field declares.
    #[error("component {component} field {field} does not match its schema")]
    FieldKindMismatch { component: ComponentId, field: usize },

    /// The entity is already tracked.
    #[error("entity {0} is already tracked")]
    AlreadyTracked(EntityId),

    /// The entity is not tracked.
    #[error("entity {0} is not tracked")]
    NotTracked(EntityId),
}
