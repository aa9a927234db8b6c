//! Delta state synchronization for Multiplay.
//!
//! The host tracks entities and their components in a [`HostMapCache`]. Each
//! tick it compares live values from a [`WorldSource`] against what it last
//! sent and writes only the changed fields. Clients decode those updates
//! into a [`ClientMapCache`], which buffers them in [`TickHistory`] queues
//! and pushes reconstructed values into a [`WorldSink`] once their tick is
//! reached.
//!
//! ```text
//! Host:   WorldSource → HostMapCache::update_cache → DATA_UPDATE body
//! Client: DATA_UPDATE body → ClientMapCache::receive_update
//!         → apply_ready(tick) → WorldSink
//! ```

mod error;
mod history;
mod map_cache;
mod record;
mod schema;
mod stats;
mod world;

pub use error::CacheError;
pub use history::{HistoryConfig, PushOutcome, TickHistory};
pub use map_cache::{
    ApplySummary, ClientMapCache, DEFAULT_REMOVED_HISTORY, EntityUpdate, HostMapCache,
    RemovedHistory, decode_update,
};
pub use record::{CacheRecord, ComponentDiff};
pub use schema::{
    ComponentRegistry, ComponentSchema, ComponentState, DEFAULT_FLOAT_EPSILON, FieldKind,
    FieldValue,
};
pub use stats::{BitStats, UpdateStatistics};
pub use world::{MemoryEntity, MemoryWorld, WorldSink, WorldSource};
