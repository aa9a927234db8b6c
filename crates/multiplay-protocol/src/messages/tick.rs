//! Tick-tagged simulation payloads.
//!
//! The host batches every change of one kind that happened during a tick
//! into a single message, so most of these travel inside a [`TickBatch`].

use crate::bitstream::{BitReader, BitWriter, RawBits};
use crate::types::{EntityId, PlayerIndex, Tick, Transform, Vec3};
use crate::wire::WireFormat;
use crate::ProtocolError;

/// All items of one message kind recorded during `tick`.
#[derive(Debug, Clone, PartialEq)]
pub struct TickBatch<T> {
    /// Tick every item was produced on.
    pub tick: Tick,
    /// In the order the host queued them.
    pub items: Vec<T>,
}

impl<T> TickBatch<T> {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            items: Vec::new(),
        }
    }

    pub fn single(tick: Tick, item: T) -> Self {
        Self {
            tick,
            items: vec![item],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: WireFormat> WireFormat for TickBatch<T> {
    fn write(&self, writer: &mut BitWriter) {
        self.tick.write(writer);
        self.items.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            tick: Tick::read(reader)?,
            items: Vec::read(reader)?,
        })
    }
}

/// `DATA_UPDATE`: the cache body for one tick. The body is opaque at this
/// layer; only the map cache knows how to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUpdatePayload {
    /// Tick the diff was taken on.
    pub tick: Tick,
    /// Component diff bits, decoded against the client's map cache.
    pub body: RawBits,
}

impl WireFormat for DataUpdatePayload {
    fn write(&self, writer: &mut BitWriter) {
        self.tick.write(writer);
        self.body.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            tick: Tick::read(reader)?,
            body: RawBits::read(reader)?,
        })
    }
}

/// One entry of `CREATE_ENTITY`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCreation {
    /// Id of the new entity.
    pub entity: EntityId,
    /// Template name the client instantiates.
    pub template: String,
    /// `None` for world entities.
    pub owner: Option<PlayerIndex>,
    /// Initial placement.
    pub transform: Transform,
}

impl WireFormat for EntityCreation {
    fn write(&self, writer: &mut BitWriter) {
        self.entity.write(writer);
        writer.write_string(&self.template);
        self.owner.write(writer);
        self.transform.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity: EntityId::read(reader)?,
            template: reader.read_string()?,
            owner: Option::read(reader)?,
            transform: Transform::read(reader)?,
        })
    }
}

/// One entry of `SPAWN_UNIT`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpawn {
    /// Id of the spawned unit.
    pub entity: EntityId,
    /// Game-defined unit type.
    pub unit_type: u16,
    /// Player controlling the unit.
    pub owner: PlayerIndex,
    /// `None` uses the owner's default spawn.
    pub spawn_point: Option<Vec3>,
}

impl WireFormat for UnitSpawn {
    fn write(&self, writer: &mut BitWriter) {
        self.entity.write(writer);
        writer.write_u16(self.unit_type);
        self.owner.write(writer);
        self.spawn_point.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity: EntityId::read(reader)?,
            unit_type: reader.read_u16()?,
            owner: PlayerIndex::read(reader)?,
            spawn_point: Option::read(reader)?,
        })
    }
}

/// One entry of `FREEPLAY_EVENT_UPDATE`.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeplayEventDelta {
    /// Game-defined event id.
    pub event_id: u16,
    /// Game-defined event state.
    pub state: u8,
    /// Completion from 0.0 to 1.0.
    pub progress: f32,
}

impl WireFormat for FreeplayEventDelta {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u16(self.event_id);
        writer.write_u8(self.state);
        writer.write_f32(self.progress);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            event_id: reader.read_u16()?,
            state: reader.read_u8()?,
            progress: reader.read_f32()?,
        })
    }
}

/// One entry of `PLAYER_SCORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreDelta {
    /// Player whose score changed.
    pub player: PlayerIndex,
    /// New total, not an increment.
    pub score: i32,
}

impl WireFormat for ScoreDelta {
    fn write(&self, writer: &mut BitWriter) {
        self.player.write(writer);
        writer.write_i32(self.score);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            player: PlayerIndex::read(reader)?,
            score: reader.read_i32()?,
        })
    }
}

/// One entry of `GAME_MODE_COUNTDOWN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    /// Time left until the round ends.
    pub remaining_ms: u32,
}

impl WireFormat for Countdown {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.remaining_ms);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            remaining_ms: reader.read_u32()?,
        })
    }
}

/// One entry of `HINT`. `target` of `None` addresses every player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HintMessage {
    /// Game-defined hint text id.
    pub hint_id: u16,
    /// `None` shows the hint to everyone.
    pub target: Option<PlayerIndex>,
    /// How long the hint stays up.
    pub duration_ms: u16,
}

impl WireFormat for HintMessage {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u16(self.hint_id);
        self.target.write(writer);
        writer.write_u16(self.duration_ms);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            hint_id: reader.read_u16()?,
            target: Option::read(reader)?,
            duration_ms: reader.read_u16()?,
        })
    }
}

/// One entry of `MINIMAP_MESSAGE`.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimapMarker {
    /// Game-defined marker type.
    pub kind: u8,
    /// Horizontal map position.
    pub x: f32,
    /// Vertical map position.
    pub y: f32,
    /// Entity the marker follows, if any.
    pub entity: Option<EntityId>,
}

impl WireFormat for MinimapMarker {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u8(self.kind);
        writer.write_f32(self.x);
        writer.write_f32(self.y);
        self.entity.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind: reader.read_u8()?,
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            entity: Option::read(reader)?,
        })
    }
}

/// One entry of `AUDIO`. Positionless cues play globally.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioCue {
    /// Game-defined sound id.
    pub sound_id: u32,
    /// `None` plays the sound without position.
    pub position: Option<Vec3>,
    /// Linear gain, 1.0 is unchanged.
    pub volume: f32,
}

impl WireFormat for AudioCue {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.sound_id);
        self.position.write(writer);
        writer.write_f32(self.volume);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            sound_id: reader.read_u32()?,
            position: Option::read(reader)?,
            volume: reader.read_f32()?,
        })
    }
}

/// One entry of `FIRE_HOSE_CREATED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireHose {
    /// The hose entity.
    pub hose: EntityId,
    /// Entity the hose is attached to.
    pub source: EntityId,
    /// Entity being sprayed.
    pub target: EntityId,
}

impl WireFormat for FireHose {
    fn write(&self, writer: &mut BitWriter) {
        self.hose.write(writer);
        self.source.write(writer);
        self.target.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            hose: EntityId::read(reader)?,
            source: EntityId::read(reader)?,
            target: EntityId::read(reader)?,
        })
    }
}

/// One entry of `PARTICLE_SPAWN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleEffect {
    /// Game-defined effect id.
    pub effect_id: u16,
    /// Emitter origin.
    pub position: Vec3,
    /// Emission direction.
    pub direction: Vec3,
}

impl WireFormat for ParticleEffect {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u16(self.effect_id);
        self.position.write(writer);
        self.direction.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            effect_id: reader.read_u16()?,
            position: Vec3::read(reader)?,
            direction: Vec3::read(reader)?,
        })
    }
}

/// One entry of `LAYER_TOGGLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerChange {
    /// Game-defined map layer.
    pub layer_id: u16,
    /// New visibility.
    pub visible: bool,
}

impl WireFormat for LayerChange {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u16(self.layer_id);
        writer.write_bool(self.visible);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            layer_id: reader.read_u16()?,
            visible: reader.read_bool()?,
        })
    }
}

/// Entry written by the entity-fade handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityFade {
    /// Entity to fade.
    pub entity: EntityId,
    /// True fades in, false fades out.
    pub fade_in: bool,
    /// Fade length.
    pub duration_ms: u16,
}

impl WireFormat for EntityFade {
    fn write(&self, writer: &mut BitWriter) {
        self.entity.write(writer);
        writer.write_bool(self.fade_in);
        writer.write_u16(self.duration_ms);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity: EntityId::read(reader)?,
            fade_in: reader.read_bool()?,
            duration_ms: reader.read_u16()?,
        })
    }
}

/// Entry written by the minimap-ping handler. Clients may originate these.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimapPingMark {
    /// Player who placed the mark.
    pub player: PlayerIndex,
    /// Horizontal map position.
    pub x: f32,
    /// Vertical map position.
    pub y: f32,
}

impl WireFormat for MinimapPingMark {
    fn write(&self, writer: &mut BitWriter) {
        self.player.write(writer);
        writer.write_f32(self.x);
        writer.write_f32(self.y);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            player: PlayerIndex::read(reader)?,
            x: reader.read_f32()?,
            y: reader.read_f32()?,
        })
    }
}
