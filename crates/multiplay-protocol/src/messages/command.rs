//! Player command and unit-order payloads.

use crate::bitstream::{BitReader, BitWriter};
use crate::types::{EntityId, Vec3};
use crate::wire::WireFormat;
use crate::ProtocolError;

/// `CLIENT_COMMAND_EXECUTION`. `command_id` is chosen by the client and
/// echoed back in the matching [`CommandResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Client-chosen id echoed in the result.
    pub command_id: u32,
    /// Game-defined command type.
    pub kind: u16,
    /// Units the command is given to.
    pub entities: Vec<EntityId>,
    /// World position, when the command has one.
    pub target: Option<Vec3>,
    /// Extra command parameter, 0 when unused.
    pub argument: i32,
}

impl WireFormat for Command {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.command_id);
        writer.write_u16(self.kind);
        self.entities.write(writer);
        self.target.write(writer);
        writer.write_i32(self.argument);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            command_id: reader.read_u32()?,
            kind: reader.read_u16()?,
            entities: Vec::read(reader)?,
            target: Option::read(reader)?,
            argument: reader.read_i32()?,
        })
    }
}

/// `SERVER_COMMAND_EXECUTION_RESPONSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    /// Id from the matching [`Command`].
    pub command_id: u32,
    /// Command type, copied from the request.
    pub kind: u16,
    /// Whether the host carried the command out.
    pub success: bool,
}

impl WireFormat for CommandResult {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.command_id);
        writer.write_u16(self.kind);
        writer.write_bool(self.success);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            command_id: reader.read_u32()?,
            kind: reader.read_u16()?,
            success: reader.read_bool()?,
        })
    }
}

/// `CLIENT_ORDERED_UNIT`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOrder {
    /// Client-chosen id echoed in the result.
    pub request_id: u32,
    /// Game-defined unit type to spawn.
    pub unit_type: u16,
    /// Where the unit should appear.
    pub spawn_point: Vec3,
}

impl WireFormat for UnitOrder {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.request_id);
        writer.write_u16(self.unit_type);
        self.spawn_point.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            request_id: reader.read_u32()?,
            unit_type: reader.read_u16()?,
            spawn_point: Vec3::read(reader)?,
        })
    }
}

/// `SERVER_ORDERED_UNIT_RESPONSE`. `entity` is the spawned unit on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitOrderResult {
    /// Id from the matching [`UnitOrder`].
    pub request_id: u32,
    /// Whether the unit was spawned.
    pub success: bool,
    /// The new unit, on success.
    pub entity: Option<EntityId>,
}

impl WireFormat for UnitOrderResult {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.request_id);
        writer.write_bool(self.success);
        self.entity.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            request_id: reader.read_u32()?,
            success: reader.read_bool()?,
            entity: Option::read(reader)?,
        })
    }
}
