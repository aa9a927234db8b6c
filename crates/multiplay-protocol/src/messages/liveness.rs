use crate::bitstream::{BitReader, BitWriter};
use crate::types::PlayerIndex;
use crate::wire::WireFormat;
use crate::ProtocolError;

/// `SERVER_PING` and `CLIENT_PING_ACKNOWLEDGE` share this body; the ack
/// echoes the id of the ping it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    /// Round number; the pong echoes it.
    pub ping_id: u32,
}

impl WireFormat for Ping {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.ping_id);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            ping_id: reader.read_u32()?,
        })
    }
}

/// One row of `SERVER_PLAYER_PINGS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerPing {
    /// Player the measurement belongs to.
    pub index: PlayerIndex,
    /// Last measured round trip, saturated at `u16::MAX`.
    pub rtt_ms: u16,
}

impl WireFormat for PlayerPing {
    fn write(&self, writer: &mut BitWriter) {
        self.index.write(writer);
        writer.write_u16(self.rtt_ms);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            index: PlayerIndex::read(reader)?,
            rtt_ms: reader.read_u16()?,
        })
    }
}
