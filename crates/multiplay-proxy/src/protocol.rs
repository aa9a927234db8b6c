//! Relay wire format.
//!
//! Every relay frame carries exactly one [`ProxyMessage`] inside the
//! `MPROXY` frame header. Game frames travel opaque inside
//! [`ProxyMessage::Data`]; the relay never looks into them.

use std::fmt;

use multiplay_protocol::{BitReader, BitWriter, FrameFormat, ProtocolError};

/// Frame header for relay links.
pub const PROXY_FRAME: FrameFormat = FrameFormat {
    magic: b"MPROXY",
    version: 1,
    min_version: 1,
};

/// Id the relay gives each member of a session, unique within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ProxyClientId(pub u16);

impl fmt::Display for ProxyClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relay-client-{}", self.0)
    }
}

/// One message on a relay link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyMessage {
    /// Host asks the relay to open a session.
    CreateSession,
    /// Relay tells the host which session id clients must use.
    SessionCreated { session_id: u32 },
    /// Client asks to join a session.
    ConnectToSession { session_id: u32 },
    /// Relay answers a [`ProxyMessage::ConnectToSession`].
    ConnectResult {
        accepted: bool,
        client_id: ProxyClientId,
    },
    /// Relay tells the host a member joined.
    ClientConnected(ProxyClientId),
    /// Relay tells the host a member left. `lost` is set when the
    /// member's link broke instead of closing cleanly.
    ClientDisconnected {
        client_id: ProxyClientId,
        lost: bool,
    },
    /// Host asks the relay to drop a member.
    DisconnectClient(ProxyClientId),
    /// A game frame. Towards the host `client_id` names the sender,
    /// towards a member it names the recipient.
    Data {
        client_id: ProxyClientId,
        bytes: Vec<u8>,
    },
    /// The session is gone.
    SessionClosed,
    KeepAlive,
}

impl ProxyMessage {
    pub fn tag(&self) -> u8 {
        match self {
            Self::CreateSession => 0,
            Self::SessionCreated { .. } => 1,
            Self::ConnectToSession { .. } => 2,
            Self::ConnectResult { .. } => 3,
            Self::ClientConnected(_) => 4,
            Self::ClientDisconnected { .. } => 5,
            Self::DisconnectClient(_) => 6,
            Self::Data { .. } => 7,
            Self::SessionClosed => 8,
            Self::KeepAlive => 9,
        }
    }

    /// Encodes the message as one complete relay frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer.write_u8(self.tag());
        match self {
            Self::CreateSession | Self::SessionClosed | Self::KeepAlive => {}
            Self::SessionCreated { session_id } | Self::ConnectToSession { session_id } => {
                writer.write_u32(*session_id);
            }
            Self::ConnectResult {
                accepted,
                client_id,
            } => {
                writer.write_bool(*accepted);
                writer.write_u16(client_id.0);
            }
            Self::ClientConnected(id) | Self::DisconnectClient(id) => {
                writer.write_u16(id.0);
            }
            Self::ClientDisconnected { client_id, lost } => {
                writer.write_u16(client_id.0);
                writer.write_bool(*lost);
            }
            Self::Data { client_id, bytes } => {
                writer.write_u16(client_id.0);
                writer.write_var_u32(bytes.len() as u32);
                writer.write_bytes(bytes);
            }
        }
        PROXY_FRAME.encode(&writer.into_raw())
    }

    /// Decodes one relay frame. Trailing bits are an error.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (_, mut reader) = PROXY_FRAME.read_and_check_header(frame)?;
        let message = Self::read_body(&mut reader)?;
        if !reader.is_exhausted() {
            return Err(ProtocolError::InvalidValue(format!(
                "{} trailing bits after relay message",
                reader.remaining_bits()
            )));
        }
        Ok(message)
    }

    fn read_body(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let tag = reader.read_u8()?;
        let message = match tag {
            0 => Self::CreateSession,
            1 => Self::SessionCreated {
                session_id: reader.read_u32()?,
            },
            2 => Self::ConnectToSession {
                session_id: reader.read_u32()?,
            },
            3 => Self::ConnectResult {
                accepted: reader.read_bool()?,
                client_id: ProxyClientId(reader.read_u16()?),
            },
            4 => Self::ClientConnected(ProxyClientId(reader.read_u16()?)),
            5 => Self::ClientDisconnected {
                client_id: ProxyClientId(reader.read_u16()?),
                lost: reader.read_bool()?,
            },
            6 => Self::DisconnectClient(ProxyClientId(reader.read_u16()?)),
            7 => {
                let client_id = ProxyClientId(reader.read_u16()?);
                let len = reader.read_var_u32()? as usize;
                Self::Data {
                    client_id,
                    bytes: reader.read_bytes(len)?,
                }
            }
            8 => Self::SessionClosed,
            9 => Self::KeepAlive,
            other => return Err(ProtocolError::UnknownOperation(other)),
        };
        Ok(message)
    }
}
