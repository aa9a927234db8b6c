//! Matchmaking wire format: one [`MatchmakingMessage`] per `MMAKE` frame.

use std::fmt;

use multiplay_protocol::{
    BitReader, BitWriter, FrameFormat, HostEntry, ProtocolError, WireFormat,
};

/// Frame header for matchmaking links.
pub const MATCHMAKING_FRAME: FrameFormat = FrameFormat {
    magic: b"MMAKE",
    version: 1,
    min_version: 1,
};

/// Id the server gives a registered host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub u32);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host-{}", self.0)
    }
}

/// Why the server refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UnknownHost,
    /// The host id belongs to another connection.
    NotOwner,
    Malformed,
    /// A code this build does not know.
    Other(u8),
}

impl ErrorCode {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::UnknownHost => 1,
            Self::NotOwner => 2,
            Self::Malformed => 3,
            Self::Other(code) => code,
        }
    }

    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::UnknownHost,
            2 => Self::NotOwner,
            3 => Self::Malformed,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchmakingMessage {
    Register(HostEntry),
    Registered(HostId),
    Update { id: HostId, entry: HostEntry },
    Unregister(HostId),
    ListHosts,
    HostList(Vec<(HostId, HostEntry)>),
    Error { code: ErrorCode, text: String },
}

impl MatchmakingMessage {
    pub fn tag(&self) -> u8 {
        match self {
            Self::Register(_) => 0,
            Self::Registered(_) => 1,
            Self::Update { .. } => 2,
            Self::Unregister(_) => 3,
            Self::ListHosts => 4,
            Self::HostList(_) => 5,
            Self::Error { .. } => 6,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer.write_u8(self.tag());
        match self {
            Self::Register(entry) => entry.write(&mut writer),
            Self::Registered(id) | Self::Unregister(id) => writer.write_u32(id.0),
            Self::Update { id, entry } => {
                writer.write_u32(id.0);
                entry.write(&mut writer);
            }
            Self::ListHosts => {}
            Self::HostList(hosts) => {
                writer.write_var_u32(hosts.len() as u32);
                for (id, entry) in hosts {
                    writer.write_u32(id.0);
                    entry.write(&mut writer);
                }
            }
            Self::Error { code, text } => {
                writer.write_u8(code.as_u8());
                writer.write_string(text);
            }
        }
        MATCHMAKING_FRAME.encode(&writer.into_raw())
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (_, mut reader) = MATCHMAKING_FRAME.read_and_check_header(frame)?;
        let message = Self::read_body(&mut reader)?;
        if !reader.is_exhausted() {
            return Err(ProtocolError::InvalidValue(format!(
                "{} trailing bits after matchmaking message",
                reader.remaining_bits()
            )));
        }
        Ok(message)
    }

    fn read_body(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let message = match reader.read_u8()? {
            0 => Self::Register(HostEntry::read(reader)?),
            1 => Self::Registered(HostId(reader.read_u32()?)),
            2 => Self::Update {
                id: HostId(reader.read_u32()?),
                entry: HostEntry::read(reader)?,
            },
            3 => Self::Unregister(HostId(reader.read_u32()?)),
            4 => Self::ListHosts,
            5 => {
                let count = reader.read_len()?;
                let mut hosts = Vec::with_capacity(count.min(256));
                for _ in 0..count {
                    let id = HostId(reader.read_u32()?);
                    hosts.push((id, HostEntry::read(reader)?));
                }
                Self::HostList(hosts)
            }
            6 => Self::Error {
                code: ErrorCode::from_u8(reader.read_u8()?),
                text: reader.read_string()?,
            },
            other => return Err(ProtocolError::UnknownOperation(other)),
        };
        Ok(message)
    }
}
