//! Outer frame envelope shared by every Multiplay protocol.
//!
//! ```text
//! ┌──────────────┬──────────────┬────────────────────┬──────────────┐
//! │ magic        │ version u16  │ payload bits u32   │ payload ...  │
//! │ (fixed ASCII)│ little endian│ little endian      │ (bit packed) │
//! └──────────────┴──────────────┴────────────────────┴──────────────┘
//! ```
//!
//! The main protocol, the relay protocol, and the matchmaking protocol each
//! have their own [`FrameFormat`] (magic + accepted version range).

use crate::bitstream::{BitReader, RawBits};
use crate::ProtocolError;

/// Current version of the main multiplayer protocol.
pub const PROTOCOL_VERSION: u16 = 3;

/// Oldest main protocol version this build still accepts.
pub const MIN_PROTOCOL_VERSION: u16 = 3;

/// Frame format of the main multiplayer protocol.
pub const MAIN_FRAME: FrameFormat = FrameFormat {
    magic: b"MPLAY",
    version: PROTOCOL_VERSION,
    min_version: MIN_PROTOCOL_VERSION,
};

/// Magic identifier plus the accepted version range of one protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub magic: &'static [u8],
    pub version: u16,
    pub min_version: u16,
}

/// A validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u16,
    pub payload_bits: u32,
}

impl FrameFormat {
    /// Size of the header in bytes.
    pub fn header_len(&self) -> usize {
        self.magic.len() + 2 + 4
    }

    /// Prepends the header to `payload`.
    pub fn encode(&self, payload: &RawBits) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.header_len() + payload.as_bytes().len());
        frame.extend_from_slice(self.magic);
        frame.extend_from_slice(&self.version.to_le_bytes());
        frame.extend_from_slice(&payload.bit_len().to_le_bytes());
        frame.extend_from_slice(payload.as_bytes());
        frame
    }

    /// Validates magic, version, and declared length before handing out a
    /// reader bounded to exactly the declared payload bits.
    pub fn read_and_check_header<'a>(
        &self,
        frame: &'a [u8],
    ) -> Result<(FrameHeader, BitReader<'a>), ProtocolError> {
        let header_len = self.header_len();
        if frame.len() < header_len {
            return Err(ProtocolError::Truncated {
                needed: header_len as u32 * 8,
                available: frame.len() as u32 * 8,
            });
        }

        let magic_len = self.magic.len();
        if &frame[..magic_len] != self.magic {
            return Err(ProtocolError::BadMagic);
        }

        let version = u16::from_le_bytes([frame[magic_len], frame[magic_len + 1]]);
        if version < self.min_version || version > self.version {
            return Err(ProtocolError::UnsupportedVersion {
                found: version,
                minimum: self.min_version,
                current: self.version,
            });
        }

        let len_at = magic_len + 2;
        let payload_bits = u32::from_le_bytes([
            frame[len_at],
            frame[len_at + 1],
            frame[len_at + 2],
            frame[len_at + 3],
        ]);
        let reader = BitReader::with_limit(&frame[header_len..], payload_bits)?;

        Ok((
            FrameHeader {
                version,
                payload_bits,
            },
            reader,
        ))
    }
}
