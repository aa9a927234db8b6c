//! Error types for the protocol layer.
//!
//! Every codec returns `Result<_, ProtocolError>`. Callers treat any error
//! as "this message could not be parsed" and drop it; nothing in here is
//! fatal to a session.

/// Errors that can occur while reading frames and payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame does not start with the expected magic identifier.
    #[error("bad magic identifier")]
    BadMagic,

    /// The frame was written by a protocol version we do not accept.
    #[error("unsupported protocol version {found} (accepted {minimum}..={current})")]
    UnsupportedVersion {
        found: u16,
        minimum: u16,
        current: u16,
    },

    /// A read needed more bits than the frame (or payload) holds.
    #[error("truncated data: needed {needed} bits, {available} available")]
    Truncated { needed: u32, available: u32 },

    /// The operation message tag is not in the catalogue.
    #[error("unknown operation message tag {0}")]
    UnknownOperation(u8),

    /// A value decoded fine bit-wise but is not meaningful.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A declared list or string length exceeds the protocol limit.
    #[error("declared length {0} exceeds protocol limit")]
    LengthOverflow(u32),
}
