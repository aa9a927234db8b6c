//! Wire protocol for Multiplay.
//!
//! This crate is the "Protocol Helper": it knows how every operation
//! message looks on the wire and nothing about connections or sessions.
//!
//! - **Bit stream** ([`BitWriter`], [`BitReader`], [`RawBits`]): the
//!   serialization substrate.
//! - **Codecs** ([`WireFormat`]): one `write`/`read` pair per payload type.
//! - **Framing** ([`FrameFormat`], [`MAIN_FRAME`]): magic, version and
//!   payload bit length in front of every frame. The proxy and matchmaking
//!   protocols reuse the same header with their own magic.
//! - **Messages** ([`OperationMessage`], [`Message`]): the tag catalogue
//!   and the decoded union.
//!
//! ```text
//! Transport (bytes) → Frame header → [tag][payload] ... → Session
//! ```

mod bitstream;
mod error;
mod frame;
mod message;
pub mod messages;
mod operation;
mod types;
mod wire;

pub use bitstream::{BitReader, BitWriter, MAX_DECLARED_LEN, RawBits};
pub use error::ProtocolError;
pub use frame::{FrameFormat, FrameHeader, MAIN_FRAME, MIN_PROTOCOL_VERSION, PROTOCOL_VERSION};
pub use message::{DecodedFrame, FrameBuilder, Message, decode_frame, encode_message};
pub use operation::{MessageCategory, OperationMessage};
pub use types::{
    Color, ComponentId, ContentChecksum, EntityId, GameMode, HostEntry, JoinResponse,
    LeaveReason, PlayerIndex, ProxyEndpoint, SessionInfo, Tick, Transform, Vec3,
};
pub use wire::{WireFormat, from_raw, to_raw};
