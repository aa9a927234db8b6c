//! Error types for the relay layer.

use multiplay_protocol::ProtocolError;
use multiplay_transport::TransportError;

use crate::ProxyClientId;

/// Errors that can occur while talking to or running a relay.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// A relay frame could not be decoded.
    #[error("relay protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The link underneath the relay failed.
    #[error("relay transport error: {0}")]
    Transport(#[from] TransportError),

    /// No relay session has this id.
    #[error("relay session {0} not found")]
    UnknownSession(u32),

    /// The session has no member with this client id.
    #[error("relay client {0} not found")]
    UnknownClient(ProxyClientId),

    /// Every client id of a session is in use.
    #[error("relay session {0} is full")]
    SessionFull(u32),
}
