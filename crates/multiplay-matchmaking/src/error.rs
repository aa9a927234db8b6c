//! Error types for matchmaking.

use multiplay_protocol::ProtocolError;
use multiplay_transport::TransportError;

use crate::ErrorCode;

/// Errors that can occur while talking to a matchmaking server.
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("matchmaking protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("matchmaking transport error: {0}")]
    Transport(#[from] TransportError),

    /// The operation needs a host id and none was assigned yet.
    #[error("host is not registered")]
    NotRegistered,

    /// The server refused a request.
    #[error("matchmaking server error {code:?}: {text}")]
    Server { code: ErrorCode, text: String },
}
