//! Error types for the session layer.

use multiplay_protocol::{OperationMessage, PlayerIndex, ProtocolError};

use crate::SessionState;

/// Errors raised by session operations.
///
/// Join rejections are not errors; they travel as a `JoinResponse` value.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The state machine does not allow this move.
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    /// The operation needs a different state, e.g. submitting a highscore
    /// outside post game.
    #[error("operation requires state {expected}, session is {actual}")]
    WrongState {
        expected: SessionState,
        actual: SessionState,
    },

    /// Loading the map was requested while some player is not ready.
    #[error("not every player is ready")]
    PlayersNotReady,

    #[error("player {0} not found")]
    PlayerNotFound(PlayerIndex),

    /// Settings were rejected, e.g. shrinking below the current roster.
    #[error("invalid session settings: {0}")]
    InvalidSettings(String),

    #[error("a handler for {0} is already registered")]
    HandlerAlreadyRegistered(OperationMessage),

    /// Only handler-owned kinds can have a handler.
    #[error("{0} is not a handler-owned message kind")]
    NotHandlerKind(OperationMessage),

    /// A handler-owned message arrived with no handler registered.
    #[error("no handler registered for {0}")]
    UnhandledMessage(OperationMessage),

    /// The operation needs a live connection.
    #[error("not connected")]
    NotConnected,

    /// A handler could not parse its message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
