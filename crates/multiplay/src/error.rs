//! Unified error type for Multiplay.

use multiplay_cache::CacheError;
use multiplay_matchmaking::MatchmakingError;
use multiplay_protocol::ProtocolError;
use multiplay_proxy::ProxyError;
use multiplay_session::SessionError;
use multiplay_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors, so callers of the facade only deal with this one type.
#[derive(Debug, thiserror::Error)]
pub enum MultiplayError {
    /// A transport-level error (connect, send, accept).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame or payload could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session operation was refused (state, roster, handlers).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Entity tracking or a cache update failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The relay link or relay protocol failed.
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// The matchmaking link or registry refused a request.
    #[error(transparent)]
    Matchmaking(#[from] MatchmakingError),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiplay_protocol::PlayerIndex;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let multiplay_err: MultiplayError = err.into();
        assert!(matches!(multiplay_err, MultiplayError::Transport(_)));
        assert!(multiplay_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownOperation(200);
        let multiplay_err: MultiplayError = err.into();
        assert!(matches!(multiplay_err, MultiplayError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::PlayerNotFound(PlayerIndex(3));
        let multiplay_err: MultiplayError = err.into();
        assert!(matches!(multiplay_err, MultiplayError::Session(_)));
        assert!(multiplay_err.to_string().contains("P3"));
    }

    #[test]
    fn test_from_cache_error() {
        let err = CacheError::NotTracked(multiplay_protocol::EntityId(9));
        let multiplay_err: MultiplayError = err.into();
        assert!(matches!(multiplay_err, MultiplayError::Cache(_)));
    }

    #[test]
    fn test_from_proxy_error() {
        let err = ProxyError::UnknownSession(42);
        let multiplay_err: MultiplayError = err.into();
        assert!(matches!(multiplay_err, MultiplayError::Proxy(_)));
    }

    #[test]
    fn test_from_matchmaking_error() {
        let err = MatchmakingError::NotRegistered;
        let multiplay_err: MultiplayError = err.into();
        assert!(matches!(multiplay_err, MultiplayError::Matchmaking(_)));
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let multiplay_err: MultiplayError = err.into();
        assert!(matches!(multiplay_err, MultiplayError::Config(_)));
    }
}
