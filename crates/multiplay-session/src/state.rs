//! Session connection state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a session is in its lifecycle.
///
/// ```text
/// Client: None → ConnectingToHost → ConnectedToHost → Lobby
/// Host:   None → Lobby
/// Both:   Lobby → LoadingScreen → InGame → PostGame → PostGameFinish
/// ```
///
/// Every state may fall back to `None` (session closed, connection lost,
/// kicked). Apart from that, states only move forward within one connection
/// attempt: there is no way back to the lobby without reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    None,
    ConnectingToHost,
    ConnectedToHost,
    Lobby,
    LoadingScreen,
    InGame,
    PostGame,
    PostGameFinish,
}

impl SessionState {
    /// The regular forward step, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::None => Some(Self::ConnectingToHost),
            Self::ConnectingToHost => Some(Self::ConnectedToHost),
            Self::ConnectedToHost => Some(Self::Lobby),
            Self::Lobby => Some(Self::LoadingScreen),
            Self::LoadingScreen => Some(Self::InGame),
            Self::InGame => Some(Self::PostGame),
            Self::PostGame => Some(Self::PostGameFinish),
            Self::PostGameFinish => None,
        }
    }

    /// Returns `true` if moving to `target` is allowed.
    ///
    /// Besides the forward step, a host may enter the lobby directly from
    /// `None`, and any active state may drop back to `None`.
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::None, Self::None) => false,
            (_, Self::None) => true,
            (Self::None, Self::Lobby) => true,
            _ => self.next() == Some(target),
        }
    }

    /// Whether new players may still join.
    pub fn accepts_joins(self) -> bool {
        self == Self::Lobby
    }

    /// Whether the session has a live connection or a running host.
    pub fn is_active(self) -> bool {
        self != Self::None
    }

    /// Whether the simulation is running or has run.
    pub fn is_in_game(self) -> bool {
        matches!(self, Self::InGame | Self::PostGame | Self::PostGameFinish)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::ConnectingToHost => "CONNECTING_TO_HOST",
            Self::ConnectedToHost => "CONNECTED_TO_HOST",
            Self::Lobby => "LOBBY",
            Self::LoadingScreen => "LOADING_SCREEN",
            Self::InGame => "IN_GAME",
            Self::PostGame => "POST_GAME",
            Self::PostGameFinish => "POST_GAME_FINISH",
        };
        f.write_str(name)
    }
}
