//! Operation message tags.
//!
//! The numeric value of each variant is the first byte of every operation
//! message on the wire. The mapping is versioned with
//! [`PROTOCOL_VERSION`](crate::PROTOCOL_VERSION): never renumber or reuse
//! a value, only append.

use std::fmt;

/// Broad grouping of operation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCategory {
    /// Joining, readiness, roster, chat, map loading, post-game.
    Lobby,
    /// Tick-tagged simulation payloads.
    Tick,
    /// Client commands and their results.
    Command,
    /// Ping traffic and session teardown.
    Liveness,
}

/// Every operation message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum OperationMessage {
    ClientJoinRequest = 0,
    ServerJoinResponse = 1,
    ServerPlayerJoined = 2,
    ServerPlayerLeft = 3,
    ServerPlayerKicked = 4,
    ClientReadyStateChanged = 5,
    ServerReadyStateChanged = 6,
    ClientUserDataChanged = 7,
    ServerUserDataChanged = 8,
    ClientPlayerInfoChanged = 9,
    ServerPlayerInfoChanged = 10,
    ServerSessionSettingsChanged = 11,
    ServerLoadMap = 12,
    ClientMapLoaded = 13,
    ServerGameStart = 14,
    ChatMessage = 15,
    ServerGameEnd = 16,
    HighscoreSubmitRequest = 17,
    HighscoreSubmitResult = 18,
    DataUpdate = 19,
    CreateEntity = 20,
    DestroyEntity = 21,
    SpawnUnit = 22,
    FreeplayEventUpdate = 23,
    PlayerScore = 24,
    GameModeCountdown = 25,
    Hint = 26,
    MinimapMessage = 27,
    Audio = 28,
    FireHoseCreated = 29,
    ParticleSpawn = 30,
    LayerToggle = 31,
    EntityFade = 32,
    MinimapPing = 33,
    ClientCommandExecution = 40,
    ServerCommandExecutionResponse = 41,
    ClientOrderedUnit = 42,
    ServerOrderedUnitResponse = 43,
    ServerPing = 50,
    ClientPingAcknowledge = 51,
    ServerPlayerPings = 52,
    ServerCloseSession = 53,
    ServerPostGameFinished = 54,
}

impl OperationMessage {
    /// Every kind, in tag order.
    pub const ALL: [OperationMessage; 43] = [
        Self::ClientJoinRequest,
        Self::ServerJoinResponse,
        Self::ServerPlayerJoined,
        Self::ServerPlayerLeft,
        Self::ServerPlayerKicked,
        Self::ClientReadyStateChanged,
        Self::ServerReadyStateChanged,
        Self::ClientUserDataChanged,
        Self::ServerUserDataChanged,
        Self::ClientPlayerInfoChanged,
        Self::ServerPlayerInfoChanged,
        Self::ServerSessionSettingsChanged,
        Self::ServerLoadMap,
        Self::ClientMapLoaded,
        Self::ServerGameStart,
        Self::ChatMessage,
        Self::ServerGameEnd,
        Self::HighscoreSubmitRequest,
        Self::HighscoreSubmitResult,
        Self::DataUpdate,
        Self::CreateEntity,
        Self::DestroyEntity,
        Self::SpawnUnit,
        Self::FreeplayEventUpdate,
        Self::PlayerScore,
        Self::GameModeCountdown,
        Self::Hint,
        Self::MinimapMessage,
        Self::Audio,
        Self::FireHoseCreated,
        Self::ParticleSpawn,
        Self::LayerToggle,
        Self::EntityFade,
        Self::MinimapPing,
        Self::ClientCommandExecution,
        Self::ServerCommandExecutionResponse,
        Self::ClientOrderedUnit,
        Self::ServerOrderedUnitResponse,
        Self::ServerPing,
        Self::ClientPingAcknowledge,
        Self::ServerPlayerPings,
        Self::ServerCloseSession,
        Self::ServerPostGameFinished,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_u8() == value)
    }

    pub fn category(self) -> MessageCategory {
        match self.as_u8() {
            0..=18 | 54 => MessageCategory::Lobby,
            19..=33 => MessageCategory::Tick,
            40..=43 => MessageCategory::Command,
            _ => MessageCategory::Liveness,
        }
    }

    /// Kinds whose payload is owned by a registered
    /// `OperationMessageHandler` rather than by the core dispatcher. Their
    /// body is length-prefixed so unknown ones can be skipped.
    pub fn is_handler_owned(self) -> bool {
        matches!(self, Self::EntityFade | Self::MinimapPing)
    }

    /// Kinds the client buffers by tick instead of applying on arrival.
    pub fn is_tick_tagged(self) -> bool {
        self.category() == MessageCategory::Tick
    }

    /// Kinds a client may send. Anything else arriving at the host is
    /// dropped.
    pub fn is_client_originated(self) -> bool {
        matches!(
            self,
            Self::ClientJoinRequest
                | Self::ClientReadyStateChanged
                | Self::ClientUserDataChanged
                | Self::ClientPlayerInfoChanged
                | Self::ClientMapLoaded
                | Self::ChatMessage
                | Self::HighscoreSubmitRequest
                | Self::ClientCommandExecution
                | Self::ClientOrderedUnit
                | Self::ClientPingAcknowledge
                | Self::MinimapPing
        )
    }
}

impl fmt::Display for OperationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}#{}", self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_inverts_as_u8_for_every_kind() {
        for kind in OperationMessage::ALL {
            assert_eq!(OperationMessage::from_u8(kind.as_u8()), Some(kind));
        }
    }

    #[test]
    fn test_tags_are_unique_and_sorted() {
        let tags: Vec<u8> = OperationMessage::ALL.iter().map(|k| k.as_u8()).collect();
        let mut sorted = tags.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(tags, sorted);
    }

    #[test]
    fn test_gaps_are_unknown() {
        assert_eq!(OperationMessage::from_u8(34), None);
        assert_eq!(OperationMessage::from_u8(255), None);
    }

    #[test]
    fn test_wire_values_are_pinned() {
        assert_eq!(OperationMessage::ServerLoadMap.as_u8(), 12);
        assert_eq!(OperationMessage::DataUpdate.as_u8(), 19);
        assert_eq!(OperationMessage::ServerPing.as_u8(), 50);
        assert_eq!(OperationMessage::ServerPostGameFinished.as_u8(), 54);
    }

    #[test]
    fn test_categories() {
        assert_eq!(OperationMessage::ChatMessage.category(), MessageCategory::Lobby);
        assert_eq!(
            OperationMessage::ServerPostGameFinished.category(),
            MessageCategory::Lobby
        );
        assert_eq!(OperationMessage::DestroyEntity.category(), MessageCategory::Tick);
        assert_eq!(
            OperationMessage::ClientOrderedUnit.category(),
            MessageCategory::Command
        );
        assert_eq!(
            OperationMessage::ClientPingAcknowledge.category(),
            MessageCategory::Liveness
        );
        assert!(OperationMessage::EntityFade.is_handler_owned());
        assert!(!OperationMessage::DataUpdate.is_handler_owned());
    }
}
