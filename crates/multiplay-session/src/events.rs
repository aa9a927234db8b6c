//! Observable session events.
//!
//! Anything a UI or side system would react to is emitted as a
//! [`SessionEvent`] to every subscriber. Subscribers receive through an
//! unbounded channel, so emitting never blocks the tick.

use multiplay_protocol::messages::{
    ChatLine, CommandResult, GameEnd, LoadMap, PlayerPing, UnitOrderResult,
};
use multiplay_protocol::{JoinResponse, LeaveReason, PlayerIndex, SessionInfo};
use tokio::sync::mpsc;

use crate::SessionState;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        old: SessionState,
        new: SessionState,
    },
    ChatMessage(ChatLine),
    PlayerJoined {
        index: PlayerIndex,
        name: String,
    },
    PlayerLeft {
        index: PlayerIndex,
        reason: LeaveReason,
    },
    PlayerInfoChanged {
        index: PlayerIndex,
    },
    ReadyStateChanged {
        index: PlayerIndex,
        ready: bool,
    },
    UserDataChanged {
        index: PlayerIndex,
    },
    /// The host answered our join request.
    JoinResponse(JoinResponse),
    /// The transport could not reach the host.
    ConnectFailed(String),
    /// An established link broke.
    ConnectionLost(String),
    /// The relay link broke; every proxied player is gone with it.
    LostConnectionToProxy(String),
    Kicked {
        reason: String,
    },
    CommandResult(CommandResult),
    OrderedUnitResult(UnitOrderResult),
    PingsUpdated(Vec<PlayerPing>),
    /// The host asked clients to load a map.
    MapLoadRequested(LoadMap),
    SettingsChanged(SessionInfo),
    GameEnded(GameEnd),
    HighscoreSubmitted {
        index: PlayerIndex,
        accepted: bool,
    },
    /// The relay confirmed the hosted session.
    ProxySessionCreated {
        session_id: u32,
    },
    SessionClosed,
}

/// Fan-out of [`SessionEvent`]s to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Sends `event` to every live subscriber and forgets the ones whose
    /// receiver was dropped.
    pub fn emit(&mut self, event: SessionEvent) {
        tracing::trace!(?event, "session event");
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
