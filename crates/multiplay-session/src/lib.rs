//! Session layer for Multiplay.
//!
//! Everything a host and a client share about one multiplayer session:
//!
//! - [`SessionState`]: the connection state machine.
//! - [`SessionSettings`]: name, password, player limit, map.
//! - [`Roster`] of [`PlayerInfo`], keyed by player index.
//! - [`ChatHistory`]: bounded, oldest evicted.
//! - [`EventBus`]: [`SessionEvent`]s fanned out to subscribers.
//! - [`HandlerManager`]: plug-in handlers for side-channel message kinds.
//!
//! [`SessionBase`] bundles them; the host and client roles own one each and
//! expose it through [`SessionRole`].

mod chat;
mod error;
mod events;
mod handler;
mod player;
mod session;
mod settings;
mod state;

pub use chat::{ChatHistory, DEFAULT_CHAT_CAPACITY};
pub use error::SessionError;
pub use events::{EventBus, SessionEvent};
pub use handler::{
    BatchedEvents, EntityFadeHandler, HandlerManager, MinimapPingHandler, OperationMessageHandler,
};
pub use player::{PingStatus, PlayerInfo, Roster};
pub use session::{SessionBase, SessionRole};
pub use settings::{MAX_PLAYERS, SessionSettings};
pub use state::SessionState;
