//! Session discovery for Multiplay.
//!
//! Hosts advertise a [`HostEntry`](multiplay_protocol::HostEntry) on a
//! matchmaking server and players fetch the list of open sessions. The
//! protocol reuses the framing of the main protocol under its own `MMAKE`
//! magic.

mod client;
mod error;
mod protocol;
mod server;

pub use client::{MatchmakingClient, MatchmakingEvent};
pub use error::MatchmakingError;
pub use protocol::{ErrorCode, HostId, MATCHMAKING_FRAME, MatchmakingMessage};
pub use server::MatchmakingServer;
