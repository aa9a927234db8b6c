//! Transport abstraction layer for Multiplay.
//!
//! The session layer never touches sockets. It talks to one of two
//! role-specific link traits:
//!
//! - [`ClientConnection`]: what the **host** holds for each remote client.
//! - [`HostConnection`]: what a **client** holds for its single host.
//!
//! New host-side links arrive through an [`Acceptor`].
//!
//! All three are polled. Socket I/O runs on background tasks (or not at
//! all, for the loopback) and only *enqueues* [`LinkEvent`]s; the owning
//! Host or Client drains them synchronously once per tick. That keeps the
//! session logic single-threaded with exactly one mutator.
//!
//! # Implementations
//!
//! - [`loopback`]: in-process channel pairs, used by tests and for
//!   record/playback.
//! - `websocket` (feature, default): direct links over `tokio-tungstenite`.
//! - The proxy relay implementations live in `multiplay-proxy` and wrap
//!   another [`HostConnection`].

mod error;
pub mod loopback;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use loopback::{
    LoopbackClientConnection, LoopbackConnector, LoopbackHostConnection,
    LoopbackListener,
};
#[cfg(feature = "websocket")]
pub use websocket::{
    WebSocketClientConnection, WebSocketHostConnection, WebSocketListener,
};

use std::fmt;

/// Opaque identifier for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Something that happened on a link since it was last polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// An outgoing link finished connecting.
    Connected,
    /// One complete frame from the peer.
    Data(Vec<u8>),
    /// The peer closed the link on purpose.
    Closed,
    /// An outgoing link could not be established.
    ConnectFailed(String),
    /// The link broke without a clean close.
    ConnectionLost(String),
}

impl LinkEvent {
    /// Returns `true` for the events after which the link is unusable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::ConnectFailed(_) | Self::ConnectionLost(_)
        )
    }
}

/// Status changes of an [`Acceptor`] itself (as opposed to its links).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptorEvent {
    /// The acceptor is reachable by clients. Relay-backed acceptors report
    /// the numeric session id clients must use.
    Ready { session_id: Option<u32> },
    /// The acceptor lost its upstream (e.g. the relay connection). Every
    /// link it produced is gone as well.
    Lost(String),
}

/// Host-side handle to one remote client.
pub trait ClientConnection: Send {
    /// Unique identifier of this link.
    fn id(&self) -> ConnectionId;

    /// Queues one frame for delivery to the client.
    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Returns the next pending event, if any. Never blocks.
    fn poll_event(&mut self) -> Option<LinkEvent>;

    /// Closes the link. Idempotent.
    fn shutdown(&mut self);
}

/// Client-side handle to the host.
pub trait HostConnection: Send {
    /// Starts connecting. Completion is reported as
    /// [`LinkEvent::Connected`] or [`LinkEvent::ConnectFailed`].
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Queues one frame for delivery to the host.
    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Returns the next pending event, if any. Never blocks.
    fn poll_event(&mut self) -> Option<LinkEvent>;

    /// Closes the link. Idempotent.
    fn shutdown(&mut self);

    /// Whether losing this link should trigger an automatic reconnect.
    /// Only relay-backed links say yes; direct links are terminal.
    fn reconnectable(&self) -> bool {
        false
    }
}

/// Produces host-side links for newly arrived clients.
pub trait Acceptor: Send {
    /// Returns the next accepted client, if any. Never blocks.
    fn poll_accept(&mut self) -> Option<Box<dyn ClientConnection>>;

    /// Returns the next status change of the acceptor, if any.
    fn poll_status(&mut self) -> Option<AcceptorEvent> {
        None
    }

    /// Pushes out anything the acceptor's links queued since the last
    /// call. Direct acceptors send immediately and have nothing to flush;
    /// multiplexed ones batch writes onto their upstream here.
    fn flush(&mut self) {}

    /// Stops accepting and releases the listening resource.
    fn shutdown(&mut self);
}
