//! Relay support for Multiplay.
//!
//! A relay lets a host behind NAT accept clients: the host opens a session
//! on the relay, clients join it by numeric session id, and the relay
//! forwards frames between them.
//!
//! - [`ProxySessionCreator`]: host-side [`Acceptor`](multiplay_transport::Acceptor)
//!   that yields one link per relayed client.
//! - [`ProxyHostConnection`]: client-side
//!   [`HostConnection`](multiplay_transport::HostConnection) through the
//!   relay. Reconnectable.
//! - [`RelayServer`]: the relay itself.

mod connector;
mod creator;
mod error;
mod protocol;
mod relay;

pub use connector::ProxyHostConnection;
pub use creator::{ProxyClientConnection, ProxySessionCreator};
pub use error::ProxyError;
pub use protocol::{PROXY_FRAME, ProxyClientId, ProxyMessage};
pub use relay::RelayServer;
