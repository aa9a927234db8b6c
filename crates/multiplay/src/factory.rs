//! Transport selection.
//!
//! A session is created against a target chosen by configuration: a
//! direct WebSocket address, an in-process loopback, or a relay. The
//! target turns into the matching link or acceptor and the host and client
//! never look at which one they got.

use multiplay_proxy::{ProxyHostConnection, ProxySessionCreator};
use multiplay_transport::{Acceptor, HostConnection, LoopbackConnector, LoopbackListener};

use crate::MultiplayError;

/// Where a client connects to.
#[derive(Debug, Clone)]
pub enum ConnectTarget {
    /// A host listening for WebSocket links.
    #[cfg(feature = "websocket")]
    Direct { host: String, port: u16 },
    /// A host in the same process.
    Loopback(LoopbackConnector),
    /// A relayed session, reached through a link to the relay itself.
    Proxy {
        relay: Box<ConnectTarget>,
        session_id: u32,
    },
}

impl ConnectTarget {
    #[cfg(feature = "websocket")]
    pub fn direct(host: impl Into<String>, port: u16) -> Self {
        Self::Direct {
            host: host.into(),
            port,
        }
    }

    pub fn proxy(relay: ConnectTarget, session_id: u32) -> Self {
        Self::Proxy {
            relay: Box::new(relay),
            session_id,
        }
    }

    /// Builds an unconnected link for this target.
    pub fn into_link(self) -> Box<dyn HostConnection> {
        match self {
            #[cfg(feature = "websocket")]
            Self::Direct { host, port } => {
                Box::new(multiplay_transport::WebSocketHostConnection::new(&host, port))
            }
            Self::Loopback(connector) => Box::new(connector.connection()),
            Self::Proxy { relay, session_id } => {
                Box::new(ProxyHostConnection::new(relay.into_link(), session_id))
            }
        }
    }
}

/// Where a host accepts clients.
#[derive(Debug)]
pub enum ListenTarget {
    /// Bind a WebSocket listener on `addr`, e.g. `"0.0.0.0:7777"`.
    #[cfg(feature = "websocket")]
    Direct { addr: String },
    Loopback(LoopbackListener),
    /// Open a session on the relay reached through `relay`.
    Proxy { relay: ConnectTarget },
}

impl ListenTarget {
    /// Opens the acceptor for this target.
    ///
    /// Only the direct listener awaits anything; the relay link connects
    /// in the background and reports readiness through
    /// [`Acceptor::poll_status`].
    pub async fn open(self) -> Result<Box<dyn Acceptor>, MultiplayError> {
        match self {
            #[cfg(feature = "websocket")]
            Self::Direct { addr } => {
                let listener = multiplay_transport::WebSocketListener::bind(&addr).await?;
                tracing::info!(addr = %listener.local_addr(), "listening for direct links");
                Ok(Box::new(listener))
            }
            other => other.open_local(),
        }
    }

    /// Opens targets that need no runtime to bind.
    ///
    /// # Errors
    /// [`MultiplayError::Transport`] for a direct target, which must be
    /// opened with [`ListenTarget::open`].
    pub fn open_local(self) -> Result<Box<dyn Acceptor>, MultiplayError> {
        match self {
            #[cfg(feature = "websocket")]
            Self::Direct { .. } => Err(multiplay_transport::TransportError::AcceptFailed(
                std::io::Error::other("direct listeners are bound asynchronously"),
            )
            .into()),
            Self::Loopback(listener) => Ok(Box::new(listener)),
            Self::Proxy { relay } => Ok(Box::new(ProxySessionCreator::new(relay.into_link())?)),
        }
    }
}
