//! In-process loopback links.
//!
//! A loopback link is two unbounded channels, one per direction. Nothing
//! touches the network and no runtime is required, which makes it the
//! transport of choice for deterministic tests and for record/playback.
//!
//! Dropping one end without calling `shutdown` is observed by the other end
//! as [`LinkEvent::ConnectionLost`], which is how tests simulate a crash.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::{
    Acceptor, ClientConnection, ConnectionId, HostConnection, LinkEvent,
    TransportError,
};

/// One side of a loopback link.
#[derive(Debug)]
struct Endpoint {
    outbound: Option<UnboundedSender<LinkEvent>>,
    inbound: UnboundedReceiver<LinkEvent>,
    finished: bool,
}

impl Endpoint {
    fn pair() -> (Endpoint, Endpoint) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Endpoint {
                outbound: Some(a_tx),
                inbound: b_rx,
                finished: false,
            },
            Endpoint {
                outbound: Some(b_tx),
                inbound: a_rx,
                finished: false,
            },
        )
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or_else(|| {
            TransportError::ConnectionClosed("link shut down".into())
        })?;
        tx.send(LinkEvent::Data(data.to_vec())).map_err(|_| {
            TransportError::ConnectionClosed("peer dropped".into())
        })
    }

    fn poll(&mut self) -> Option<LinkEvent> {
        if self.finished {
            return None;
        }
        match self.inbound.try_recv() {
            Ok(event) => {
                if event.is_terminal() {
                    self.finish();
                }
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finish();
                Some(LinkEvent::ConnectionLost("peer dropped".into()))
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.outbound.take() {
            let _ = tx.send(LinkEvent::Closed);
        }
        self.finished = true;
    }

    fn finish(&mut self) {
        self.finished = true;
        self.outbound = None;
    }
}

/// Creates an already-connected link pair.
///
/// The host-side half is returned first. The client-side half starts with
/// a queued [`LinkEvent::Connected`].
pub fn pair(id: ConnectionId) -> (LoopbackClientConnection, LoopbackHostConnection) {
    let (host_end, client_end) = Endpoint::pair();
    let mut local = VecDeque::new();
    local.push_back(LinkEvent::Connected);
    (
        LoopbackClientConnection {
            id,
            endpoint: host_end,
        },
        LoopbackHostConnection {
            connector: None,
            endpoint: Some(client_end),
            local,
        },
    )
}

// ---------------------------------------------------------------------------
// Host side
// ---------------------------------------------------------------------------

/// Host-side end of a loopback link.
#[derive(Debug)]
pub struct LoopbackClientConnection {
    id: ConnectionId,
    endpoint: Endpoint,
}

impl ClientConnection for LoopbackClientConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.endpoint.send(data)
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        self.endpoint.poll()
    }

    fn shutdown(&mut self) {
        self.endpoint.shutdown();
    }
}

/// Accepts loopback links created through its [`LoopbackConnector`]s.
#[derive(Debug)]
pub struct LoopbackListener {
    incoming: UnboundedReceiver<LoopbackClientConnection>,
    connector: LoopbackConnector,
    open: bool,
}

impl LoopbackListener {
    /// Creates a listener with no pending links.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            incoming: rx,
            connector: LoopbackConnector {
                incoming: tx,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            open: true,
        }
    }

    /// Returns a handle clients use to reach this listener.
    pub fn connector(&self) -> LoopbackConnector {
        self.connector.clone()
    }
}

impl Default for LoopbackListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Acceptor for LoopbackListener {
    fn poll_accept(&mut self) -> Option<Box<dyn ClientConnection>> {
        if !self.open {
            return None;
        }
        let conn = self.incoming.try_recv().ok()?;
        tracing::debug!(id = %conn.id, "accepted loopback link");
        Some(Box::new(conn))
    }

    fn shutdown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.incoming.close();
        while let Ok(mut pending) = self.incoming.try_recv() {
            pending.shutdown();
        }
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Cloneable address of a [`LoopbackListener`].
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    incoming: UnboundedSender<LoopbackClientConnection>,
    next_id: Arc<AtomicU64>,
}

impl LoopbackConnector {
    /// Creates an unconnected client-side link aimed at the listener.
    pub fn connection(&self) -> LoopbackHostConnection {
        LoopbackHostConnection {
            connector: Some(self.clone()),
            endpoint: None,
            local: VecDeque::new(),
        }
    }
}

/// Client-side end of a loopback link.
#[derive(Debug)]
pub struct LoopbackHostConnection {
    connector: Option<LoopbackConnector>,
    endpoint: Option<Endpoint>,
    /// Events generated locally (connect outcome) ahead of peer events.
    local: VecDeque<LinkEvent>,
}

impl HostConnection for LoopbackHostConnection {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.endpoint.as_ref().is_some_and(|e| !e.finished) {
            return Err(TransportError::AlreadyStarted);
        }
        let Some(connector) = &self.connector else {
            return Err(TransportError::AlreadyStarted);
        };

        let (host_end, client_end) = Endpoint::pair();
        let id = ConnectionId::new(
            connector.next_id.fetch_add(1, Ordering::Relaxed),
        );
        let conn = LoopbackClientConnection {
            id,
            endpoint: host_end,
        };
        match connector.incoming.send(conn) {
            Ok(()) => {
                self.endpoint = Some(client_end);
                self.local.push_back(LinkEvent::Connected);
            }
            Err(_) => {
                self.local
                    .push_back(LinkEvent::ConnectFailed("listener closed".into()));
            }
        }
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match &mut self.endpoint {
            Some(endpoint) => endpoint.send(data),
            None => Err(TransportError::ConnectionClosed("not connected".into())),
        }
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        if let Some(event) = self.local.pop_front() {
            return Some(event);
        }
        self.endpoint.as_mut()?.poll()
    }

    fn shutdown(&mut self) {
        if let Some(endpoint) = &mut self.endpoint {
            endpoint.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_both_directions() {
        let (mut host_side, mut client_side) = pair(ConnectionId::new(1));
        assert_eq!(client_side.poll_event(), Some(LinkEvent::Connected));

        host_side.send_data(b"down").unwrap();
        client_side.send_data(b"up").unwrap();

        assert_eq!(client_side.poll_event(), Some(LinkEvent::Data(b"down".to_vec())));
        assert_eq!(host_side.poll_event(), Some(LinkEvent::Data(b"up".to_vec())));
        assert_eq!(host_side.poll_event(), None);
    }

    #[test]
    fn test_shutdown_reports_closed_to_peer() {
        let (mut host_side, mut client_side) = pair(ConnectionId::new(1));
        client_side.poll_event();
        client_side.shutdown();

        assert_eq!(host_side.poll_event(), Some(LinkEvent::Closed));
        assert_eq!(host_side.poll_event(), None);
        assert!(host_side.send_data(b"x").is_err());
    }

    #[test]
    fn test_drop_reports_connection_lost_to_peer() {
        let (mut host_side, client_side) = pair(ConnectionId::new(1));
        drop(client_side);

        assert!(matches!(
            host_side.poll_event(),
            Some(LinkEvent::ConnectionLost(_))
        ));
        assert_eq!(host_side.poll_event(), None);
    }

    #[test]
    fn test_listener_accepts_connector_links_with_unique_ids() {
        let mut listener = LoopbackListener::new();
        let connector = listener.connector();

        let mut a = connector.connection();
        let mut b = connector.connection();
        a.connect().unwrap();
        b.connect().unwrap();

        let first = listener.poll_accept().expect("first link");
        let second = listener.poll_accept().expect("second link");
        assert_ne!(first.id(), second.id());
        assert!(listener.poll_accept().is_none());
        assert_eq!(a.poll_event(), Some(LinkEvent::Connected));
    }

    #[test]
    fn test_connect_after_listener_shutdown_fails() {
        let mut listener = LoopbackListener::new();
        let connector = listener.connector();
        listener.shutdown();

        let mut conn = connector.connection();
        conn.connect().unwrap();
        assert!(matches!(
            conn.poll_event(),
            Some(LinkEvent::ConnectFailed(_))
        ));
    }

    #[test]
    fn test_connect_twice_while_live_is_rejected() {
        let listener = LoopbackListener::new();
        let mut conn = listener.connector().connection();
        conn.connect().unwrap();
        assert!(matches!(conn.connect(), Err(TransportError::AlreadyStarted)));
    }
}
