//! Host side of a relay session.
//!
//! [`ProxySessionCreator`] owns one upstream link to the relay and fans it
//! out into one [`ProxyClientConnection`] per session member, so the host
//! can treat relayed clients exactly like direct ones.

use std::collections::{HashMap, VecDeque};

use multiplay_transport::{
    Acceptor, AcceptorEvent, ClientConnection, ConnectionId, HostConnection, LinkEvent,
    TransportError,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::{ProxyClientId, ProxyError, ProxyMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreatorState {
    Connecting,
    Creating,
    Ready(u32),
    Lost,
}

/// Acceptor that hosts a session on a relay.
pub struct ProxySessionCreator {
    link: Box<dyn HostConnection>,
    state: CreatorState,
    outbound_tx: UnboundedSender<ProxyMessage>,
    outbound_rx: UnboundedReceiver<ProxyMessage>,
    clients: HashMap<ProxyClientId, UnboundedSender<LinkEvent>>,
    accepted: VecDeque<Box<dyn ClientConnection>>,
    status: VecDeque<AcceptorEvent>,
    next_connection: u64,
}

impl ProxySessionCreator {
    /// Starts connecting `link` to the relay. The session is requested as
    /// soon as the link reports [`LinkEvent::Connected`].
    pub fn new(mut link: Box<dyn HostConnection>) -> Result<Self, ProxyError> {
        link.connect()?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            link,
            state: CreatorState::Connecting,
            outbound_tx,
            outbound_rx,
            clients: HashMap::new(),
            accepted: VecDeque::new(),
            status: VecDeque::new(),
            next_connection: 1,
        })
    }

    /// Relay session id, once the relay assigned one.
    pub fn session_id(&self) -> Option<u32> {
        match self.state {
            CreatorState::Ready(id) => Some(id),
            _ => None,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_lost(&self) -> bool {
        self.state == CreatorState::Lost
    }

    fn send_upstream(&mut self, message: &ProxyMessage) {
        if let Err(e) = self.link.send_data(&message.encode()) {
            warn!(error = %e, tag = message.tag(), "relay send failed");
        }
    }

    /// Drains the relay link and routes what arrived.
    fn pump(&mut self) {
        if self.state == CreatorState::Lost {
            return;
        }
        while let Some(event) = self.link.poll_event() {
            match event {
                LinkEvent::Connected => {
                    debug!("relay link up, requesting session");
                    self.state = CreatorState::Creating;
                    self.send_upstream(&ProxyMessage::CreateSession);
                }
                LinkEvent::Data(bytes) => match ProxyMessage::decode(&bytes) {
                    Ok(message) => self.route(message),
                    Err(e) => warn!(error = %e, "dropping malformed relay frame"),
                },
                LinkEvent::Closed => {
                    self.lose("relay closed the link".into());
                    return;
                }
                LinkEvent::ConnectFailed(reason) | LinkEvent::ConnectionLost(reason) => {
                    self.lose(reason);
                    return;
                }
            }
        }
    }

    fn route(&mut self, message: ProxyMessage) {
        match message {
            ProxyMessage::SessionCreated { session_id } => {
                info!(session_id, "relay session created");
                self.state = CreatorState::Ready(session_id);
                self.status.push_back(AcceptorEvent::Ready {
                    session_id: Some(session_id),
                });
            }
            ProxyMessage::ClientConnected(client_id) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let id = ConnectionId::new(self.next_connection);
                self.next_connection += 1;
                if self.clients.insert(client_id, tx).is_some() {
                    warn!(%client_id, "relay reused a live client id");
                }
                debug!(%client_id, %id, "relay client connected");
                self.accepted.push_back(Box::new(ProxyClientConnection {
                    id,
                    client_id,
                    outbound: self.outbound_tx.clone(),
                    inbound: rx,
                    open: true,
                    finished: false,
                }));
            }
            ProxyMessage::ClientDisconnected { client_id, lost } => {
                if let Some(tx) = self.clients.remove(&client_id) {
                    debug!(%client_id, lost, "relay client disconnected");
                    let event = if lost {
                        LinkEvent::ConnectionLost(format!("{client_id} lost its relay link"))
                    } else {
                        LinkEvent::Closed
                    };
                    let _ = tx.send(event);
                }
            }
            ProxyMessage::Data { client_id, bytes } => match self.clients.get(&client_id) {
                Some(tx) => {
                    if tx.send(LinkEvent::Data(bytes)).is_err() {
                        self.clients.remove(&client_id);
                    }
                }
                None => debug!(%client_id, "data for unknown relay client"),
            },
            ProxyMessage::SessionClosed => self.lose("relay closed the session".into()),
            ProxyMessage::KeepAlive => {}
            other => warn!(tag = other.tag(), "unexpected relay message for a host"),
        }
    }

    fn lose(&mut self, reason: String) {
        if self.state == CreatorState::Lost {
            return;
        }
        warn!(%reason, "lost relay connection");
        self.state = CreatorState::Lost;
        for (_, tx) in self.clients.drain() {
            let _ = tx.send(LinkEvent::ConnectionLost(reason.clone()));
        }
        self.status.push_back(AcceptorEvent::Lost(reason));
        self.link.shutdown();
    }
}

impl Acceptor for ProxySessionCreator {
    fn poll_accept(&mut self) -> Option<Box<dyn ClientConnection>> {
        self.pump();
        self.accepted.pop_front()
    }

    fn poll_status(&mut self) -> Option<AcceptorEvent> {
        self.pump();
        self.status.pop_front()
    }

    fn flush(&mut self) {
        while let Ok(message) = self.outbound_rx.try_recv() {
            if self.state == CreatorState::Lost {
                continue;
            }
            if let ProxyMessage::DisconnectClient(client_id) = &message {
                self.clients.remove(client_id);
            }
            self.send_upstream(&message);
        }
    }

    fn shutdown(&mut self) {
        self.flush();
        self.clients.clear();
        self.accepted.clear();
        if self.state != CreatorState::Lost {
            self.state = CreatorState::Lost;
            self.link.shutdown();
        }
    }
}

// ---------------------------------------------------------------------------
// Per-member link
// ---------------------------------------------------------------------------

/// Host-side link to one relayed client.
///
/// Sends are queued on the creator and go out on its next
/// [`Acceptor::flush`].
#[derive(Debug)]
pub struct ProxyClientConnection {
    id: ConnectionId,
    client_id: ProxyClientId,
    outbound: UnboundedSender<ProxyMessage>,
    inbound: UnboundedReceiver<LinkEvent>,
    open: bool,
    finished: bool,
}

impl ProxyClientConnection {
    pub fn client_id(&self) -> ProxyClientId {
        self.client_id
    }
}

impl ClientConnection for ProxyClientConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::ConnectionClosed("link shut down".into()));
        }
        self.outbound
            .send(ProxyMessage::Data {
                client_id: self.client_id,
                bytes: data.to_vec(),
            })
            .map_err(|_| TransportError::ConnectionClosed("relay session gone".into()))
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        if self.finished {
            return None;
        }
        match self.inbound.try_recv() {
            Ok(event) => {
                if event.is_terminal() {
                    self.finished = true;
                    self.open = false;
                }
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                self.open = false;
                Some(LinkEvent::ConnectionLost("relay session gone".into()))
            }
        }
    }

    fn shutdown(&mut self) {
        if self.open {
            self.open = false;
            let _ = self.outbound.send(ProxyMessage::DisconnectClient(self.client_id));
        }
        self.finished = true;
    }
}
