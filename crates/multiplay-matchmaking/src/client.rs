//! Matchmaking client used by hosts (to advertise) and players (to browse).

use std::collections::VecDeque;

use multiplay_protocol::HostEntry;
use multiplay_transport::{HostConnection, LinkEvent};
use tracing::{debug, info, warn};

use crate::{ErrorCode, HostId, MatchmakingError, MatchmakingMessage};

/// Something the matchmaking server told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchmakingEvent {
    Connected,
    Registered(HostId),
    HostList(Vec<(HostId, HostEntry)>),
    ServerError { code: ErrorCode, text: String },
    Disconnected(String),
}

/// Polled client for one matchmaking server.
///
/// Requests made before the link is up are queued and sent on connect.
pub struct MatchmakingClient {
    link: Box<dyn HostConnection>,
    connected: bool,
    pending: VecDeque<MatchmakingMessage>,
    host_id: Option<HostId>,
    /// Register requests sent but not yet answered.
    registering: bool,
}

impl MatchmakingClient {
    pub fn new(mut link: Box<dyn HostConnection>) -> Result<Self, MatchmakingError> {
        link.connect()?;
        Ok(Self {
            link,
            connected: false,
            pending: VecDeque::new(),
            host_id: None,
            registering: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Id of our registered host entry, if any.
    pub fn host_id(&self) -> Option<HostId> {
        self.host_id
    }

    /// Advertises `entry`. A host that is already registered updates its
    /// entry instead.
    pub fn register(&mut self, entry: HostEntry) -> Result<(), MatchmakingError> {
        match self.host_id {
            Some(id) => self.send(MatchmakingMessage::Update { id, entry }),
            None => {
                self.registering = true;
                self.send(MatchmakingMessage::Register(entry))
            }
        }
    }

    pub fn update(&mut self, entry: HostEntry) -> Result<(), MatchmakingError> {
        let id = self.host_id.ok_or(MatchmakingError::NotRegistered)?;
        self.send(MatchmakingMessage::Update { id, entry })
    }

    pub fn unregister(&mut self) -> Result<(), MatchmakingError> {
        let id = self.host_id.take().ok_or(MatchmakingError::NotRegistered)?;
        info!(%id, "unregistering host");
        self.send(MatchmakingMessage::Unregister(id))
    }

    /// Asks for the host list; the answer arrives as
    /// [`MatchmakingEvent::HostList`].
    pub fn request_host_list(&mut self) -> Result<(), MatchmakingError> {
        self.send(MatchmakingMessage::ListHosts)
    }

    fn send(&mut self, message: MatchmakingMessage) -> Result<(), MatchmakingError> {
        if !self.connected {
            debug!(tag = message.tag(), "queueing matchmaking request");
            self.pending.push_back(message);
            return Ok(());
        }
        self.link.send_data(&message.encode())?;
        Ok(())
    }

    /// Returns the next event, if any. Never blocks.
    pub fn poll(&mut self) -> Option<MatchmakingEvent> {
        while let Some(event) = self.link.poll_event() {
            match event {
                LinkEvent::Connected => {
                    self.connected = true;
                    while let Some(message) = self.pending.pop_front() {
                        if let Err(e) = self.link.send_data(&message.encode()) {
                            warn!(error = %e, "matchmaking send failed");
                        }
                    }
                    return Some(MatchmakingEvent::Connected);
                }
                LinkEvent::Data(bytes) => match MatchmakingMessage::decode(&bytes) {
                    Ok(MatchmakingMessage::Registered(id)) => {
                        info!(%id, "host registered with matchmaking");
                        self.registering = false;
                        self.host_id = Some(id);
                        return Some(MatchmakingEvent::Registered(id));
                    }
                    Ok(MatchmakingMessage::HostList(hosts)) => {
                        return Some(MatchmakingEvent::HostList(hosts));
                    }
                    Ok(MatchmakingMessage::Error { code, text }) => {
                        warn!(?code, %text, "matchmaking request refused");
                        if code == ErrorCode::UnknownHost && !self.registering {
                            self.host_id = None;
                        }
                        return Some(MatchmakingEvent::ServerError { code, text });
                    }
                    Ok(other) => warn!(tag = other.tag(), "unexpected matchmaking message"),
                    Err(e) => warn!(error = %e, "dropping malformed matchmaking frame"),
                },
                LinkEvent::Closed => {
                    return Some(self.disconnected("server closed the link".into()));
                }
                LinkEvent::ConnectFailed(reason) | LinkEvent::ConnectionLost(reason) => {
                    return Some(self.disconnected(reason));
                }
            }
        }
        None
    }

    fn disconnected(&mut self, reason: String) -> MatchmakingEvent {
        self.connected = false;
        self.host_id = None;
        self.registering = false;
        self.pending.clear();
        MatchmakingEvent::Disconnected(reason)
    }

    pub fn shutdown(&mut self) {
        self.link.shutdown();
        self.connected = false;
    }
}
