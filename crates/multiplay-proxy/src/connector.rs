//! Client side of a relay session.

use multiplay_transport::{HostConnection, LinkEvent, TransportError};
use tracing::{debug, info, warn};

use crate::{ProxyClientId, ProxyMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinState {
    Idle,
    Connecting,
    Joining,
    Joined(ProxyClientId),
    Finished,
}

/// [`HostConnection`] that reaches the host through a relay session.
///
/// Wraps the link to the relay. [`LinkEvent::Connected`] is reported only
/// once the relay accepted the join, so the client sees the same event
/// sequence as on a direct link.
pub struct ProxyHostConnection {
    link: Box<dyn HostConnection>,
    session_id: u32,
    state: JoinState,
}

impl ProxyHostConnection {
    pub fn new(link: Box<dyn HostConnection>, session_id: u32) -> Self {
        Self {
            link,
            session_id,
            state: JoinState::Idle,
        }
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Id the relay assigned to this member, once joined.
    pub fn client_id(&self) -> Option<ProxyClientId> {
        match self.state {
            JoinState::Joined(id) => Some(id),
            _ => None,
        }
    }

    fn finish(&mut self) {
        self.state = JoinState::Finished;
        self.link.shutdown();
    }

    /// Maps a terminal event of the relay link onto this link.
    fn terminal(&mut self, reason: String) -> LinkEvent {
        let joined = matches!(self.state, JoinState::Joined(_));
        self.state = JoinState::Finished;
        if joined {
            LinkEvent::ConnectionLost(reason)
        } else {
            LinkEvent::ConnectFailed(reason)
        }
    }
}

impl HostConnection for ProxyHostConnection {
    fn connect(&mut self) -> Result<(), TransportError> {
        if matches!(
            self.state,
            JoinState::Connecting | JoinState::Joining | JoinState::Joined(_)
        ) {
            return Err(TransportError::AlreadyStarted);
        }
        self.link.connect()?;
        self.state = JoinState::Connecting;
        debug!(session_id = self.session_id, "connecting to relay");
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let JoinState::Joined(client_id) = self.state else {
            return Err(TransportError::ConnectionClosed("not joined".into()));
        };
        let message = ProxyMessage::Data {
            client_id,
            bytes: data.to_vec(),
        };
        self.link.send_data(&message.encode())
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        if matches!(self.state, JoinState::Idle | JoinState::Finished) {
            return None;
        }
        while let Some(event) = self.link.poll_event() {
            match event {
                LinkEvent::Connected => {
                    self.state = JoinState::Joining;
                    let request = ProxyMessage::ConnectToSession {
                        session_id: self.session_id,
                    };
                    if let Err(e) = self.link.send_data(&request.encode()) {
                        return Some(self.terminal(e.to_string()));
                    }
                }
                LinkEvent::Data(bytes) => {
                    let message = match ProxyMessage::decode(&bytes) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!(error = %e, "dropping malformed relay frame");
                            continue;
                        }
                    };
                    match message {
                        ProxyMessage::ConnectResult {
                            accepted: true,
                            client_id,
                        } => {
                            info!(session_id = self.session_id, %client_id, "joined relay session");
                            self.state = JoinState::Joined(client_id);
                            return Some(LinkEvent::Connected);
                        }
                        ProxyMessage::ConnectResult {
                            accepted: false, ..
                        } => {
                            self.finish();
                            return Some(LinkEvent::ConnectFailed(format!(
                                "relay has no session {}",
                                self.session_id
                            )));
                        }
                        ProxyMessage::Data { bytes, .. } => return Some(LinkEvent::Data(bytes)),
                        ProxyMessage::SessionClosed => {
                            self.finish();
                            return Some(LinkEvent::Closed);
                        }
                        ProxyMessage::KeepAlive => {}
                        other => warn!(tag = other.tag(), "unexpected relay message for a client"),
                    }
                }
                LinkEvent::Closed => return Some(self.terminal("relay closed the link".into())),
                LinkEvent::ConnectFailed(reason) | LinkEvent::ConnectionLost(reason) => {
                    return Some(self.terminal(reason));
                }
            }
        }
        None
    }

    fn shutdown(&mut self) {
        if self.state != JoinState::Finished {
            self.finish();
        }
    }

    fn reconnectable(&self) -> bool {
        true
    }
}
