//! Relay server.
//!
//! Hosts open sessions, clients join them by numeric id, and the relay
//! forwards opaque game frames between each member and the session's
//! host. Frames are routed strictly by `(session, client id)`, so two
//! members of the same session never see each other's traffic.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use multiplay_transport::{Acceptor, ClientConnection, ConnectionId, LinkEvent};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::{ProxyClientId, ProxyError, ProxyMessage};

/// What a relay link turned out to be after its first message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Unassigned,
    Creator(u32),
    Member {
        session_id: u32,
        client_id: ProxyClientId,
    },
}

struct RelayLink {
    conn: Box<dyn ClientConnection>,
    role: Role,
}

#[derive(Debug)]
struct RelaySession {
    creator: ConnectionId,
    members: BTreeMap<ProxyClientId, ConnectionId>,
    next_client: u16,
}

impl RelaySession {
    /// Next free client id, starting at 1 and wrapping past `u16::MAX`.
    fn allocate_client(&mut self, session_id: u32) -> Result<ProxyClientId, ProxyError> {
        for _ in 0..u16::MAX {
            let candidate = ProxyClientId(self.next_client);
            self.next_client = self.next_client.checked_add(1).unwrap_or(1);
            if !self.members.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(ProxyError::SessionFull(session_id))
    }
}

/// Relay that multiplexes many sessions over links from one [`Acceptor`].
pub struct RelayServer {
    acceptor: Box<dyn Acceptor>,
    links: BTreeMap<ConnectionId, RelayLink>,
    sessions: HashMap<u32, RelaySession>,
}

impl RelayServer {
    pub fn new(acceptor: Box<dyn Acceptor>) -> Self {
        Self {
            acceptor,
            links: BTreeMap::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Ids of all open sessions, sorted.
    pub fn session_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of members in `session_id`, or `None` if no such session.
    pub fn member_count(&self, session_id: u32) -> Option<usize> {
        self.sessions.get(&session_id).map(|s| s.members.len())
    }

    /// Client ids of the members of `session_id`, sorted.
    pub fn member_ids(&self, session_id: u32) -> Vec<ProxyClientId> {
        self.sessions
            .get(&session_id)
            .map(|s| s.members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Accepts new links and routes everything that arrived since the
    /// last call.
    pub fn update(&mut self) {
        while let Some(conn) = self.acceptor.poll_accept() {
            debug!(id = %conn.id(), "relay link accepted");
            self.links.insert(
                conn.id(),
                RelayLink {
                    conn,
                    role: Role::Unassigned,
                },
            );
        }

        let mut events = Vec::new();
        for (id, link) in &mut self.links {
            while let Some(event) = link.conn.poll_event() {
                let terminal = event.is_terminal();
                events.push((*id, event));
                if terminal {
                    break;
                }
            }
        }

        for (id, event) in events {
            match event {
                LinkEvent::Data(bytes) => match ProxyMessage::decode(&bytes) {
                    Ok(message) => self.handle_message(id, message),
                    Err(e) => warn!(%id, error = %e, "dropping malformed relay frame"),
                },
                LinkEvent::Connected => {}
                LinkEvent::Closed => self.drop_link(id, false),
                LinkEvent::ConnectFailed(_) | LinkEvent::ConnectionLost(_) => {
                    self.drop_link(id, true);
                }
            }
        }
    }

    /// Calls [`RelayServer::update`] every `period` until the task is
    /// cancelled.
    pub async fn run(mut self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(period_ms = period.as_millis() as u64, "relay running");
        loop {
            interval.tick().await;
            self.update();
        }
    }

    /// Cuts one member's link as if it had broken. The session's host is
    /// told the member was lost. Returns whether the member existed.
    pub fn evict_member(&mut self, session_id: u32, client_id: ProxyClientId) -> bool {
        let target = self
            .sessions
            .get(&session_id)
            .and_then(|s| s.members.get(&client_id).copied());
        let Some(target) = target else {
            return false;
        };
        info!(session_id, %client_id, "evicting relay member");
        if let Some(link) = self.links.get_mut(&target) {
            link.conn.shutdown();
        }
        self.drop_link(target, true);
        true
    }

    pub fn shutdown(&mut self) {
        for link in self.links.values_mut() {
            link.conn.shutdown();
        }
        self.links.clear();
        self.sessions.clear();
        self.acceptor.shutdown();
        info!("relay shut down");
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    fn handle_message(&mut self, id: ConnectionId, message: ProxyMessage) {
        let Some(role) = self.links.get(&id).map(|link| link.role) else {
            return;
        };
        match (role, message) {
            (Role::Unassigned, ProxyMessage::CreateSession) => self.create_session(id),
            (Role::Unassigned, ProxyMessage::ConnectToSession { session_id }) => {
                self.join_session(id, session_id)
            }
            (Role::Creator(session_id), ProxyMessage::Data { client_id, bytes }) => {
                let target = self
                    .sessions
                    .get(&session_id)
                    .and_then(|s| s.members.get(&client_id).copied());
                match target {
                    Some(target) => self.send_to(
                        target,
                        &ProxyMessage::Data {
                            client_id,
                            bytes,
                        },
                    ),
                    None => debug!(session_id, %client_id, "data for unknown member"),
                }
            }
            (Role::Creator(session_id), ProxyMessage::DisconnectClient(client_id)) => {
                let target = self
                    .sessions
                    .get_mut(&session_id)
                    .and_then(|s| s.members.remove(&client_id));
                if let Some(target) = target {
                    info!(session_id, %client_id, "host dropped relay member");
                    self.send_to(target, &ProxyMessage::SessionClosed);
                    if let Some(mut link) = self.links.remove(&target) {
                        link.conn.shutdown();
                    }
                }
            }
            (
                Role::Member {
                    session_id,
                    client_id,
                },
                ProxyMessage::Data { bytes, .. },
            ) => {
                let Some(creator) = self.sessions.get(&session_id).map(|s| s.creator) else {
                    return;
                };
                self.send_to(creator, &ProxyMessage::Data { client_id, bytes });
            }
            (_, ProxyMessage::KeepAlive) => self.send_to(id, &ProxyMessage::KeepAlive),
            (role, other) => {
                warn!(%id, ?role, tag = other.tag(), "unexpected relay message");
            }
        }
    }

    fn create_session(&mut self, id: ConnectionId) {
        let mut rng = rand::rng();
        let session_id = loop {
            let candidate: u32 = rng.random_range(1..=u32::MAX);
            if !self.sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        self.sessions.insert(
            session_id,
            RelaySession {
                creator: id,
                members: BTreeMap::new(),
                next_client: 1,
            },
        );
        if let Some(link) = self.links.get_mut(&id) {
            link.role = Role::Creator(session_id);
        }
        info!(session_id, %id, "relay session opened");
        self.send_to(id, &ProxyMessage::SessionCreated { session_id });
    }

    fn join_session(&mut self, id: ConnectionId, session_id: u32) {
        let allocated = match self.sessions.get_mut(&session_id) {
            Some(session) => session.allocate_client(session_id),
            None => Err(ProxyError::UnknownSession(session_id)),
        };
        let (client_id, creator) = match allocated {
            Ok(client_id) => {
                let Some(session) = self.sessions.get_mut(&session_id) else {
                    return;
                };
                session.members.insert(client_id, id);
                (client_id, session.creator)
            }
            Err(e) => {
                info!(%id, session_id, error = %e, "relay join refused");
                self.send_to(
                    id,
                    &ProxyMessage::ConnectResult {
                        accepted: false,
                        client_id: ProxyClientId::default(),
                    },
                );
                return;
            }
        };

        if let Some(link) = self.links.get_mut(&id) {
            link.role = Role::Member {
                session_id,
                client_id,
            };
        }
        debug!(session_id, %client_id, %id, "relay member joined");
        self.send_to(
            id,
            &ProxyMessage::ConnectResult {
                accepted: true,
                client_id,
            },
        );
        self.send_to(creator, &ProxyMessage::ClientConnected(client_id));
    }

    /// Forgets a link. `lost` tells a session's host whether a member
    /// crashed or left cleanly.
    fn drop_link(&mut self, id: ConnectionId, lost: bool) {
        let Some(link) = self.links.remove(&id) else {
            return;
        };
        match link.role {
            Role::Unassigned => {}
            Role::Creator(session_id) => {
                let Some(session) = self.sessions.remove(&session_id) else {
                    return;
                };
                info!(session_id, members = session.members.len(), "relay session closed");
                for member in session.members.into_values() {
                    self.send_to(member, &ProxyMessage::SessionClosed);
                    if let Some(mut member_link) = self.links.remove(&member) {
                        member_link.conn.shutdown();
                    }
                }
            }
            Role::Member {
                session_id,
                client_id,
            } => {
                let creator = self.sessions.get_mut(&session_id).map(|session| {
                    session.members.remove(&client_id);
                    session.creator
                });
                if let Some(creator) = creator {
                    debug!(session_id, %client_id, lost, "relay member left");
                    self.send_to(
                        creator,
                        &ProxyMessage::ClientDisconnected { client_id, lost },
                    );
                }
            }
        }
    }

    fn send_to(&mut self, id: ConnectionId, message: &ProxyMessage) {
        let Some(link) = self.links.get_mut(&id) else {
            return;
        };
        if let Err(e) = link.conn.send_data(&message.encode()) {
            warn!(%id, error = %e, tag = message.tag(), "relay send failed");
        }
    }
}
