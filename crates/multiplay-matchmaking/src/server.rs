//! In-memory matchmaking server.

use std::collections::BTreeMap;
use std::time::Duration;

use multiplay_protocol::HostEntry;
use multiplay_transport::{Acceptor, ClientConnection, ConnectionId, LinkEvent};
use tracing::{debug, info, warn};

use crate::{ErrorCode, HostId, MatchmakingMessage};

struct Registration {
    owner: ConnectionId,
    entry: HostEntry,
}

/// Keeps the list of advertised hosts. Entries live as long as the
/// connection that registered them.
pub struct MatchmakingServer {
    acceptor: Box<dyn Acceptor>,
    links: BTreeMap<ConnectionId, Box<dyn ClientConnection>>,
    hosts: BTreeMap<HostId, Registration>,
    next_id: u32,
}

impl MatchmakingServer {
    pub fn new(acceptor: Box<dyn Acceptor>) -> Self {
        Self {
            acceptor,
            links: BTreeMap::new(),
            hosts: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Every registered host, ordered by id.
    pub fn hosts(&self) -> Vec<(HostId, HostEntry)> {
        self.hosts
            .iter()
            .map(|(id, registration)| (*id, registration.entry.clone()))
            .collect()
    }

    pub fn update(&mut self) {
        while let Some(conn) = self.acceptor.poll_accept() {
            debug!(id = %conn.id(), "matchmaking link accepted");
            self.links.insert(conn.id(), conn);
        }

        let mut events = Vec::new();
        for (id, conn) in &mut self.links {
            while let Some(event) = conn.poll_event() {
                let terminal = event.is_terminal();
                events.push((*id, event));
                if terminal {
                    break;
                }
            }
        }

        for (id, event) in events {
            match event {
                LinkEvent::Data(bytes) => match MatchmakingMessage::decode(&bytes) {
                    Ok(message) => self.handle(id, message),
                    Err(e) => {
                        warn!(%id, error = %e, "dropping malformed matchmaking frame");
                        self.reply_error(id, ErrorCode::Malformed, e.to_string());
                    }
                },
                LinkEvent::Connected => {}
                LinkEvent::Closed | LinkEvent::ConnectFailed(_) | LinkEvent::ConnectionLost(_) => {
                    self.drop_link(id);
                }
            }
        }
    }

    pub async fn run(mut self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.update();
        }
    }

    pub fn shutdown(&mut self) {
        for conn in self.links.values_mut() {
            conn.shutdown();
        }
        self.links.clear();
        self.hosts.clear();
        self.acceptor.shutdown();
    }

    fn handle(&mut self, from: ConnectionId, message: MatchmakingMessage) {
        match message {
            MatchmakingMessage::Register(entry) => {
                let id = HostId(self.next_id);
                self.next_id = self.next_id.wrapping_add(1).max(1);
                info!(%id, name = %entry.session_name, "host registered");
                self.hosts.insert(id, Registration { owner: from, entry });
                self.reply(from, &MatchmakingMessage::Registered(id));
            }
            MatchmakingMessage::Update { id, entry } => match self.hosts.get_mut(&id) {
                Some(registration) if registration.owner == from => {
                    debug!(%id, players = entry.player_count, "host entry updated");
                    registration.entry = entry;
                }
                Some(_) => self.reply_error(from, ErrorCode::NotOwner, format!("{id} is not yours")),
                None => self.reply_error(from, ErrorCode::UnknownHost, format!("{id} not found")),
            },
            MatchmakingMessage::Unregister(id) => match self.hosts.get(&id) {
                Some(registration) if registration.owner == from => {
                    info!(%id, "host unregistered");
                    self.hosts.remove(&id);
                }
                Some(_) => self.reply_error(from, ErrorCode::NotOwner, format!("{id} is not yours")),
                None => self.reply_error(from, ErrorCode::UnknownHost, format!("{id} not found")),
            },
            MatchmakingMessage::ListHosts => {
                let list = MatchmakingMessage::HostList(self.hosts());
                self.reply(from, &list);
            }
            other => {
                warn!(%from, tag = other.tag(), "unexpected matchmaking request");
                self.reply_error(from, ErrorCode::Malformed, "unexpected request".into());
            }
        }
    }

    fn drop_link(&mut self, id: ConnectionId) {
        self.links.remove(&id);
        let before = self.hosts.len();
        self.hosts.retain(|_, registration| registration.owner != id);
        let removed = before - self.hosts.len();
        if removed > 0 {
            info!(%id, removed, "dropped hosts of closed link");
        }
    }

    fn reply(&mut self, to: ConnectionId, message: &MatchmakingMessage) {
        let Some(conn) = self.links.get_mut(&to) else {
            return;
        };
        if let Err(e) = conn.send_data(&message.encode()) {
            warn!(%to, error = %e, "matchmaking reply failed");
        }
    }

    fn reply_error(&mut self, to: ConnectionId, code: ErrorCode, text: String) {
        self.reply(to, &MatchmakingMessage::Error { code, text });
    }
}
