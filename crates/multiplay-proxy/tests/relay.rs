//! Relay end-to-end tests over loopback links.
//!
//! One relay, one hosting creator, and relayed clients, all polled by
//! hand so every step is deterministic.

use multiplay_proxy::{ProxyHostConnection, ProxySessionCreator, RelayServer};
use multiplay_transport::{
    Acceptor, AcceptorEvent, ClientConnection, HostConnection, LinkEvent, LoopbackConnector,
    LoopbackListener,
};

// =========================================================================
// Helpers
// =========================================================================

struct Rig {
    relay: RelayServer,
    connector: LoopbackConnector,
    creator: ProxySessionCreator,
    status: Vec<AcceptorEvent>,
}

impl Rig {
    fn new() -> Self {
        let listener = LoopbackListener::new();
        let connector = listener.connector();
        let relay = RelayServer::new(Box::new(listener));
        let creator = ProxySessionCreator::new(Box::new(connector.connection())).unwrap();
        Self {
            relay,
            connector,
            creator,
            status: Vec::new(),
        }
    }

    /// Runs a few rounds of relay and creator polling.
    fn settle(&mut self) {
        for _ in 0..4 {
            self.creator.flush();
            self.relay.update();
            while let Some(event) = self.creator.poll_status() {
                self.status.push(event);
            }
        }
    }

    fn session_id(&mut self) -> u32 {
        self.settle();
        self.creator.session_id().expect("session created")
    }

    fn join(&mut self, session_id: u32) -> ProxyHostConnection {
        let mut client =
            ProxyHostConnection::new(Box::new(self.connector.connection()), session_id);
        client.connect().unwrap();
        // Connected on the relay link triggers the join request.
        assert_eq!(client.poll_event(), None);
        self.settle();
        client
    }
}

fn drain(conn: &mut dyn ClientConnection) -> Vec<LinkEvent> {
    std::iter::from_fn(|| conn.poll_event()).collect()
}

// =========================================================================
// Session creation
// =========================================================================

#[test]
fn test_creator_reports_ready_with_session_id() {
    let mut rig = Rig::new();
    let session_id = rig.session_id();

    assert_ne!(session_id, 0);
    assert_eq!(
        rig.status,
        vec![AcceptorEvent::Ready {
            session_id: Some(session_id)
        }]
    );
    assert_eq!(rig.relay.session_ids(), vec![session_id]);
    assert_eq!(rig.relay.member_count(session_id), Some(0));
}

#[test]
fn test_join_unknown_session_fails() {
    let mut rig = Rig::new();
    let session_id = rig.session_id();
    let mut client = rig.join(session_id.wrapping_add(1).max(1));

    assert!(matches!(
        client.poll_event(),
        Some(LinkEvent::ConnectFailed(_))
    ));
    assert!(client.reconnectable());
}

// =========================================================================
// Routing
// =========================================================================

#[test]
fn test_two_clients_get_only_their_own_frames() {
    let mut rig = Rig::new();
    let session_id = rig.session_id();
    let mut alice = rig.join(session_id);
    let mut bob = rig.join(session_id);
    assert_eq!(alice.poll_event(), Some(LinkEvent::Connected));
    assert_eq!(bob.poll_event(), Some(LinkEvent::Connected));
    assert_ne!(alice.client_id(), bob.client_id());

    let mut host_alice = rig.creator.poll_accept().expect("first member");
    let mut host_bob = rig.creator.poll_accept().expect("second member");
    assert!(rig.creator.poll_accept().is_none());
    assert_eq!(rig.relay.member_count(session_id), Some(2));

    alice.send_data(b"from-alice").unwrap();
    bob.send_data(b"from-bob").unwrap();
    rig.settle();
    assert_eq!(
        drain(host_alice.as_mut()),
        vec![LinkEvent::Data(b"from-alice".to_vec())]
    );
    assert_eq!(
        drain(host_bob.as_mut()),
        vec![LinkEvent::Data(b"from-bob".to_vec())]
    );

    host_alice.send_data(b"to-alice").unwrap();
    host_bob.send_data(b"to-bob").unwrap();
    rig.settle();
    assert_eq!(alice.poll_event(), Some(LinkEvent::Data(b"to-alice".to_vec())));
    assert_eq!(alice.poll_event(), None);
    assert_eq!(bob.poll_event(), Some(LinkEvent::Data(b"to-bob".to_vec())));
    assert_eq!(bob.poll_event(), None);
}

#[test]
fn test_sends_wait_for_flush() {
    let mut rig = Rig::new();
    let session_id = rig.session_id();
    let mut client = rig.join(session_id);
    assert_eq!(client.poll_event(), Some(LinkEvent::Connected));
    let mut member = rig.creator.poll_accept().unwrap();

    member.send_data(b"queued").unwrap();
    rig.relay.update();
    assert_eq!(client.poll_event(), None);

    rig.creator.flush();
    rig.relay.update();
    assert_eq!(client.poll_event(), Some(LinkEvent::Data(b"queued".to_vec())));
}

// =========================================================================
// Disconnects
// =========================================================================

#[test]
fn test_client_leaving_closes_host_side_link() {
    let mut rig = Rig::new();
    let session_id = rig.session_id();
    let mut client = rig.join(session_id);
    client.poll_event();
    let mut member = rig.creator.poll_accept().unwrap();

    client.shutdown();
    rig.settle();

    assert_eq!(drain(member.as_mut()), vec![LinkEvent::Closed]);
    assert_eq!(rig.relay.member_count(session_id), Some(0));
}

#[test]
fn test_client_crash_is_lost_on_host_side_link() {
    let mut rig = Rig::new();
    let session_id = rig.session_id();
    let mut client = rig.join(session_id);
    client.poll_event();
    let mut member = rig.creator.poll_accept().unwrap();

    // No shutdown: the relay sees the member's link break.
    drop(client);
    rig.settle();

    assert!(matches!(
        drain(member.as_mut()).as_slice(),
        [LinkEvent::ConnectionLost(_)]
    ));
    assert_eq!(rig.relay.member_count(session_id), Some(0));
}

#[test]
fn test_evicted_member_is_lost_on_both_ends() {
    let mut rig = Rig::new();
    let session_id = rig.session_id();
    let mut client = rig.join(session_id);
    client.poll_event();
    let mut member = rig.creator.poll_accept().unwrap();
    let client_id = client.client_id().unwrap();
    assert_eq!(rig.relay.member_ids(session_id), vec![client_id]);

    assert!(rig.relay.evict_member(session_id, client_id));
    assert!(!rig.relay.evict_member(session_id, client_id));
    rig.settle();

    assert!(matches!(
        drain(member.as_mut()).as_slice(),
        [LinkEvent::ConnectionLost(_)]
    ));
    assert!(matches!(client.poll_event(), Some(LinkEvent::ConnectionLost(_))));
    assert!(client.reconnectable());
    assert!(rig.relay.member_ids(session_id).is_empty());
}

#[test]
fn test_host_kicking_member_closes_client() {
    let mut rig = Rig::new();
    let session_id = rig.session_id();
    let mut client = rig.join(session_id);
    client.poll_event();
    let mut member = rig.creator.poll_accept().unwrap();

    member.shutdown();
    rig.settle();

    assert_eq!(client.poll_event(), Some(LinkEvent::Closed));
    assert_eq!(rig.relay.member_count(session_id), Some(0));
    assert!(member.send_data(b"late").is_err());
}

#[test]
fn test_creator_leaving_closes_session_for_members() {
    let mut rig = Rig::new();
    let session_id = rig.session_id();
    let mut client = rig.join(session_id);
    client.poll_event();

    rig.creator.shutdown();
    rig.relay.update();

    assert_eq!(client.poll_event(), Some(LinkEvent::Closed));
    assert_eq!(rig.relay.session_count(), 0);
}

#[test]
fn test_relay_loss_is_reported_to_host_and_members() {
    let mut rig = Rig::new();
    let session_id = rig.session_id();
    let mut client = rig.join(session_id);
    client.poll_event();
    let mut member = rig.creator.poll_accept().unwrap();

    rig.relay.shutdown();
    rig.status.clear();
    while let Some(event) = rig.creator.poll_status() {
        rig.status.push(event);
    }

    assert!(matches!(rig.status.as_slice(), [AcceptorEvent::Lost(_)]));
    assert!(rig.creator.is_lost());
    assert!(matches!(
        drain(member.as_mut()).as_slice(),
        [LinkEvent::ConnectionLost(_)]
    ));
    assert!(matches!(
        client.poll_event(),
        Some(LinkEvent::ConnectionLost(_)) | Some(LinkEvent::Closed)
    ));
}
