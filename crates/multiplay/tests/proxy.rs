//! Relayed sessions: a host and its clients meet on a relay server, all
//! over loopback links.

mod common;

use common::Rig;
use multiplay::prelude::*;

fn relayed_rig() -> Rig {
    let relay_listener = LoopbackListener::new();
    let relay_connector = relay_listener.connector();
    let relay = RelayServer::new(Box::new(relay_listener));

    let config = HostConfig {
        proxy_relay: Some(RelayAddress {
            host: "relay.example".into(),
            port: 7000,
        }),
        ..Default::default()
    };
    let acceptor = ListenTarget::Proxy {
        relay: ConnectTarget::Loopback(relay_connector.clone()),
    }
    .open_local()
    .unwrap();
    let mut rig = Rig::with_acceptor(config, acceptor, relay_connector);
    rig.relay = Some(relay);
    rig.settle(4);
    rig
}

fn join_relayed(rig: &mut Rig, name: &str) -> usize {
    let session_id = rig.host.proxy_session_id().unwrap();
    let target = ConnectTarget::proxy(ConnectTarget::Loopback(rig.connector.clone()), session_id);
    let peer = rig.join_target(Rig::client_config(name), target);
    rig.settle(4);
    peer
}

// =========================================================================
// Session creation
// =========================================================================

#[test]
fn test_host_reports_relay_session() {
    let mut rig = relayed_rig();
    let session_id = rig.host.proxy_session_id().unwrap();

    assert!(rig.host_events().contains(&SessionEvent::ProxySessionCreated { session_id }));
    let entry = rig.host.host_entry("10.0.0.5", 7777);
    let proxy = entry.proxy.unwrap();
    assert_eq!(proxy.session_id, session_id);
    assert_eq!(proxy.host, "relay.example");
    assert_eq!(proxy.port, 7000);
    assert_eq!(entry.player_count, 0);
}

// =========================================================================
// Relayed play
// =========================================================================

#[test]
fn test_relayed_clients_join_and_play() {
    let mut rig = relayed_rig();
    let a = join_relayed(&mut rig, "ada");
    let b = join_relayed(&mut rig, "bo");
    assert_eq!(rig.client(a).local_player(), Some(PlayerIndex(0)));
    assert_eq!(rig.client(b).local_player(), Some(PlayerIndex(1)));

    rig.start_game();
    let outbox = rig.host.outbox_mut();
    rig.sim.spawn(
        outbox,
        EntityId(1),
        None,
        Vec3 {
            x: 2.0,
            y: 0.0,
            z: 0.0,
        },
    );
    rig.settle(8);

    for peer in [a, b] {
        assert!(rig.peers[peer].sim.world.contains(EntityId(1)));
        assert_eq!(rig.client(peer).state(), SessionState::InGame);
    }
    assert_eq!(rig.host.host_entry("10.0.0.5", 7777).player_count, 2);
}

#[test]
fn test_relayed_leave_and_crash_keep_their_reasons() {
    let mut rig = relayed_rig();
    let a = join_relayed(&mut rig, "ada");
    join_relayed(&mut rig, "bo");
    rig.host_events();

    let crashed = rig.peers.remove(1);
    drop(crashed);
    rig.settle(3);
    rig.client_mut(a).leave();
    rig.settle(3);

    let left: Vec<(PlayerIndex, LeaveReason)> = rig
        .host_events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::PlayerLeft { index, reason } => Some((index, reason)),
            _ => None,
        })
        .collect();
    assert_eq!(
        left,
        vec![
            (PlayerIndex(1), LeaveReason::Disconnected),
            (PlayerIndex(0), LeaveReason::Left),
        ]
    );
}

#[test]
fn test_relay_loss_drops_every_player() {
    let mut rig = relayed_rig();
    let a = join_relayed(&mut rig, "ada");
    rig.host_events();

    if let Some(relay) = rig.relay.as_mut() {
        relay.shutdown();
    }
    rig.settle(2);

    assert_eq!(rig.host.player_count(), 0);
    assert_eq!(rig.host.proxy_session_id(), None);
    assert!(rig
        .host_events()
        .iter()
        .any(|e| matches!(e, SessionEvent::LostConnectionToProxy(_))));
    assert_eq!(rig.client(a).state(), SessionState::None);
    assert!(rig.peers[a]
        .drain_events()
        .iter()
        .any(|e| matches!(e, SessionEvent::ConnectionLost(_))));
}

#[test]
fn test_single_reconnect_after_relay_loss() {
    let mut rig = relayed_rig();
    let a = join_relayed(&mut rig, "ada");

    if let Some(relay) = rig.relay.as_mut() {
        relay.shutdown();
    }
    // Well past the reconnect delay; the relay stays down.
    rig.settle(60);

    let events = rig.peers[a].drain_events();
    let failures = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::ConnectFailed(_)))
        .count();
    assert_eq!(failures, 1);
    assert_eq!(rig.client(a).state(), SessionState::None);
}

/// Cuts the relay link of the `nth` member to join.
fn evict(rig: &mut Rig, nth: usize) {
    let session_id = rig.host.proxy_session_id().unwrap();
    let relay = rig.relay.as_mut().unwrap();
    let members = relay.member_ids(session_id);
    assert!(relay.evict_member(session_id, members[nth]));
}

#[test]
fn test_lobby_reconnect_rejoins_session() {
    let mut rig = relayed_rig();
    join_relayed(&mut rig, "ada");
    let b = join_relayed(&mut rig, "bo");
    rig.peers[b].drain_events();
    rig.host_events();

    evict(&mut rig, 1);
    rig.settle(2);
    assert_eq!(rig.client(b).state(), SessionState::None);
    assert_eq!(rig.host.player_count(), 1);
    assert!(rig.host_events().contains(&SessionEvent::PlayerLeft {
        index: PlayerIndex(1),
        reason: LeaveReason::Disconnected,
    }));

    // Past the reconnect delay; the relay is still up.
    rig.settle(60);

    assert_eq!(rig.client(b).state(), SessionState::Lobby);
    assert_eq!(rig.client(b).local_player(), Some(PlayerIndex(1)));
    assert_eq!(rig.host.player_count(), 2);
    let events = rig.peers[b].drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::ConnectionLost(_))));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::JoinResponse(JoinResponse::Success))));
}

#[test]
fn test_in_game_loss_does_not_reconnect() {
    let mut rig = relayed_rig();
    join_relayed(&mut rig, "ada");
    let b = join_relayed(&mut rig, "bo");
    rig.start_game();
    rig.peers[b].drain_events();

    evict(&mut rig, 1);
    rig.settle(60);

    assert_eq!(rig.client(b).state(), SessionState::None);
    assert_eq!(rig.host.player_count(), 1);
    assert_eq!(rig.host.state(), SessionState::InGame);
    let events = rig.peers[b].drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::ConnectionLost(_))));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::JoinResponse(_) | SessionEvent::ConnectFailed(_))));
}
