//! Lobby end-to-end tests: joining, validation, chat, readiness, kicking
//! and liveness, all over loopback links.

mod common;

use std::time::Duration;

use common::Rig;
use multiplay::prelude::*;

fn host_config() -> HostConfig {
    HostConfig {
        session: SessionSettings {
            name: "Harbor".into(),
            max_players: 4,
            map_asset_id: 77,
            ..Default::default()
        },
        ..Default::default()
    }
}

// =========================================================================
// Joining
// =========================================================================

#[test]
fn test_two_clients_join_with_consecutive_indices() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    let b = rig.join(Rig::client_config("bo"));

    assert_eq!(rig.client(a).local_player(), Some(PlayerIndex(0)));
    assert_eq!(rig.client(b).local_player(), Some(PlayerIndex(1)));
    assert_eq!(rig.client(a).state(), SessionState::Lobby);
    assert_eq!(rig.client(b).join_response(), Some(JoinResponse::Success));
    assert_eq!(rig.host.player_count(), 2);

    // The first client learned about the second one, and both see the
    // host's session name.
    assert_eq!(rig.client(a).session().roster().len(), 2);
    assert_eq!(rig.client(a).player(PlayerIndex(1)).unwrap().name, "bo");
    assert_eq!(rig.client(b).session().settings().name, "Harbor");

    let joined: Vec<_> = rig
        .host_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::PlayerJoined { .. }))
        .collect();
    assert_eq!(joined.len(), 2);
}

#[test]
fn test_join_with_wrong_password_is_rejected() {
    let mut config = host_config();
    config.session.password = "hunter2".into();
    let mut rig = Rig::new(config);

    let mut client_config = Rig::client_config("ada");
    client_config.password = "guess".into();
    let a = rig.join(client_config);

    assert_eq!(rig.client(a).join_response(), Some(JoinResponse::BadPassword));
    assert_eq!(rig.client(a).state(), SessionState::None);
    assert_eq!(rig.host.player_count(), 0);
}

#[test]
fn test_join_with_missing_checksum_is_rejected() {
    let mut config = host_config();
    config.required_checksums = vec![ContentChecksum::new("maps.pak", 0xBEEF)];
    let mut rig = Rig::new(config);

    let mut wrong = Rig::client_config("ada");
    wrong.content_checksums = vec![ContentChecksum::new("maps.pak", 0xDEAD)];
    let a = rig.join(wrong);
    assert_eq!(
        rig.client(a).join_response(),
        Some(JoinResponse::ContentAuthenticationFailed)
    );
    assert!(!rig.host.session().roster().contains(PlayerIndex(0)));

    let mut right = Rig::client_config("bo");
    right.content_checksums = vec![ContentChecksum::new("maps.pak", 0xBEEF)];
    let b = rig.join(right);
    assert_eq!(rig.client(b).join_response(), Some(JoinResponse::Success));
    assert_eq!(rig.client(b).local_player(), Some(PlayerIndex(0)));
}

#[test]
fn test_join_with_other_modifications_is_rejected() {
    let mut config = host_config();
    config.required_modifications = vec!["ladders".into()];
    let mut rig = Rig::new(config);

    let a = rig.join(Rig::client_config("ada"));
    assert_eq!(
        rig.client(a).join_response(),
        Some(JoinResponse::IncompatibleGameModifications)
    );
}

#[test]
fn test_join_into_full_session_is_rejected() {
    let mut config = host_config();
    config.session.max_players = 1;
    let mut rig = Rig::new(config);

    let a = rig.join(Rig::client_config("ada"));
    let b = rig.join(Rig::client_config("bo"));
    assert_eq!(rig.client(a).join_response(), Some(JoinResponse::Success));
    assert_eq!(rig.client(b).join_response(), Some(JoinResponse::SessionFull));
    assert_eq!(rig.host.player_count(), 1);
}

#[test]
fn test_join_after_game_start_is_rejected() {
    let mut rig = Rig::new(host_config());
    rig.join(Rig::client_config("ada"));
    rig.start_game();

    let late = rig.join(Rig::client_config("late"));
    assert_eq!(
        rig.client(late).join_response(),
        Some(JoinResponse::GameInProgress)
    );
}

#[test]
fn test_index_allocation_restarts_after_everyone_left() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    rig.client_mut(a).leave();
    rig.settle(2);
    assert_eq!(rig.host.player_count(), 0);

    let b = rig.join(Rig::client_config("bo"));
    assert_eq!(rig.client(b).local_player(), Some(PlayerIndex(0)));
}

// =========================================================================
// Lobby interaction
// =========================================================================

#[test]
fn test_chat_reaches_other_clients_with_sender() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    let b = rig.join(Rig::client_config("bo"));

    rig.client_mut(a).send_chat_message("ready when you are");
    rig.settle(2);

    let line = rig.client(b).session().chat().latest().cloned().unwrap();
    assert_eq!(line.sender, Some(PlayerIndex(0)));
    assert_eq!(line.text, "ready when you are");
    // The sender recorded it once, locally.
    assert_eq!(rig.client(a).session().chat().len(), 1);
    assert_eq!(rig.host.session().chat().len(), 1);
}

#[test]
fn test_ready_state_is_echoed_to_everyone() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    let b = rig.join(Rig::client_config("bo"));

    rig.client_mut(a).set_ready(true).unwrap();
    rig.settle(2);

    assert!(rig.host.session().roster().get(PlayerIndex(0)).unwrap().ready);
    assert!(rig.client(b).player(PlayerIndex(0)).unwrap().ready);
    assert!(!rig.host.all_players_ready());
}

#[test]
fn test_load_map_requires_everyone_ready() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    rig.join(Rig::client_config("bo"));
    rig.client_mut(a).set_ready(true).unwrap();
    rig.settle(2);

    assert!(matches!(
        rig.host.load_map(),
        Err(SessionError::PlayersNotReady)
    ));
    assert_eq!(rig.host.state(), SessionState::Lobby);
}

#[test]
fn test_lobby_flow_reaches_game() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    rig.join(Rig::client_config("bo"));
    rig.start_game();

    assert_eq!(rig.client(a).state(), SessionState::InGame);
    let requested = rig.peers[a]
        .drain_events()
        .into_iter()
        .find_map(|e| match e {
            SessionEvent::MapLoadRequested(load) => Some(load),
            _ => None,
        })
        .unwrap();
    assert_eq!(requested.map_asset_id, 77);
}

#[test]
fn test_auto_load_when_everyone_ready() {
    let mut config = host_config();
    config.auto_load_when_ready = true;
    let mut rig = Rig::new(config);
    let a = rig.join(Rig::client_config("ada"));

    rig.client_mut(a).set_ready(true).unwrap();
    rig.settle(3);
    assert_eq!(rig.host.state(), SessionState::LoadingScreen);
    assert_eq!(rig.client(a).state(), SessionState::LoadingScreen);
}

#[test]
fn test_settings_change_reaches_clients() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));

    let mut settings = rig.host.session().settings().clone();
    settings.name = "Docks".into();
    settings.duration_secs = 600;
    rig.host.change_session_settings(settings).unwrap();
    rig.settle(2);

    assert_eq!(rig.client(a).session().settings().name, "Docks");
    assert_eq!(rig.client(a).session().settings().duration_secs, 600);
}

#[test]
fn test_settings_cannot_drop_below_player_count() {
    let mut rig = Rig::new(host_config());
    rig.join(Rig::client_config("ada"));
    rig.join(Rig::client_config("bo"));

    let mut settings = rig.host.session().settings().clone();
    settings.max_players = 1;
    assert!(matches!(
        rig.host.change_session_settings(settings),
        Err(SessionError::InvalidSettings(_))
    ));
}

#[test]
fn test_player_info_change_is_broadcast() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    let b = rig.join(Rig::client_config("bo"));

    rig.client_mut(b)
        .change_player_info(PlayerInfoChange {
            team: 2,
            color: Color::default(),
            name: "bo-2".into(),
        })
        .unwrap();
    rig.settle(2);

    let seen = rig.client(a).player(PlayerIndex(1)).unwrap();
    assert_eq!(seen.team, 2);
    assert_eq!(seen.name, "bo-2");
}

#[test]
fn test_user_data_is_broadcast() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    let b = rig.join(Rig::client_config("bo"));

    rig.client_mut(a).set_user_data(vec![1, 2, 3]).unwrap();
    rig.settle(2);

    assert_eq!(rig.client(b).player(PlayerIndex(0)).unwrap().user_data, vec![1, 2, 3]);
}

// =========================================================================
// Leaving
// =========================================================================

#[test]
fn test_kick_notifies_player_and_others() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    let b = rig.join(Rig::client_config("bo"));

    rig.host.kick_player(PlayerIndex(1), "griefing").unwrap();
    rig.settle(2);

    assert_eq!(rig.client(b).state(), SessionState::None);
    assert!(rig.peers[b].drain_events().contains(&SessionEvent::Kicked {
        reason: "griefing".into()
    }));
    assert!(rig.peers[a].drain_events().contains(&SessionEvent::PlayerLeft {
        index: PlayerIndex(1),
        reason: LeaveReason::Kicked,
    }));
    assert_eq!(rig.host.player_count(), 1);
}

#[test]
fn test_kick_unknown_player_fails() {
    let mut rig = Rig::new(host_config());
    assert!(matches!(
        rig.host.kick_player(PlayerIndex(9), "nobody"),
        Err(SessionError::PlayerNotFound(PlayerIndex(9)))
    ));
}

#[test]
fn test_silent_player_times_out() {
    let mut config = host_config();
    config.ping_interval = Duration::from_millis(100);
    config.ping_timeout = Duration::from_millis(300);
    let mut rig = Rig::new(config);
    let a = rig.join(Rig::client_config("ada"));
    let b = rig.join(Rig::client_config("bo"));

    // Both answer pings for a while.
    rig.settle(10);
    assert_eq!(rig.host.player_count(), 2);
    assert!(!rig.client(a).pings().is_empty());

    rig.peers[b].stopped = true;
    rig.settle(20);

    assert_eq!(rig.host.player_count(), 1);
    assert!(rig.peers[a].drain_events().contains(&SessionEvent::PlayerLeft {
        index: PlayerIndex(1),
        reason: LeaveReason::TimedOut,
    }));
}

#[test]
fn test_close_session_drops_every_client() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    let b = rig.join(Rig::client_config("bo"));

    rig.host.close_session();
    rig.settle(2);

    assert_eq!(rig.host.state(), SessionState::None);
    for peer in [a, b] {
        assert_eq!(rig.client(peer).state(), SessionState::None);
        assert!(rig.peers[peer].drain_events().contains(&SessionEvent::SessionClosed));
    }
    assert!(rig.host_events().contains(&SessionEvent::SessionClosed));
}

#[test]
fn test_client_drop_is_a_disconnect() {
    let mut rig = Rig::new(host_config());
    let a = rig.join(Rig::client_config("ada"));
    rig.join(Rig::client_config("bo"));

    let dropped = rig.peers.remove(1);
    drop(dropped);
    rig.settle(2);

    assert_eq!(rig.host.player_count(), 1);
    assert!(rig.peers[a].drain_events().contains(&SessionEvent::PlayerLeft {
        index: PlayerIndex(1),
        reason: LeaveReason::Disconnected,
    }));
}
