//! In-game end-to-end tests: entity sync, per-tick events, commands and
//! the post game, over loopback links.

mod common;

use common::Rig;
use multiplay::prelude::*;

fn started(players: usize) -> Rig {
    let mut rig = Rig::new(HostConfig::default());
    for i in 0..players {
        rig.join(Rig::client_config(&format!("p{i}")));
    }
    rig.start_game();
    rig
}

fn at(x: f32) -> Vec3 {
    Vec3 { x, y: 0.0, z: 0.0 }
}

// =========================================================================
// Entity sync
// =========================================================================

#[test]
fn test_entity_create_move_destroy_reaches_client() {
    let mut rig = started(1);
    let truck = EntityId(1);

    let outbox = rig.host.outbox_mut();
    rig.sim.spawn(outbox, truck, None, at(1.0));
    rig.settle(6);
    let seen = rig.peers[0].sim.world.get(truck).unwrap();
    assert_eq!(seen.template, "truck");
    assert_eq!(seen.transform.position, at(1.0));

    rig.sim.world.set_transform(
        truck,
        Transform {
            position: at(12.5),
            yaw: 0.0,
        },
    );
    rig.settle(6);
    let moved = rig.peers[0].sim.world.get(truck).unwrap().transform.position;
    assert!((moved.x - 12.5).abs() < 0.01);

    rig.sim.world.despawn(truck);
    rig.host.outbox_mut().destroy_entity(truck);
    rig.settle(6);
    assert!(!rig.peers[0].sim.world.contains(truck));
    assert_eq!(rig.host.cache().tracked_count(), 0);
}

#[test]
fn test_client_clock_trails_newest_tick() {
    let mut rig = started(1);
    rig.settle(10);

    let client = rig.client(0);
    let clock = client.clock().unwrap();
    let newest = client.newest_tick().unwrap();
    assert!(newest >= clock);
    assert!(newest.since(clock) <= client.config().interpolation_delay);
    assert_eq!(newest, rig.host.tick());
}

#[test]
fn test_leaving_player_units_are_removed() {
    let mut rig = started(2);
    let mine = EntityId(5);
    let theirs = EntityId(6);
    let outbox = rig.host.outbox_mut();
    rig.sim.spawn(outbox, mine, Some(PlayerIndex(1)), at(0.0));
    let outbox = rig.host.outbox_mut();
    rig.sim.spawn(outbox, theirs, Some(PlayerIndex(0)), at(3.0));
    rig.settle(6);
    assert!(rig.peers[0].sim.world.contains(mine));

    rig.client_mut(1).leave();
    rig.settle(8);

    assert!(!rig.sim.world.contains(mine));
    assert!(!rig.peers[0].sim.world.contains(mine));
    assert!(rig.peers[0].sim.world.contains(theirs));
    assert!(rig.peers[0].drain_events().contains(&SessionEvent::PlayerLeft {
        index: PlayerIndex(1),
        reason: LeaveReason::Left,
    }));
    assert_eq!(rig.client(0).session().roster().len(), 1);
}

// =========================================================================
// Per-tick events
// =========================================================================

#[test]
fn test_events_arrive_in_tick_order() {
    let mut rig = started(1);

    rig.host
        .outbox_mut()
        .countdown(Countdown { remaining_ms: 3000 });
    rig.step();
    rig.host.outbox_mut().player_score(ScoreDelta {
        player: PlayerIndex(0),
        score: 40,
    });
    rig.host.outbox_mut().audio(AudioCue {
        sound_id: 9,
        position: None,
        volume: 1.0,
    });
    rig.settle(6);

    let events = &rig.peers[0].sim.events;
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0].1, SimulationEvent::Countdown(_)));
    assert!(events[0].0 < events[1].0);
    assert_eq!(events[1].0, events[2].0);
    assert!(events.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(rig.client(0).pending_events(), 0);
}

#[test]
fn test_entity_fade_reaches_clients() {
    let mut rig = started(1);
    rig.host.fade_entity(EntityFade {
        entity: EntityId(3),
        fade_in: false,
        duration_ms: 250,
    });
    rig.settle(6);

    assert!(rig.peers[0]
        .sim
        .events
        .iter()
        .any(|(_, e)| matches!(e, SimulationEvent::EntityFade(f) if f.entity == EntityId(3))));
}

#[test]
fn test_minimap_ping_is_relayed_to_everyone() {
    let mut rig = started(2);
    rig.client_mut(0).ping_minimap(4.0, 8.0).unwrap();
    rig.settle(8);

    for peer in 0..2 {
        let pinged = rig.peers[peer].sim.events.iter().any(|(_, e)| {
            matches!(e, SimulationEvent::MinimapPing(mark) if mark.player == PlayerIndex(0) && mark.x == 4.0)
        });
        assert!(pinged, "peer {peer} saw no ping");
    }
}

// =========================================================================
// Commands
// =========================================================================

#[test]
fn test_command_gets_response() {
    let mut rig = started(1);
    let ok = rig
        .client_mut(0)
        .execute_command(3, vec![EntityId(1)], Some(at(2.0)), 7)
        .unwrap();
    let refused = rig
        .client_mut(0)
        .execute_command(0, Vec::new(), None, 0)
        .unwrap();
    assert_eq!(rig.client(0).pending_commands(), 2);
    rig.settle(2);

    assert_eq!(rig.client(0).pending_commands(), 0);
    assert_eq!(rig.sim.commands.len(), 2);
    assert_eq!(rig.sim.commands[0].0, PlayerIndex(0));
    let results: Vec<CommandResult> = rig.peers[0]
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::CommandResult(result) => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 2);
    assert!(results.iter().any(|r| r.command_id == ok && r.success));
    assert!(results.iter().any(|r| r.command_id == refused && !r.success));
}

#[test]
fn test_command_outside_game_is_refused_locally() {
    let mut rig = Rig::new(HostConfig::default());
    rig.join(Rig::client_config("ada"));
    assert!(matches!(
        rig.client_mut(0).execute_command(1, Vec::new(), None, 0),
        Err(SessionError::WrongState { .. })
    ));
}

#[test]
fn test_ordered_unit_is_created_and_synced() {
    let mut rig = started(1);
    let request = rig.client_mut(0).order_unit(2, at(6.0)).unwrap();
    rig.settle(8);

    let result = rig.peers[0]
        .drain_events()
        .into_iter()
        .find_map(|e| match e {
            SessionEvent::OrderedUnitResult(result) => Some(result),
            _ => None,
        })
        .unwrap();
    assert_eq!(result.request_id, request);
    assert!(result.success);
    let entity = result.entity.unwrap();
    assert_eq!(rig.peers[0].sim.world.get(entity).unwrap().template, "ordered");
    assert_eq!(rig.client(0).pending_orders(), 0);
}

// =========================================================================
// Post game
// =========================================================================

#[test]
fn test_highscores_finish_post_game() {
    let mut rig = started(2);
    let end = rig.host.end_game(Some(1)).unwrap();
    rig.settle(2);
    assert_eq!(rig.client(0).state(), SessionState::PostGame);
    assert!(rig.peers[1].drain_events().contains(&SessionEvent::GameEnded(end)));

    rig.client_mut(0).submit_highscore(900, "p0").unwrap();
    rig.settle(2);
    assert_eq!(rig.host.state(), SessionState::PostGame);
    // A client's own result does not end its post game.
    assert_eq!(rig.client(0).state(), SessionState::PostGame);
    assert!(rig.peers[0].drain_events().contains(&SessionEvent::HighscoreSubmitted {
        index: PlayerIndex(0),
        accepted: true,
    }));

    rig.client_mut(1).submit_highscore(1200, "p1").unwrap();
    rig.settle(2);
    assert_eq!(rig.host.state(), SessionState::PostGameFinish);
    for peer in 0..2 {
        assert_eq!(rig.client(peer).state(), SessionState::PostGameFinish);
    }

    let submitted = rig
        .host_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::HighscoreSubmitted { accepted: true, .. }))
        .count();
    assert_eq!(submitted, 2);
}

#[test]
fn test_end_game_outside_game_fails() {
    let mut rig = Rig::new(HostConfig::default());
    assert!(matches!(
        rig.host.end_game(None),
        Err(SessionError::InvalidTransition { .. })
    ));
}
