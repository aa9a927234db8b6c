//! A host and two clients in one process: lobby, a short game where one
//! truck drives across the map, and the post game.
//!
//! Pass a JSON host configuration file as the first argument to override
//! the defaults. Set `RUST_LOG=debug` to watch the session machinery.

use multiplay::prelude::*;
use multiplay::tick::TickDriver;
use tracing::info;

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

const TRUCK: EntityId = EntityId(1);

/// One truck driving along the x axis.
struct Drive {
    world: MemoryWorld,
    spawned: bool,
}

impl WorldSource for Drive {
    fn transform(&self, entity: EntityId) -> Option<Transform> {
        self.world.transform(entity)
    }

    fn component(&self, entity: EntityId, component: ComponentId) -> Option<&ComponentState> {
        self.world.component(entity, component)
    }
}

impl HostSimulation for Drive {
    fn advance(&mut self, tick: Tick, outbox: &mut TickOutbox) {
        if !self.spawned {
            let transform = Transform::default();
            self.world.spawn(TRUCK, "truck", transform);
            outbox.create_entity(
                EntityCreation {
                    entity: TRUCK,
                    template: "truck".into(),
                    owner: Some(PlayerIndex(0)),
                    transform,
                },
                &[],
            );
            self.spawned = true;
            return;
        }
        let x = tick.0 as f32 * 0.5;
        self.world.set_transform(
            TRUCK,
            Transform {
                position: Vec3 { x, y: 0.0, z: 0.0 },
                yaw: 0.0,
            },
        );
        if tick.0 % 20 == 0 {
            outbox.player_score(ScoreDelta {
                player: PlayerIndex(0),
                score: tick.0 as i32,
            });
        }
    }

    fn execute_command(&mut self, _player: PlayerIndex, _command: &Command) -> bool {
        false
    }

    fn order_unit(&mut self, _player: PlayerIndex, _order: &UnitOrder) -> Option<EntityId> {
        None
    }
}

/// Client side: the reconstructed world plus a log of events.
#[derive(Default)]
struct View {
    world: MemoryWorld,
    scores: usize,
}

impl WorldSink for View {
    fn create_entity(&mut self, creation: &EntityCreation) {
        self.world.create_entity(creation);
    }

    fn destroy_entity(&mut self, entity: EntityId) {
        self.world.destroy_entity(entity);
    }

    fn apply_transform(&mut self, entity: EntityId, transform: Transform) {
        self.world.apply_transform(entity, transform);
    }

    fn apply_component(&mut self, entity: EntityId, component: ComponentId, state: &ComponentState) {
        self.world.apply_component(entity, component, state);
    }
}

impl ClientSimulation for View {
    fn apply_event(&mut self, tick: Tick, event: SimulationEvent) {
        if let SimulationEvent::Score(score) = event {
            info!(%tick, player = %score.player, score = score.score, "score");
            self.scores += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn load_config() -> Result<HostConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            Ok(HostConfig::from_json(&json)?)
        }
        None => Ok(HostConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    multiplay::init_tracing();

    let config = load_config()?;
    let listener = LoopbackListener::new();
    let connector = listener.connector();
    let mut host = Host::new(config.clone(), ComponentRegistry::new(), Box::new(listener))?;
    let mut sim = Drive {
        world: MemoryWorld::new(),
        spawned: false,
    };

    let mut clients = Vec::new();
    for name in ["ada", "bo"] {
        let client_config = ClientConfig {
            player_name: name.into(),
            ..Default::default()
        };
        let client = Client::connect(
            client_config,
            ComponentRegistry::new(),
            ConnectTarget::Loopback(connector.clone()),
        )?;
        clients.push((client, View::default()));
    }

    let mut driver = TickDriver::new(config.tick.clone());
    let mut readied = false;
    let mut loaded = false;
    let mut submitted = false;
    while host.state().is_active() {
        let now = driver.wait_for_tick().await.now;
        host.update(now, &mut sim);
        for (client, view) in &mut clients {
            client.update(now, view);
        }
        driver.record_tick_end();

        let joined = clients
            .iter()
            .all(|(client, _)| client.state() == SessionState::Lobby);
        match host.state() {
            SessionState::Lobby if !readied && joined && host.player_count() == clients.len() => {
                for (client, _) in &mut clients {
                    client.send_chat_message("hello");
                    client.set_ready(true)?;
                }
                readied = true;
            }
            SessionState::Lobby if readied && host.all_players_ready() => {
                host.load_map()?;
            }
            SessionState::LoadingScreen if !loaded => {
                if clients
                    .iter()
                    .all(|(client, _)| client.state() == SessionState::LoadingScreen)
                {
                    for (client, _) in &mut clients {
                        client.notify_map_loaded()?;
                    }
                    loaded = true;
                }
            }
            SessionState::InGame if host.tick().0 >= 60 => {
                let end = host.end_game(Some(0))?;
                info!(winning_team = ?end.winning_team, "game over");
            }
            SessionState::PostGame if !submitted => {
                if clients
                    .iter()
                    .all(|(client, _)| client.state() == SessionState::PostGame)
                {
                    for (i, (client, _)) in clients.iter_mut().enumerate() {
                        let name = client.config().player_name.clone();
                        client.submit_highscore(100 * (i as i32 + 1), &name)?;
                    }
                    submitted = true;
                }
            }
            SessionState::PostGameFinish => host.close_session(),
            _ => {}
        }
    }

    for (client, view) in &clients {
        let position = view.world.get(TRUCK).map(|truck| truck.transform.position);
        info!(
            player = ?client.local_player(),
            ?position,
            scores = view.scores,
            chat = client.session().chat().len(),
            "client finished"
        );
    }
    Ok(())
}
