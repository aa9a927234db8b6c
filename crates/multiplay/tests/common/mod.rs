//! Shared rig for the end-to-end tests: a host and any number of clients
//! over loopback links, stepped by hand on a synthetic clock.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use multiplay::prelude::*;
use multiplay::transport::Acceptor;
use tokio::sync::mpsc::UnboundedReceiver;

/// One step of the synthetic clock. Matches the default 20 Hz tick.
pub const STEP: Duration = Duration::from_millis(50);

// =========================================================================
// Simulations
// =========================================================================

/// Host simulation over a [`MemoryWorld`]. Tests mutate `world` and the
/// host outbox directly between steps.
#[derive(Default)]
pub struct HostWorld {
    pub world: MemoryWorld,
    pub ticks: Vec<Tick>,
    pub commands: Vec<(PlayerIndex, Command)>,
    pub owners: BTreeMap<EntityId, PlayerIndex>,
    ordered: Vec<EntityCreation>,
    next_entity: u32,
}

impl HostWorld {
    pub fn new() -> Self {
        Self {
            next_entity: 1000,
            ..Default::default()
        }
    }

    /// Spawns an entity in the world and announces it with the next tick.
    pub fn spawn(
        &mut self,
        outbox: &mut TickOutbox,
        entity: EntityId,
        owner: Option<PlayerIndex>,
        at: Vec3,
    ) {
        let transform = Transform {
            position: at,
            yaw: 0.0,
        };
        self.world.spawn(entity, "truck", transform);
        if let Some(owner) = owner {
            self.owners.insert(entity, owner);
        }
        outbox.create_entity(
            EntityCreation {
                entity,
                template: "truck".into(),
                owner,
                transform,
            },
            &[],
        );
    }
}

impl WorldSource for HostWorld {
    fn transform(&self, entity: EntityId) -> Option<Transform> {
        self.world.transform(entity)
    }

    fn component(&self, entity: EntityId, component: ComponentId) -> Option<&ComponentState> {
        self.world.component(entity, component)
    }
}

impl HostSimulation for HostWorld {
    fn advance(&mut self, tick: Tick, outbox: &mut TickOutbox) {
        self.ticks.push(tick);
        for creation in self.ordered.drain(..) {
            outbox.create_entity(creation, &[]);
        }
    }

    fn execute_command(&mut self, player: PlayerIndex, command: &Command) -> bool {
        self.commands.push((player, command.clone()));
        command.kind != 0
    }

    fn order_unit(&mut self, player: PlayerIndex, order: &UnitOrder) -> Option<EntityId> {
        if order.unit_type == 0 {
            return None;
        }
        self.next_entity += 1;
        let entity = EntityId(self.next_entity);
        let transform = Transform {
            position: order.spawn_point,
            yaw: 0.0,
        };
        self.world.spawn(entity, "ordered", transform);
        self.owners.insert(entity, player);
        self.ordered.push(EntityCreation {
            entity,
            template: "ordered".into(),
            owner: Some(player),
            transform,
        });
        Some(entity)
    }

    fn remove_player_units(&mut self, player: PlayerIndex) -> Vec<EntityId> {
        let owned: Vec<EntityId> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == player)
            .map(|(entity, _)| *entity)
            .collect();
        for entity in &owned {
            self.owners.remove(entity);
            self.world.despawn(*entity);
        }
        owned
    }
}

/// Client simulation that records every event it is handed.
#[derive(Default)]
pub struct ClientWorld {
    pub world: MemoryWorld,
    pub events: Vec<(Tick, SimulationEvent)>,
}

impl WorldSink for ClientWorld {
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

impl ClientSimulation for ClientWorld {
    fn apply_event(&mut self, tick: Tick, event: SimulationEvent) {
        self.events.push((tick, event));
    }
}

// =========================================================================
// Rig
// =========================================================================

pub struct Peer {
    pub client: Client,
    pub sim: ClientWorld,
    pub events: UnboundedReceiver<SessionEvent>,
    /// Stopped peers keep their link but are no longer updated.
    pub stopped: bool,
}

impl Peer {
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}

pub struct Rig {
    pub host: Host,
    pub sim: HostWorld,
    pub host_events: UnboundedReceiver<SessionEvent>,
    pub peers: Vec<Peer>,
    pub connector: LoopbackConnector,
    /// Stepped between the host and the clients when present.
    pub relay: Option<RelayServer>,
    pub now: Instant,
}

impl Rig {
    pub fn new(config: HostConfig) -> Self {
        let listener = LoopbackListener::new();
        let connector = listener.connector();
        Self::with_acceptor(config, Box::new(listener), connector)
    }

    pub fn with_acceptor(
        config: HostConfig,
        acceptor: Box<dyn Acceptor>,
        connector: LoopbackConnector,
    ) -> Self {
        let mut host = Host::new(config, ComponentRegistry::new(), acceptor).unwrap();
        let host_events = host.subscribe();
        Self {
            host,
            sim: HostWorld::new(),
            host_events,
            peers: Vec::new(),
            connector,
            relay: None,
            now: Instant::now(),
        }
    }

    pub fn client_config(name: &str) -> ClientConfig {
        ClientConfig {
            player_name: name.into(),
            ..Default::default()
        }
    }

    /// Connects a client and steps until it has an answer.
    pub fn join(&mut self, config: ClientConfig) -> usize {
        self.join_target(config, ConnectTarget::Loopback(self.connector.clone()))
    }

    pub fn join_target(&mut self, config: ClientConfig, target: ConnectTarget) -> usize {
        let mut client = Client::connect(config, ComponentRegistry::new(), target).unwrap();
        let events = client.subscribe();
        self.peers.push(Peer {
            client,
            sim: ClientWorld::default(),
            events,
            stopped: false,
        });
        self.settle(4);
        self.peers.len() - 1
    }

    /// Advances the clock one step: host first, then every running client.
    pub fn step(&mut self) {
        self.now += STEP;
        self.host.update(self.now, &mut self.sim);
        self.pump_relay();
        for peer in self.peers.iter_mut().filter(|p| !p.stopped) {
            peer.client.update(self.now, &mut peer.sim);
        }
        self.pump_relay();
    }

    fn pump_relay(&mut self) {
        if let Some(relay) = self.relay.as_mut() {
            relay.update();
        }
    }

    pub fn settle(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn client(&self, peer: usize) -> &Client {
        &self.peers[peer].client
    }

    pub fn client_mut(&mut self, peer: usize) -> &mut Client {
        &mut self.peers[peer].client
    }

    pub fn host_events(&mut self) -> Vec<SessionEvent> {
        std::iter::from_fn(|| self.host_events.try_recv().ok()).collect()
    }

    /// Readies everyone, loads the map and waits for the game to start.
    pub fn start_game(&mut self) {
        for peer in &mut self.peers {
            peer.client.set_ready(true).unwrap();
        }
        self.settle(3);
        self.host.load_map().unwrap();
        self.settle(2);
        for peer in &mut self.peers {
            peer.client.notify_map_loaded().unwrap();
        }
        self.settle(3);
        assert_eq!(self.host.state(), SessionState::InGame);
    }
}
