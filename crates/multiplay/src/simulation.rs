//! The seam between the session core and the game simulation.
//!
//! The host reads live state through [`HostSimulation`] and records what
//! happened during a tick in a [`TickOutbox`]. The client pushes
//! reconstructed state and per-tick events back into a
//! [`ClientSimulation`].

use multiplay_cache::{WorldSink, WorldSource};
use multiplay_protocol::messages::{
    AudioCue, Command, Countdown, EntityCreation, EntityFade, FireHose, FreeplayEventDelta,
    HintMessage, LayerChange, MinimapMarker, MinimapPingMark, ParticleEffect, ScoreDelta,
    TickBatch, UnitOrder, UnitSpawn,
};
use multiplay_protocol::{ComponentId, EntityId, Message, OperationMessage, PlayerIndex, Tick};

// ---------------------------------------------------------------------------
// Host side
// ---------------------------------------------------------------------------

/// Host-side simulation hooks.
pub trait HostSimulation: WorldSource {
    /// Runs one simulation step. Everything that should reach clients
    /// this tick goes into `outbox`.
    fn advance(&mut self, tick: Tick, outbox: &mut TickOutbox);

    /// Executes a client command. Returns whether it succeeded.
    fn execute_command(&mut self, player: PlayerIndex, command: &Command) -> bool;

    /// Places a unit ordered by a client. Returns the new entity, or
    /// `None` when the order was refused.
    fn order_unit(&mut self, player: PlayerIndex, order: &UnitOrder) -> Option<EntityId>;

    /// Removes the units owned by a player who left. Returns the removed
    /// entities so their destruction reaches the clients.
    fn remove_player_units(&mut self, _player: PlayerIndex) -> Vec<EntityId> {
        Vec::new()
    }
}

/// Changes recorded during one tick, waiting for the next gather.
///
/// Every list is drained when the tick's frame is built.
#[derive(Debug, Default)]
pub struct TickOutbox {
    pub(crate) creates: Vec<(EntityCreation, Vec<ComponentId>)>,
    pub(crate) destroys: Vec<EntityId>,
    pub(crate) fades: Vec<EntityFade>,
    spawns: Vec<UnitSpawn>,
    freeplay: Vec<FreeplayEventDelta>,
    scores: Vec<ScoreDelta>,
    countdowns: Vec<Countdown>,
    hints: Vec<HintMessage>,
    minimap: Vec<MinimapMarker>,
    audio: Vec<AudioCue>,
    fire_hoses: Vec<FireHose>,
    particles: Vec<ParticleEffect>,
    layers: Vec<LayerChange>,
}

impl TickOutbox {
    /// An outbox with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Announces a new entity and starts tracking `components` for it. The
    /// core transform is always tracked.
    pub fn create_entity(&mut self, creation: EntityCreation, components: &[ComponentId]) {
        self.creates.push((creation, components.to_vec()));
    }

    /// Removes the entity from the map cache and tells clients to drop it.
    pub fn destroy_entity(&mut self, entity: EntityId) {
        self.destroys.push(entity);
    }

    /// Queues a `SPAWN_UNIT` event.
    pub fn spawn_unit(&mut self, spawn: UnitSpawn) {
        self.spawns.push(spawn);
    }

    /// Queues a freeplay event state change.
    pub fn freeplay_event(&mut self, delta: FreeplayEventDelta) {
        self.freeplay.push(delta);
    }

    /// Queues a new score total for one player.
    pub fn player_score(&mut self, delta: ScoreDelta) {
        self.scores.push(delta);
    }

    /// Queues the remaining round time.
    pub fn countdown(&mut self, countdown: Countdown) {
        self.countdowns.push(countdown);
    }

    /// Queues a hint for one player or everyone.
    pub fn hint(&mut self, hint: HintMessage) {
        self.hints.push(hint);
    }

    /// Queues a minimap marker.
    pub fn minimap_message(&mut self, marker: MinimapMarker) {
        self.minimap.push(marker);
    }

    /// Queues a sound cue.
    pub fn audio(&mut self, cue: AudioCue) {
        self.audio.push(cue);
    }

    /// Queues a fire hose attachment.
    pub fn fire_hose(&mut self, hose: FireHose) {
        self.fire_hoses.push(hose);
    }

    /// Queues a particle effect.
    pub fn particle(&mut self, effect: ParticleEffect) {
        self.particles.push(effect);
    }

    /// Queues a map layer visibility change.
    pub fn layer_toggle(&mut self, change: LayerChange) {
        self.layers.push(change);
    }

    /// Queues a fade for the fade handler.
    pub fn fade_entity(&mut self, fade: EntityFade) {
        self.fades.push(fade);
    }

    /// True when nothing was queued since the last drain.
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.destroys.is_empty()
            && self.fades.is_empty()
            && self.spawns.is_empty()
            && self.freeplay.is_empty()
            && self.scores.is_empty()
            && self.countdowns.is_empty()
            && self.hints.is_empty()
            && self.minimap.is_empty()
            && self.audio.is_empty()
            && self.fire_hoses.is_empty()
            && self.particles.is_empty()
            && self.layers.is_empty()
    }

    /// Drains the event lists into one message per non-empty kind.
    /// Creations, destructions and fades are drained by the host itself.
    pub(crate) fn drain_events(&mut self, tick: Tick) -> Vec<Message> {
        let mut messages = Vec::new();
        push_batch(&mut messages, tick, &mut self.spawns, Message::SpawnUnit);
        push_batch(&mut messages, tick, &mut self.freeplay, Message::FreeplayEventUpdate);
        push_batch(&mut messages, tick, &mut self.scores, Message::PlayerScore);
        push_batch(&mut messages, tick, &mut self.countdowns, Message::GameModeCountdown);
        push_batch(&mut messages, tick, &mut self.hints, Message::Hint);
        push_batch(&mut messages, tick, &mut self.minimap, Message::MinimapMessage);
        push_batch(&mut messages, tick, &mut self.audio, Message::Audio);
        push_batch(&mut messages, tick, &mut self.fire_hoses, Message::FireHoseCreated);
        push_batch(&mut messages, tick, &mut self.particles, Message::ParticleSpawn);
        push_batch(&mut messages, tick, &mut self.layers, Message::LayerToggle);
        messages
    }

    /// Drops everything queued, including creations and destructions.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn push_batch<T>(
    messages: &mut Vec<Message>,
    tick: Tick,
    items: &mut Vec<T>,
    wrap: fn(TickBatch<T>) -> Message,
) {
    if items.is_empty() {
        return;
    }
    messages.push(wrap(TickBatch {
        tick,
        items: std::mem::take(items),
    }));
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// One per-tick event delivered to the client simulation once its tick
/// arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationEvent {
    UnitSpawned(UnitSpawn),
    FreeplayEvent(FreeplayEventDelta),
    Score(ScoreDelta),
    Countdown(Countdown),
    Hint(HintMessage),
    MinimapMessage(MinimapMarker),
    Audio(AudioCue),
    FireHoseCreated(FireHose),
    Particle(ParticleEffect),
    LayerToggle(LayerChange),
    EntityFade(EntityFade),
    MinimapPing(MinimapPingMark),
}

impl SimulationEvent {
    /// The message kind this event travelled as.
    pub fn kind(&self) -> OperationMessage {
        use OperationMessage as Op;
        match self {
            Self::UnitSpawned(_) => Op::SpawnUnit,
            Self::FreeplayEvent(_) => Op::FreeplayEventUpdate,
            Self::Score(_) => Op::PlayerScore,
            Self::Countdown(_) => Op::GameModeCountdown,
            Self::Hint(_) => Op::Hint,
            Self::MinimapMessage(_) => Op::MinimapMessage,
            Self::Audio(_) => Op::Audio,
            Self::FireHoseCreated(_) => Op::FireHoseCreated,
            Self::Particle(_) => Op::ParticleSpawn,
            Self::LayerToggle(_) => Op::LayerToggle,
            Self::EntityFade(_) => Op::EntityFade,
            Self::MinimapPing(_) => Op::MinimapPing,
        }
    }

    /// Splits a batched message into its events. `None` for messages that
    /// are not per-tick events.
    pub fn from_message(message: Message) -> Option<(Tick, Vec<SimulationEvent>)> {
        fn unpack<T>(
            batch: TickBatch<T>,
            wrap: fn(T) -> SimulationEvent,
        ) -> Option<(Tick, Vec<SimulationEvent>)> {
            Some((batch.tick, batch.items.into_iter().map(wrap).collect()))
        }
        match message {
            Message::SpawnUnit(b) => unpack(b, Self::UnitSpawned),
            Message::FreeplayEventUpdate(b) => unpack(b, Self::FreeplayEvent),
            Message::PlayerScore(b) => unpack(b, Self::Score),
            Message::GameModeCountdown(b) => unpack(b, Self::Countdown),
            Message::Hint(b) => unpack(b, Self::Hint),
            Message::MinimapMessage(b) => unpack(b, Self::MinimapMessage),
            Message::Audio(b) => unpack(b, Self::Audio),
            Message::FireHoseCreated(b) => unpack(b, Self::FireHoseCreated),
            Message::ParticleSpawn(b) => unpack(b, Self::Particle),
            Message::LayerToggle(b) => unpack(b, Self::LayerToggle),
            _ => None,
        }
    }
}

/// Client-side simulation hooks.
pub trait ClientSimulation: WorldSink {
    /// Applies one per-tick event whose tick the local clock reached.
    fn apply_event(&mut self, tick: Tick, event: SimulationEvent);
}
