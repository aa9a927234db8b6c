use std::any::Any;

use multiplay_protocol::messages::EntityFade;
use multiplay_protocol::{
    BitReader, BitWriter, OperationMessage, PlayerIndex, ProtocolError, Tick,
};

use super::{BatchedEvents, OperationMessageHandler};

/// `ENTITY_FADE`: host-originated fade in/out effects.
///
/// The host queues fades with [`fade`](Self::fade); clients read them back
/// with [`drain_applied`](Self::drain_applied) once their tick arrives.
#[derive(Debug, Default)]
pub struct EntityFadeHandler {
    events: BatchedEvents<EntityFade>,
}

impl EntityFadeHandler {
    pub fn fade(&mut self, fade: EntityFade) {
        self.events.queue(fade);
    }

    pub fn drain_applied(&mut self) -> Vec<(Tick, EntityFade)> {
        self.events.drain_applied()
    }

    pub fn events(&self) -> &BatchedEvents<EntityFade> {
        &self.events
    }
}

impl OperationMessageHandler for EntityFadeHandler {
    fn message(&self) -> OperationMessage {
        OperationMessage::EntityFade
    }

    fn write_data(&mut self, tick: Tick, writer: &mut BitWriter) -> bool {
        self.events.write(tick, writer)
    }

    fn on_handle_message(
        &mut self,
        player: Option<PlayerIndex>,
        size: u32,
        reader: &mut BitReader<'_>,
    ) -> Result<(), ProtocolError> {
        if let Some(player) = player {
            return Err(ProtocolError::InvalidValue(format!(
                "entity fade from client {player}"
            )));
        }
        let batch = BatchedEvents::read(reader, size)?;
        self.events.buffer(batch);
        Ok(())
    }

    fn apply_data(&mut self, tick: Tick) {
        self.events.apply(tick);
    }

    fn clear(&mut self) {
        self.events.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
