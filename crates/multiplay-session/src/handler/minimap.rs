use std::any::Any;

use multiplay_protocol::messages::MinimapPingMark;
use multiplay_protocol::{
    BitReader, BitWriter, OperationMessage, PlayerIndex, ProtocolError, Tick,
};

use super::{BatchedEvents, OperationMessageHandler};

/// `MINIMAP_PING`: map pings any player can place.
///
/// A client queues its ping and sends it with its next outgoing gather.
/// The host stamps each received ping with the real sender index and
/// queues it for the next broadcast, so every client (the sender included)
/// sees it at the same tick.
#[derive(Debug, Default)]
pub struct MinimapPingHandler {
    events: BatchedEvents<MinimapPingMark>,
    relayed: u64,
}

impl MinimapPingHandler {
    pub fn ping(&mut self, mark: MinimapPingMark) {
        self.events.queue(mark);
    }

    pub fn drain_applied(&mut self) -> Vec<(Tick, MinimapPingMark)> {
        self.events.drain_applied()
    }

    /// Client pings the host has re-queued for broadcast.
    pub fn relayed(&self) -> u64 {
        self.relayed
    }

    pub fn events(&self) -> &BatchedEvents<MinimapPingMark> {
        &self.events
    }
}

impl OperationMessageHandler for MinimapPingHandler {
    fn message(&self) -> OperationMessage {
        OperationMessage::MinimapPing
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
        let batch = BatchedEvents::<MinimapPingMark>::read(reader, size)?;
        match player {
            Some(sender) => {
                for mut mark in batch.items {
                    mark.player = sender;
                    self.events.queue(mark);
                    self.relayed += 1;
                }
            }
            None => {
                self.events.buffer(batch);
            }
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandlerManager;
    use multiplay_protocol::Message;

    fn mark(player: u8) -> MinimapPingMark {
        MinimapPingMark {
            player: PlayerIndex(player),
            x: 10.0,
            y: -4.0,
        }
    }

    #[test]
    fn test_host_restamps_sender_and_requeues() {
        let mut client = HandlerManager::with_builtin();
        client
            .handler_mut::<MinimapPingHandler>()
            .unwrap()
            .ping(mark(9));
        let sent = client.gather(Tick(3));
        let Message::Handler { kind, body } = &sent[0] else {
            panic!("expected handler message");
        };

        let mut host = HandlerManager::with_builtin();
        host.handle(*kind, Some(PlayerIndex(1)), body).unwrap();
        let ping = host.handler_mut::<MinimapPingHandler>().unwrap();
        assert_eq!(ping.relayed(), 1);
        assert_eq!(ping.events().pending(), 1);

        let broadcast = host.gather(Tick(7));
        let Message::Handler { kind, body } = &broadcast[0] else {
            panic!("expected handler message");
        };
        let mut receiver = HandlerManager::with_builtin();
        receiver.handle(*kind, None, body).unwrap();
        receiver.apply(Tick(7));
        let applied = receiver
            .handler_mut::<MinimapPingHandler>()
            .unwrap()
            .drain_applied();
        assert_eq!(applied, vec![(Tick(7), mark(1))]);
    }
}
