//! Operation message handlers: a plug-in side channel on top of the tick.
//!
//! A handler owns one handler-owned [`OperationMessage`] kind. On the host
//! it contributes a message to every gather cycle through
//! [`write_data`](OperationMessageHandler::write_data). On the receiving
//! side it parses its messages in
//! [`on_handle_message`](OperationMessageHandler::on_handle_message) and
//! applies the parsed data in [`apply_data`](OperationMessageHandler::apply_data)
//! once the local tick reaches it. New event kinds plug in here without
//! touching the cache or the broadcast loop.

mod batched;
mod fade;
mod minimap;

use std::any::Any;
use std::collections::BTreeMap;

use multiplay_protocol::{
    BitReader, BitWriter, Message, OperationMessage, PlayerIndex, ProtocolError, RawBits, Tick,
};

use crate::SessionError;

pub use batched::BatchedEvents;
pub use fade::EntityFadeHandler;
pub use minimap::MinimapPingHandler;

/// One handler-owned message kind.
pub trait OperationMessageHandler: Any + Send {
    /// The kind this handler owns.
    fn message(&self) -> OperationMessage;

    /// Appends buffered outgoing events for `tick`. Returns `false` when
    /// there was nothing to send; the writer is then discarded.
    fn write_data(&mut self, tick: Tick, writer: &mut BitWriter) -> bool;

    /// Parses one received message of `size` bits.
    ///
    /// `player` is the sender when the host receives from a client and
    /// `None` when a client receives from the host.
    fn on_handle_message(
        &mut self,
        player: Option<PlayerIndex>,
        size: u32,
        reader: &mut BitReader<'_>,
    ) -> Result<(), ProtocolError>;

    /// Applies parsed data whose tick has arrived.
    fn apply_data(&mut self, tick: Tick);

    /// Drops everything buffered in both directions.
    fn clear(&mut self);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Registry of handlers, one per kind.
#[derive(Default)]
pub struct HandlerManager {
    handlers: BTreeMap<OperationMessage, Box<dyn OperationMessageHandler>>,
}

impl std::fmt::Debug for HandlerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerManager")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager with the built-in fade and minimap ping handlers.
    pub fn with_builtin() -> Self {
        let mut manager = Self::new();
        manager.handlers.insert(
            OperationMessage::EntityFade,
            Box::new(EntityFadeHandler::default()),
        );
        manager.handlers.insert(
            OperationMessage::MinimapPing,
            Box::new(MinimapPingHandler::default()),
        );
        manager
    }

    /// Registers `handler` for the kind it reports.
    ///
    /// # Errors
    /// [`SessionError::NotHandlerKind`] when the kind is decoded by the core
    /// dispatcher, [`SessionError::HandlerAlreadyRegistered`] when taken.
    pub fn register(&mut self, handler: Box<dyn OperationMessageHandler>) -> Result<(), SessionError> {
        let kind = handler.message();
        if !kind.is_handler_owned() {
            return Err(SessionError::NotHandlerKind(kind));
        }
        if self.handlers.contains_key(&kind) {
            return Err(SessionError::HandlerAlreadyRegistered(kind));
        }
        tracing::debug!(%kind, "operation message handler registered");
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn unregister(&mut self, kind: OperationMessage) -> Option<Box<dyn OperationMessageHandler>> {
        self.handlers.remove(&kind)
    }

    pub fn get(&self, kind: OperationMessage) -> Option<&dyn OperationMessageHandler> {
        self.handlers.get(&kind).map(|h| h.as_ref())
    }

    pub fn get_mut(&mut self, kind: OperationMessage) -> Option<&mut (dyn OperationMessageHandler + 'static)> {
        self.handlers.get_mut(&kind).map(|h| h.as_mut())
    }

    /// The first registered handler of concrete type `H`.
    pub fn handler<H: OperationMessageHandler>(&self) -> Option<&H> {
        self.handlers
            .values()
            .find_map(|h| h.as_any().downcast_ref::<H>())
    }

    pub fn handler_mut<H: OperationMessageHandler>(&mut self) -> Option<&mut H> {
        self.handlers
            .values_mut()
            .find_map(|h| h.as_any_mut().downcast_mut::<H>())
    }

    pub fn contains(&self, kind: OperationMessage) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<OperationMessage> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Collects one message per handler that has something to send.
    pub fn gather(&mut self, tick: Tick) -> Vec<Message> {
        let mut messages = Vec::new();
        for (kind, handler) in &mut self.handlers {
            let mut writer = BitWriter::new();
            if handler.write_data(tick, &mut writer) {
                messages.push(Message::Handler {
                    kind: *kind,
                    body: writer.into_raw(),
                });
            }
        }
        messages
    }

    /// Routes a received handler-owned message.
    pub fn handle(
        &mut self,
        kind: OperationMessage,
        player: Option<PlayerIndex>,
        body: &RawBits,
    ) -> Result<(), SessionError> {
        let handler = self
            .handlers
            .get_mut(&kind)
            .ok_or(SessionError::UnhandledMessage(kind))?;
        let mut reader = body.reader();
        handler.on_handle_message(player, body.bit_len(), &mut reader)?;
        Ok(())
    }

    pub fn apply(&mut self, tick: Tick) {
        for handler in self.handlers.values_mut() {
            handler.apply_data(tick);
        }
    }

    pub fn clear(&mut self) {
        for handler in self.handlers.values_mut() {
            handler.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        kind: OperationMessage,
        received: u32,
    }

    impl OperationMessageHandler for Counter {
        fn message(&self) -> OperationMessage {
            self.kind
        }
        fn write_data(&mut self, _tick: Tick, writer: &mut BitWriter) -> bool {
            writer.write_u8(1);
            true
        }
        fn on_handle_message(
            &mut self,
            _player: Option<PlayerIndex>,
            size: u32,
            reader: &mut BitReader<'_>,
        ) -> Result<(), ProtocolError> {
            reader.skip(size)?;
            self.received += 1;
            Ok(())
        }
        fn apply_data(&mut self, _tick: Tick) {}
        fn clear(&mut self) {
            self.received = 0;
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_register_rejects_core_kinds() {
        let mut manager = HandlerManager::new();
        let err = manager
            .register(Box::new(Counter {
                kind: OperationMessage::DataUpdate,
                received: 0,
            }))
            .unwrap_err();
        assert!(matches!(err, SessionError::NotHandlerKind(OperationMessage::DataUpdate)));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut manager = HandlerManager::with_builtin();
        let err = manager
            .register(Box::new(Counter {
                kind: OperationMessage::EntityFade,
                received: 0,
            }))
            .unwrap_err();
        assert!(matches!(err, SessionError::HandlerAlreadyRegistered(_)));
    }

    #[test]
    fn test_handle_routes_by_kind_and_downcasts() {
        let mut manager = HandlerManager::new();
        manager
            .register(Box::new(Counter {
                kind: OperationMessage::MinimapPing,
                received: 0,
            }))
            .unwrap();
        let messages = manager.gather(Tick(1));
        assert_eq!(messages.len(), 1);
        let Message::Handler { kind, body } = &messages[0] else {
            panic!("expected handler message");
        };
        manager.handle(*kind, None, body).unwrap();
        assert_eq!(manager.handler::<Counter>().unwrap().received, 1);
    }

    #[test]
    fn test_handle_unregistered_kind_is_error() {
        let mut manager = HandlerManager::new();
        let err = manager
            .handle(OperationMessage::EntityFade, None, &RawBits::default())
            .unwrap_err();
        assert!(matches!(err, SessionError::UnhandledMessage(_)));
    }
}
