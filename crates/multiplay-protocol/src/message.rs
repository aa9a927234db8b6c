//! The decoded operation message union and frame-level batching.
//!
//! A frame payload is a sequence of `[tag u8][payload]` records. Decoding
//! stops at the first malformed record: its length is unknown, so nothing
//! after it can be located.

use crate::bitstream::{BitReader, BitWriter, RawBits};
use crate::frame::MAIN_FRAME;
use crate::messages::*;
use crate::operation::OperationMessage;
use crate::types::{EntityId, SessionInfo};
use crate::wire::WireFormat;
use crate::ProtocolError;

/// One operation message with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // Lobby
    JoinRequest(JoinRequest),
    JoinResponse(JoinResult),
    PlayerJoined(PlayerSummary),
    PlayerLeft(PlayerLeft),
    PlayerKicked(Kicked),
    ClientReadyState(bool),
    ServerReadyState(PlayerReady),
    ClientUserData(Vec<u8>),
    ServerUserData(PlayerUserData),
    ClientPlayerInfo(PlayerInfoChange),
    ServerPlayerInfo(PlayerInfoUpdate),
    SessionSettingsChanged(SessionInfo),
    LoadMap(LoadMap),
    MapLoaded,
    GameStart(GameStart),
    Chat(ChatLine),
    GameEnd(GameEnd),
    HighscoreSubmit(HighscoreSubmission),
    HighscoreResult(HighscoreResult),

    // Tick
    DataUpdate(DataUpdatePayload),
    CreateEntity(TickBatch<EntityCreation>),
    DestroyEntity(TickBatch<EntityId>),
    SpawnUnit(TickBatch<UnitSpawn>),
    FreeplayEventUpdate(TickBatch<FreeplayEventDelta>),
    PlayerScore(TickBatch<ScoreDelta>),
    GameModeCountdown(TickBatch<Countdown>),
    Hint(TickBatch<HintMessage>),
    MinimapMessage(TickBatch<MinimapMarker>),
    Audio(TickBatch<AudioCue>),
    FireHoseCreated(TickBatch<FireHose>),
    ParticleSpawn(TickBatch<ParticleEffect>),
    LayerToggle(TickBatch<LayerChange>),
    /// A handler-owned kind. The body is only interpreted by the handler
    /// registered for `kind`.
    Handler {
        kind: OperationMessage,
        body: RawBits,
    },

    // Command
    CommandExecution(Command),
    CommandResponse(CommandResult),
    OrderedUnit(UnitOrder),
    OrderedUnitResponse(UnitOrderResult),

    // Liveness
    Ping(Ping),
    PingAcknowledge(Ping),
    PlayerPings(Vec<PlayerPing>),
    CloseSession,
    /// Every highscore is in; the post game is over.
    PostGameFinished,
}

impl Message {
    pub fn kind(&self) -> OperationMessage {
        use OperationMessage as Op;
        match self {
            Self::JoinRequest(_) => Op::ClientJoinRequest,
            Self::JoinResponse(_) => Op::ServerJoinResponse,
            Self::PlayerJoined(_) => Op::ServerPlayerJoined,
            Self::PlayerLeft(_) => Op::ServerPlayerLeft,
            Self::PlayerKicked(_) => Op::ServerPlayerKicked,
            Self::ClientReadyState(_) => Op::ClientReadyStateChanged,
            Self::ServerReadyState(_) => Op::ServerReadyStateChanged,
            Self::ClientUserData(_) => Op::ClientUserDataChanged,
            Self::ServerUserData(_) => Op::ServerUserDataChanged,
            Self::ClientPlayerInfo(_) => Op::ClientPlayerInfoChanged,
            Self::ServerPlayerInfo(_) => Op::ServerPlayerInfoChanged,
            Self::SessionSettingsChanged(_) => Op::ServerSessionSettingsChanged,
            Self::LoadMap(_) => Op::ServerLoadMap,
            Self::MapLoaded => Op::ClientMapLoaded,
            Self::GameStart(_) => Op::ServerGameStart,
            Self::Chat(_) => Op::ChatMessage,
            Self::GameEnd(_) => Op::ServerGameEnd,
            Self::HighscoreSubmit(_) => Op::HighscoreSubmitRequest,
            Self::HighscoreResult(_) => Op::HighscoreSubmitResult,
            Self::DataUpdate(_) => Op::DataUpdate,
            Self::CreateEntity(_) => Op::CreateEntity,
            Self::DestroyEntity(_) => Op::DestroyEntity,
            Self::SpawnUnit(_) => Op::SpawnUnit,
            Self::FreeplayEventUpdate(_) => Op::FreeplayEventUpdate,
            Self::PlayerScore(_) => Op::PlayerScore,
            Self::GameModeCountdown(_) => Op::GameModeCountdown,
            Self::Hint(_) => Op::Hint,
            Self::MinimapMessage(_) => Op::MinimapMessage,
            Self::Audio(_) => Op::Audio,
            Self::FireHoseCreated(_) => Op::FireHoseCreated,
            Self::ParticleSpawn(_) => Op::ParticleSpawn,
            Self::LayerToggle(_) => Op::LayerToggle,
            Self::Handler { kind, .. } => *kind,
            Self::CommandExecution(_) => Op::ClientCommandExecution,
            Self::CommandResponse(_) => Op::ServerCommandExecutionResponse,
            Self::OrderedUnit(_) => Op::ClientOrderedUnit,
            Self::OrderedUnitResponse(_) => Op::ServerOrderedUnitResponse,
            Self::Ping(_) => Op::ServerPing,
            Self::PingAcknowledge(_) => Op::ClientPingAcknowledge,
            Self::PlayerPings(_) => Op::ServerPlayerPings,
            Self::CloseSession => Op::ServerCloseSession,
            Self::PostGameFinished => Op::ServerPostGameFinished,
        }
    }

    fn write_payload(&self, writer: &mut BitWriter) {
        match self {
            Self::JoinRequest(v) => v.write(writer),
            Self::JoinResponse(v) => v.write(writer),
            Self::PlayerJoined(v) => v.write(writer),
            Self::PlayerLeft(v) => v.write(writer),
            Self::PlayerKicked(v) => v.write(writer),
            Self::ClientReadyState(v) => v.write(writer),
            Self::ServerReadyState(v) => v.write(writer),
            Self::ClientUserData(v) => v.write(writer),
            Self::ServerUserData(v) => v.write(writer),
            Self::ClientPlayerInfo(v) => v.write(writer),
            Self::ServerPlayerInfo(v) => v.write(writer),
            Self::SessionSettingsChanged(v) => v.write(writer),
            Self::LoadMap(v) => v.write(writer),
            Self::GameStart(v) => v.write(writer),
            Self::Chat(v) => v.write(writer),
            Self::GameEnd(v) => v.write(writer),
            Self::HighscoreSubmit(v) => v.write(writer),
            Self::HighscoreResult(v) => v.write(writer),
            Self::DataUpdate(v) => v.write(writer),
            Self::CreateEntity(v) => v.write(writer),
            Self::DestroyEntity(v) => v.write(writer),
            Self::SpawnUnit(v) => v.write(writer),
            Self::FreeplayEventUpdate(v) => v.write(writer),
            Self::PlayerScore(v) => v.write(writer),
            Self::GameModeCountdown(v) => v.write(writer),
            Self::Hint(v) => v.write(writer),
            Self::MinimapMessage(v) => v.write(writer),
            Self::Audio(v) => v.write(writer),
            Self::FireHoseCreated(v) => v.write(writer),
            Self::ParticleSpawn(v) => v.write(writer),
            Self::LayerToggle(v) => v.write(writer),
            Self::Handler { body, .. } => body.write(writer),
            Self::CommandExecution(v) => v.write(writer),
            Self::CommandResponse(v) => v.write(writer),
            Self::OrderedUnit(v) => v.write(writer),
            Self::OrderedUnitResponse(v) => v.write(writer),
            Self::Ping(v) | Self::PingAcknowledge(v) => v.write(writer),
            Self::PlayerPings(v) => v.write(writer),
            Self::MapLoaded | Self::CloseSession | Self::PostGameFinished => {}
        }
    }

    /// Writes `[tag][payload]`.
    pub fn write(&self, writer: &mut BitWriter) {
        writer.write_u8(self.kind().as_u8());
        self.write_payload(writer);
    }

    /// Reads one `[tag][payload]` record.
    pub fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        use OperationMessage as Op;
        let tag = reader.read_u8()?;
        let kind = OperationMessage::from_u8(tag).ok_or(ProtocolError::UnknownOperation(tag))?;
        Ok(match kind {
            Op::ClientJoinRequest => Self::JoinRequest(WireFormat::read(reader)?),
            Op::ServerJoinResponse => Self::JoinResponse(WireFormat::read(reader)?),
            Op::ServerPlayerJoined => Self::PlayerJoined(WireFormat::read(reader)?),
            Op::ServerPlayerLeft => Self::PlayerLeft(WireFormat::read(reader)?),
            Op::ServerPlayerKicked => Self::PlayerKicked(WireFormat::read(reader)?),
            Op::ClientReadyStateChanged => Self::ClientReadyState(WireFormat::read(reader)?),
            Op::ServerReadyStateChanged => Self::ServerReadyState(WireFormat::read(reader)?),
            Op::ClientUserDataChanged => Self::ClientUserData(WireFormat::read(reader)?),
            Op::ServerUserDataChanged => Self::ServerUserData(WireFormat::read(reader)?),
            Op::ClientPlayerInfoChanged => Self::ClientPlayerInfo(WireFormat::read(reader)?),
            Op::ServerPlayerInfoChanged => Self::ServerPlayerInfo(WireFormat::read(reader)?),
            Op::ServerSessionSettingsChanged => {
                Self::SessionSettingsChanged(WireFormat::read(reader)?)
            }
            Op::ServerLoadMap => Self::LoadMap(WireFormat::read(reader)?),
            Op::ClientMapLoaded => Self::MapLoaded,
            Op::ServerGameStart => Self::GameStart(WireFormat::read(reader)?),
            Op::ChatMessage => Self::Chat(WireFormat::read(reader)?),
            Op::ServerGameEnd => Self::GameEnd(WireFormat::read(reader)?),
            Op::HighscoreSubmitRequest => Self::HighscoreSubmit(WireFormat::read(reader)?),
            Op::HighscoreSubmitResult => Self::HighscoreResult(WireFormat::read(reader)?),
            Op::DataUpdate => Self::DataUpdate(WireFormat::read(reader)?),
            Op::CreateEntity => Self::CreateEntity(WireFormat::read(reader)?),
            Op::DestroyEntity => Self::DestroyEntity(WireFormat::read(reader)?),
            Op::SpawnUnit => Self::SpawnUnit(WireFormat::read(reader)?),
            Op::FreeplayEventUpdate => Self::FreeplayEventUpdate(WireFormat::read(reader)?),
            Op::PlayerScore => Self::PlayerScore(WireFormat::read(reader)?),
            Op::GameModeCountdown => Self::GameModeCountdown(WireFormat::read(reader)?),
            Op::Hint => Self::Hint(WireFormat::read(reader)?),
            Op::MinimapMessage => Self::MinimapMessage(WireFormat::read(reader)?),
            Op::Audio => Self::Audio(WireFormat::read(reader)?),
            Op::FireHoseCreated => Self::FireHoseCreated(WireFormat::read(reader)?),
            Op::ParticleSpawn => Self::ParticleSpawn(WireFormat::read(reader)?),
            Op::LayerToggle => Self::LayerToggle(WireFormat::read(reader)?),
            Op::EntityFade | Op::MinimapPing => Self::Handler {
                kind,
                body: RawBits::read(reader)?,
            },
            Op::ClientCommandExecution => Self::CommandExecution(WireFormat::read(reader)?),
            Op::ServerCommandExecutionResponse => {
                Self::CommandResponse(WireFormat::read(reader)?)
            }
            Op::ClientOrderedUnit => Self::OrderedUnit(WireFormat::read(reader)?),
            Op::ServerOrderedUnitResponse => {
                Self::OrderedUnitResponse(WireFormat::read(reader)?)
            }
            Op::ServerPing => Self::Ping(WireFormat::read(reader)?),
            Op::ClientPingAcknowledge => Self::PingAcknowledge(WireFormat::read(reader)?),
            Op::ServerPlayerPings => Self::PlayerPings(WireFormat::read(reader)?),
            Op::ServerCloseSession => Self::CloseSession,
            Op::ServerPostGameFinished => Self::PostGameFinished,
        })
    }
}

/// Packs several messages into one outer frame.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    writer: BitWriter,
    count: usize,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: &Message) -> &mut Self {
        message.write(&mut self.writer);
        self.count += 1;
        self
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Finishes the frame and returns the bytes ready for a transport.
    pub fn finish(self) -> Vec<u8> {
        MAIN_FRAME.encode(&self.writer.into_raw())
    }
}

/// Encodes a single message as a complete frame.
pub fn encode_message(message: &Message) -> Vec<u8> {
    let mut builder = FrameBuilder::new();
    builder.push(message);
    builder.finish()
}

/// Result of decoding one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Every message decoded before the first failure, in frame order.
    pub messages: Vec<Message>,
    /// The failure that cut the frame short, if any.
    pub error: Option<ProtocolError>,
}

/// Checks the header and decodes every message in the frame.
///
/// A bad header fails the whole frame. A bad message ends decoding, but the
/// messages before it are returned.
pub fn decode_frame(bytes: &[u8]) -> Result<DecodedFrame, ProtocolError> {
    let (_header, mut reader) = MAIN_FRAME.read_and_check_header(bytes)?;
    let mut messages = Vec::new();
    let mut error = None;
    // Byte padding leaves fewer than 8 bits, never enough for a tag.
    while reader.remaining_bits() >= 8 {
        match Message::read(&mut reader) {
            Ok(message) => messages.push(message),
            Err(err) => {
                error = Some(err);
                break;
            }
        }
    }
    Ok(DecodedFrame { messages, error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlayerIndex, Tick};

    #[test]
    fn test_decode_frame_keeps_messages_in_order() {
        let mut builder = FrameBuilder::new();
        builder
            .push(&Message::Chat(ChatLine {
                sender: Some(PlayerIndex(1)),
                text: "gg".into(),
            }))
            .push(&Message::MapLoaded)
            .push(&Message::DestroyEntity(TickBatch::single(Tick(7), EntityId(3))));
        assert_eq!(builder.len(), 3);
        let decoded = decode_frame(&builder.finish()).unwrap();
        assert!(decoded.error.is_none());
        let kinds: Vec<_> = decoded.messages.iter().map(Message::kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationMessage::ChatMessage,
                OperationMessage::ClientMapLoaded,
                OperationMessage::DestroyEntity
            ]
        );
    }

    #[test]
    fn test_decode_frame_unknown_tag_keeps_earlier_messages() {
        let mut writer = BitWriter::new();
        Message::Ping(Ping { ping_id: 9 }).write(&mut writer);
        writer.write_u8(99);
        writer.write_u32(0);
        let bytes = MAIN_FRAME.encode(&writer.into_raw());

        let decoded = decode_frame(&bytes).unwrap();
        assert_eq!(decoded.messages, vec![Message::Ping(Ping { ping_id: 9 })]);
        assert_eq!(decoded.error, Some(ProtocolError::UnknownOperation(99)));
    }

    #[test]
    fn test_decode_frame_truncated_message_is_reported() {
        let mut writer = BitWriter::new();
        writer.write_u8(OperationMessage::ServerPing.as_u8());
        writer.write_u8(1);
        let bytes = MAIN_FRAME.encode(&writer.into_raw());

        let decoded = decode_frame(&bytes).unwrap();
        assert!(decoded.messages.is_empty());
        assert!(matches!(decoded.error, Some(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_handler_message_keeps_body_bits() {
        let mut body = BitWriter::new();
        body.write_bits(0b101, 3);
        let message = Message::Handler {
            kind: OperationMessage::MinimapPing,
            body: body.into_raw(),
        };
        let decoded = decode_frame(&encode_message(&message)).unwrap();
        match &decoded.messages[0] {
            Message::Handler { kind, body } => {
                assert_eq!(*kind, OperationMessage::MinimapPing);
                assert_eq!(body.bit_len(), 3);
                assert_eq!(body.reader().read_bits(3).unwrap(), 0b101);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_empty_frame_decodes_to_nothing() {
        let decoded = decode_frame(&FrameBuilder::new().finish()).unwrap();
        assert!(decoded.messages.is_empty());
        assert!(decoded.error.is_none());
    }
}
