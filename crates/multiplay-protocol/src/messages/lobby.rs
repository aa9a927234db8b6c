//! Pre-game, roster, chat, and post-game payloads.

use crate::bitstream::{BitReader, BitWriter};
use crate::types::{
    Color, ContentChecksum, GameMode, JoinResponse, LeaveReason, PlayerIndex,
    SessionInfo, Tick,
};
use crate::wire::WireFormat;
use crate::ProtocolError;

/// `CLIENT_JOIN_REQUEST`: everything the host needs to validate a join.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinRequest {
    /// Display name the player asked for.
    pub player_name: String,
    /// Empty when the session has none.
    pub password: String,
    /// Game edition of the joining build.
    pub edition: u8,
    /// Map detail level the client runs at.
    pub map_quality: u8,
    /// Installed modifications; compared with the host's as a set.
    pub game_modifications: Vec<String>,
    /// Checksums of the client's content packages.
    pub content_checksums: Vec<ContentChecksum>,
    /// Opaque bytes handed through to the other players.
    pub user_data: Vec<u8>,
}

impl WireFormat for JoinRequest {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_string(&self.player_name);
        writer.write_string(&self.password);
        writer.write_u8(self.edition);
        writer.write_u8(self.map_quality);
        self.game_modifications.write(writer);
        self.content_checksums.write(writer);
        self.user_data.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            player_name: reader.read_string()?,
            password: reader.read_string()?,
            edition: reader.read_u8()?,
            map_quality: reader.read_u8()?,
            game_modifications: Vec::read(reader)?,
            content_checksums: Vec::read(reader)?,
            user_data: Vec::read(reader)?,
        })
    }
}

/// One roster row as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerSummary {
    /// Roster slot.
    pub index: PlayerIndex,
    /// Team number, 0 when teams are off.
    pub team: u8,
    /// Display name.
    pub name: String,
    /// Marker color on the map and in chat.
    pub color: Color,
    /// Set once the player pressed ready in the lobby.
    pub ready: bool,
    /// Game edition the player joined with.
    pub edition: u8,
    /// Opaque bytes set by the player.
    pub user_data: Vec<u8>,
}

impl WireFormat for PlayerSummary {
    fn write(&self, writer: &mut BitWriter) {
        self.index.write(writer);
        writer.write_u8(self.team);
        writer.write_string(&self.name);
        self.color.write(writer);
        writer.write_bool(self.ready);
        writer.write_u8(self.edition);
        self.user_data.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            index: PlayerIndex::read(reader)?,
            team: reader.read_u8()?,
            name: reader.read_string()?,
            color: Color::read(reader)?,
            ready: reader.read_bool()?,
            edition: reader.read_u8()?,
            user_data: Vec::read(reader)?,
        })
    }
}

/// `SERVER_JOIN_RESPONSE`. On success it carries the assigned index, the
/// public session info, and the current roster (including the joiner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResult {
    /// Outcome of the join.
    pub response: JoinResponse,
    /// Present only for [`JoinResponse::Success`].
    pub accepted: Option<JoinAccepted>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAccepted {
    /// Slot assigned to the joining player.
    pub player_index: PlayerIndex,
    /// Session name, limits and settings.
    pub session: SessionInfo,
    /// Everyone already in the session, the new player included.
    pub roster: Vec<PlayerSummary>,
}

impl JoinResult {
    pub fn rejected(response: JoinResponse) -> Self {
        Self {
            response,
            accepted: None,
        }
    }
}

impl WireFormat for JoinResult {
    fn write(&self, writer: &mut BitWriter) {
        self.response.write(writer);
        writer.write_bool(self.accepted.is_some());
        if let Some(accepted) = &self.accepted {
            accepted.player_index.write(writer);
            accepted.session.write(writer);
            accepted.roster.write(writer);
        }
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let response = JoinResponse::read(reader)?;
        let accepted = if reader.read_bool()? {
            Some(JoinAccepted {
                player_index: PlayerIndex::read(reader)?,
                session: SessionInfo::read(reader)?,
                roster: Vec::read(reader)?,
            })
        } else {
            None
        };
        if response.is_success() != accepted.is_some() {
            return Err(ProtocolError::InvalidValue(
                "join result body does not match response".into(),
            ));
        }
        Ok(Self { response, accepted })
    }
}

/// `SERVER_PLAYER_LEFT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerLeft {
    /// Slot that is now free.
    pub index: PlayerIndex,
    /// Why the player is gone.
    pub reason: LeaveReason,
}

impl WireFormat for PlayerLeft {
    fn write(&self, writer: &mut BitWriter) {
        self.index.write(writer);
        self.reason.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            index: PlayerIndex::read(reader)?,
            reason: LeaveReason::read(reader)?,
        })
    }
}

/// `SERVER_PLAYER_KICKED`, sent only to the kicked player.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Kicked {
    /// Free text shown to the kicked player.
    pub reason: String,
}

impl WireFormat for Kicked {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_string(&self.reason);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            reason: reader.read_string()?,
        })
    }
}

/// `SERVER_READY_STATE_CHANGED`. The client variant carries a bare bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerReady {
    /// Player whose flag changed.
    pub index: PlayerIndex,
    /// New ready flag.
    pub ready: bool,
}

impl WireFormat for PlayerReady {
    fn write(&self, writer: &mut BitWriter) {
        self.index.write(writer);
        writer.write_bool(self.ready);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            index: PlayerIndex::read(reader)?,
            ready: reader.read_bool()?,
        })
    }
}

/// `SERVER_USER_DATA_CHANGED`. The client variant carries bare bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerUserData {
    /// Owner of the data.
    pub index: PlayerIndex,
    /// Replaces the previous bytes.
    pub data: Vec<u8>,
}

impl WireFormat for PlayerUserData {
    fn write(&self, writer: &mut BitWriter) {
        self.index.write(writer);
        self.data.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            index: PlayerIndex::read(reader)?,
            data: Vec::read(reader)?,
        })
    }
}

/// `CLIENT_PLAYER_INFO_CHANGED`: a player asks for a new team, colour, or
/// display name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerInfoChange {
    /// Requested team.
    pub team: u8,
    /// Requested color.
    pub color: Color,
    /// Requested display name.
    pub name: String,
}

impl WireFormat for PlayerInfoChange {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u8(self.team);
        self.color.write(writer);
        writer.write_string(&self.name);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            team: reader.read_u8()?,
            color: Color::read(reader)?,
            name: reader.read_string()?,
        })
    }
}

/// `SERVER_PLAYER_INFO_CHANGED`: the host confirms a change to everyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfoUpdate {
    /// Player the change applies to.
    pub index: PlayerIndex,
    /// Values the host accepted.
    pub change: PlayerInfoChange,
}

impl WireFormat for PlayerInfoUpdate {
    fn write(&self, writer: &mut BitWriter) {
        self.index.write(writer);
        self.change.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            index: PlayerIndex::read(reader)?,
            change: PlayerInfoChange::read(reader)?,
        })
    }
}

/// `SERVER_LOAD_MAP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadMap {
    /// Content id of the map to load.
    pub map_asset_id: u64,
    /// Rules the round is played with.
    pub game_mode: GameMode,
    /// Round length, 0 for unlimited.
    pub duration_secs: u32,
    /// Keep players from seeing each other's units.
    pub player_separation: bool,
    /// Seed every peer uses for map generation.
    pub random_seed: u32,
}

impl WireFormat for LoadMap {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u64(self.map_asset_id);
        self.game_mode.write(writer);
        writer.write_u32(self.duration_secs);
        writer.write_bool(self.player_separation);
        writer.write_u32(self.random_seed);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            map_asset_id: reader.read_u64()?,
            game_mode: GameMode::read(reader)?,
            duration_secs: reader.read_u32()?,
            player_separation: reader.read_bool()?,
            random_seed: reader.read_u32()?,
        })
    }
}

/// `SERVER_GAME_START`: the tick the host simulation starts counting from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameStart {
    /// First tick the host will simulate.
    pub start_tick: Tick,
}

impl WireFormat for GameStart {
    fn write(&self, writer: &mut BitWriter) {
        self.start_tick.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            start_tick: Tick::read(reader)?,
        })
    }
}

/// `CHAT_MESSAGE`. `sender` is `None` for messages from the host itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatLine {
    /// `None` for messages from the host itself.
    pub sender: Option<PlayerIndex>,
    /// Message body.
    pub text: String,
}

impl WireFormat for ChatLine {
    fn write(&self, writer: &mut BitWriter) {
        self.sender.write(writer);
        writer.write_string(&self.text);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            sender: Option::read(reader)?,
            text: reader.read_string()?,
        })
    }
}

/// `SERVER_GAME_END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameEnd {
    /// `None` when the round ended without a winner.
    pub winning_team: Option<u8>,
    /// Last simulated tick.
    pub final_tick: Tick,
}

impl WireFormat for GameEnd {
    fn write(&self, writer: &mut BitWriter) {
        self.winning_team.write(writer);
        self.final_tick.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            winning_team: Option::read(reader)?,
            final_tick: Tick::read(reader)?,
        })
    }
}

/// `HIGHSCORE_SUBMIT_REQUEST`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HighscoreSubmission {
    /// Final score of the submitting player.
    pub score: i32,
    /// Name entered for the highscore table.
    pub display_name: String,
}

impl WireFormat for HighscoreSubmission {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_i32(self.score);
        writer.write_string(&self.display_name);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            score: reader.read_i32()?,
            display_name: reader.read_string()?,
        })
    }
}

/// `HIGHSCORE_SUBMIT_RESULT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HighscoreResult {
    /// False if the player already submitted or the game is not in post game.
    pub accepted: bool,
    /// One-based place among accepted scores.
    pub rank: Option<u16>,
}

impl WireFormat for HighscoreResult {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_bool(self.accepted);
        self.rank.write(writer);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            accepted: reader.read_bool()?,
            rank: Option::read(reader)?,
        })
    }
}
