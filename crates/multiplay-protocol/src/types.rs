//! Core value types that travel on the wire.
//!
//! Identity types are newtype wrappers so a `PlayerIndex` can never be
//! passed where an `EntityId` is expected, even though both are small
//! integers underneath.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bitstream::{BitReader, BitWriter};
use crate::wire::WireFormat;
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Small stable integer the host assigns to each participant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PlayerIndex(pub u8);

impl fmt::Display for PlayerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl WireFormat for PlayerIndex {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u8(self.0);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self(reader.read_u8()?))
    }
}

/// Stable identifier of a simulation entity.
///
/// Cache records and history entries refer to entities only through this
/// id; looking up a destroyed entity yields "not found", never a dangling
/// reference.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl WireFormat for EntityId {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_var_u32(self.0);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self(reader.read_var_u32()?))
    }
}

/// Identifier of a synchronised component type. Id 0 is the core
/// transform data set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ComponentId(pub u16);

impl ComponentId {
    /// The always-tracked core data set.
    pub const CORE: ComponentId = ComponentId(0);
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

impl WireFormat for ComponentId {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u16(self.0);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self(reader.read_u16()?))
    }
}

/// Simulation tick counter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Tick(pub u32);

impl Tick {
    pub fn next(self) -> Tick {
        Tick(self.0.wrapping_add(1))
    }

    /// Ticks elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn since(self, earlier: Tick) -> u32 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn saturating_sub(self, ticks: u32) -> Tick {
        Tick(self.0.saturating_sub(ticks))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl WireFormat for Tick {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.0);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self(reader.read_u32()?))
    }
}

/// Game mode identifier. The meaning of each value belongs to the
/// simulation; the session layer only carries it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GameMode(pub u8);

impl WireFormat for GameMode {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u8(self.0);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self(reader.read_u8()?))
    }
}

/// Packed RGBA player colour.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Color(pub u32);

impl WireFormat for Color {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.0);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self(reader.read_u32()?))
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl WireFormat for Vec3 {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_f32(self.x);
        writer.write_f32(self.y);
        writer.write_f32(self.z);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            z: reader.read_f32()?,
        })
    }
}

/// Position and heading of an entity: the core synchronised data set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    /// Heading around the vertical axis, radians.
    pub yaw: f32,
}

impl Transform {
    pub const fn new(position: Vec3, yaw: f32) -> Self {
        Self { position, yaw }
    }
}

impl WireFormat for Transform {
    fn write(&self, writer: &mut BitWriter) {
        self.position.write(writer);
        writer.write_f32(self.yaw);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            position: Vec3::read(reader)?,
            yaw: reader.read_f32()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Session-level values
// ---------------------------------------------------------------------------

/// Outcome of a join request.
///
/// The numeric values are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum JoinResponse {
    Success = 0,
    BadPassword = 1,
    IncompatibleGameModifications = 2,
    ContentAuthenticationFailed = 3,
    SessionFull = 4,
    GameInProgress = 5,
}

impl JoinResponse {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Success,
            1 => Self::BadPassword,
            2 => Self::IncompatibleGameModifications,
            3 => Self::ContentAuthenticationFailed,
            4 => Self::SessionFull,
            5 => Self::GameInProgress,
            _ => return None,
        })
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for JoinResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "JOIN_SUCCESS",
            Self::BadPassword => "JOIN_BAD_PASSWORD",
            Self::IncompatibleGameModifications => {
                "JOIN_INCOMPATIBLE_GAME_MODIFICATIONS"
            }
            Self::ContentAuthenticationFailed => {
                "JOIN_CONTENT_AUTHENTICATION_FAILED"
            }
            Self::SessionFull => "JOIN_SESSION_FULL",
            Self::GameInProgress => "JOIN_GAME_IN_PROGRESS",
        };
        f.write_str(text)
    }
}

impl WireFormat for JoinResponse {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u8(*self as u8);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let raw = reader.read_u8()?;
        Self::from_u8(raw).ok_or_else(|| {
            ProtocolError::InvalidValue(format!("join response {raw}"))
        })
    }
}

/// Why a player left the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LeaveReason {
    /// Closed the link cleanly.
    Left = 0,
    /// The link broke.
    Disconnected = 1,
    /// Removed by the host.
    Kicked = 2,
    /// Stopped answering pings.
    TimedOut = 3,
}

impl WireFormat for LeaveReason {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_bits(*self as u32, 2);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(match reader.read_bits(2)? {
            0 => Self::Left,
            1 => Self::Disconnected,
            2 => Self::Kicked,
            _ => Self::TimedOut,
        })
    }
}

/// Name and checksum of one authenticated content package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentChecksum {
    pub name: String,
    pub checksum: u32,
}

impl ContentChecksum {
    pub fn new(name: impl Into<String>, checksum: u32) -> Self {
        Self {
            name: name.into(),
            checksum,
        }
    }
}

impl WireFormat for ContentChecksum {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_string(&self.name);
        writer.write_u32(self.checksum);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: reader.read_string()?,
            checksum: reader.read_u32()?,
        })
    }
}

/// The public view of a session's configuration. The password itself
/// never travels; only whether one is set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub has_password: bool,
    pub max_players: u8,
    pub map_asset_id: u64,
    pub game_mode: GameMode,
    pub duration_secs: u32,
    pub player_separation: bool,
}

impl WireFormat for SessionInfo {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_string(&self.name);
        writer.write_bool(self.has_password);
        writer.write_u8(self.max_players);
        writer.write_u64(self.map_asset_id);
        self.game_mode.write(writer);
        writer.write_u32(self.duration_secs);
        writer.write_bool(self.player_separation);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: reader.read_string()?,
            has_password: reader.read_bool()?,
            max_players: reader.read_u8()?,
            map_asset_id: reader.read_u64()?,
            game_mode: GameMode::read(reader)?,
            duration_secs: reader.read_u32()?,
            player_separation: reader.read_bool()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Where to reach a host that sits behind a relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub session_id: u32,
    pub host: String,
    pub port: u16,
}

impl WireFormat for ProxyEndpoint {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_u32(self.session_id);
        writer.write_string(&self.host);
        writer.write_u16(self.port);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            session_id: reader.read_u32()?,
            host: reader.read_string()?,
            port: reader.read_u16()?,
        })
    }
}

/// Session discovery record. A plain value, copied freely.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostEntry {
    pub session_name: String,
    pub has_password: bool,
    pub player_count: u8,
    pub max_players: u8,
    pub map_asset_id: u64,
    pub game_mode: GameMode,
    pub duration_secs: u32,
    pub player_separation: bool,
    pub proxy: Option<ProxyEndpoint>,
    pub address: String,
    pub port: u16,
}

impl HostEntry {
    /// Whether another player could still join.
    pub fn has_free_slot(&self) -> bool {
        self.player_count < self.max_players
    }
}

impl WireFormat for HostEntry {
    fn write(&self, writer: &mut BitWriter) {
        writer.write_string(&self.session_name);
        writer.write_bool(self.has_password);
        writer.write_u8(self.player_count);
        writer.write_u8(self.max_players);
        writer.write_u64(self.map_asset_id);
        self.game_mode.write(writer);
        writer.write_u32(self.duration_secs);
        writer.write_bool(self.player_separation);
        self.proxy.write(writer);
        writer.write_string(&self.address);
        writer.write_u16(self.port);
    }
    fn read(reader: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            session_name: reader.read_string()?,
            has_password: reader.read_bool()?,
            player_count: reader.read_u8()?,
            max_players: reader.read_u8()?,
            map_asset_id: reader.read_u64()?,
            game_mode: GameMode::read(reader)?,
            duration_secs: reader.read_u32()?,
            player_separation: reader.read_bool()?,
            proxy: Option::<ProxyEndpoint>::read(reader)?,
            address: reader.read_string()?,
            port: reader.read_u16()?,
        })
    }
}
