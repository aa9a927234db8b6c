//! Payload bodies for every operation message, grouped by category.

pub mod command;
pub mod liveness;
pub mod lobby;
pub mod tick;

pub use command::{Command, CommandResult, UnitOrder, UnitOrderResult};
pub use liveness::{Ping, PlayerPing};
pub use lobby::{
    ChatLine, GameEnd, GameStart, HighscoreResult, HighscoreSubmission, JoinAccepted,
    JoinRequest, JoinResult, Kicked, LoadMap, PlayerInfoChange, PlayerInfoUpdate,
    PlayerLeft, PlayerReady, PlayerSummary, PlayerUserData,
};
pub use tick::{
    AudioCue, Countdown, DataUpdatePayload, EntityCreation, EntityFade, FireHose,
    FreeplayEventDelta, HintMessage, LayerChange, MinimapMarker, MinimapPingMark,
    ParticleEffect, ScoreDelta, TickBatch, UnitSpawn,
};
