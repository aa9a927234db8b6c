//! Session identity and map settings.

use multiplay_protocol::{GameMode, SessionInfo};
use serde::{Deserialize, Serialize};

/// Most players one session can hold.
pub const MAX_PLAYERS: u8 = 32;

/// Host-chosen settings for one session.
///
/// Clients only ever see the public part of this, as a [`SessionInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub name: String,
    /// Empty means no password.
    pub password: String,
    /// Clamped to `1..=MAX_PLAYERS`.
    pub max_players: u8,
    pub map_asset_id: u64,
    pub game_mode: GameMode,
    pub duration_secs: u32,
    pub player_separation: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            name: "Multiplay session".into(),
            password: String::new(),
            max_players: 4,
            map_asset_id: 0,
            game_mode: GameMode::default(),
            duration_secs: 0,
            player_separation: false,
        }
    }
}

impl SessionSettings {
    pub fn validated(mut self) -> Self {
        self.max_players = self.max_players.clamp(1, MAX_PLAYERS);
        self
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    /// Whether `attempt` opens this session.
    pub fn password_matches(&self, attempt: &str) -> bool {
        !self.has_password() || self.password == attempt
    }

    /// The public part, without the password itself.
    pub fn to_info(&self) -> SessionInfo {
        SessionInfo {
            name: self.name.clone(),
            has_password: self.has_password(),
            max_players: self.max_players,
            map_asset_id: self.map_asset_id,
            game_mode: self.game_mode,
            duration_secs: self.duration_secs,
            player_separation: self.player_separation,
        }
    }

    /// Applies public settings received from a host. The password is not
    /// part of them and stays as it is.
    pub fn apply_info(&mut self, info: &SessionInfo) {
        self.name = info.name.clone();
        self.max_players = info.max_players;
        self.map_asset_id = info.map_asset_id;
        self.game_mode = info.game_mode;
        self.duration_secs = info.duration_secs;
        self.player_separation = info.player_separation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_clamps_max_players() {
        let zero = SessionSettings {
            max_players: 0,
            ..Default::default()
        };
        assert_eq!(zero.validated().max_players, 1);
        let huge = SessionSettings {
            max_players: 200,
            ..Default::default()
        };
        assert_eq!(huge.validated().max_players, MAX_PLAYERS);
    }

    #[test]
    fn test_password_matches_when_unset() {
        let open = SessionSettings::default();
        assert!(open.password_matches("anything"));
        let locked = SessionSettings {
            password: "hunter2".into(),
            ..Default::default()
        };
        assert!(locked.password_matches("hunter2"));
        assert!(!locked.password_matches(""));
    }

    #[test]
    fn test_to_info_hides_password() {
        let settings = SessionSettings {
            password: "secret".into(),
            max_players: 2,
            ..Default::default()
        };
        let info = settings.to_info();
        assert!(info.has_password);
        assert_eq!(info.max_players, 2);
    }

    #[test]
    fn test_settings_from_partial_json() {
        let settings: SessionSettings =
            serde_json::from_str(r#"{"name": "Harbour", "max_players": 6}"#).unwrap();
        assert_eq!(settings.name, "Harbour");
        assert_eq!(settings.max_players, 6);
        assert!(!settings.has_password());
    }
}
