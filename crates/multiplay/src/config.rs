//! Host and client configuration.

use std::time::Duration;

use multiplay_cache::{DEFAULT_FLOAT_EPSILON, DEFAULT_REMOVED_HISTORY, HistoryConfig};
use multiplay_protocol::ContentChecksum;
use multiplay_session::{DEFAULT_CHAT_CAPACITY, SessionSettings};
use multiplay_tick::TickConfig;
use serde::{Deserialize, Serialize};

use crate::MultiplayError;

// ---------------------------------------------------------------------------
// RelayAddress
// ---------------------------------------------------------------------------

/// Where a relay server listens. Advertised in the host entry so clients
/// can reach a proxied session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayAddress {
    pub host: String,
    pub port: u16,
}

// ---------------------------------------------------------------------------
// HostConfig
// ---------------------------------------------------------------------------

/// Configuration of a hosted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub session: SessionSettings,
    pub tick: TickConfig,

    /// How often `SERVER_PING` goes out to every player.
    pub ping_interval: Duration,

    /// Players that leave a ping unanswered for this long are dropped.
    pub ping_timeout: Duration,

    /// Remove a player's units from the map when they leave mid-game.
    pub remove_units_on_leave: bool,

    /// Load the map as soon as every player is ready.
    pub auto_load_when_ready: bool,

    /// Game modifications a client must run, compared as a set.
    pub required_modifications: Vec<String>,

    /// Content checksums a client must present unchanged.
    pub required_checksums: Vec<ContentChecksum>,

    pub chat_capacity: usize,

    /// Recently removed entities remembered by the cache.
    pub removed_entity_history: usize,

    /// Float fields closer than this count as unchanged.
    pub float_epsilon: f32,

    /// Set when the session is hosted through a relay.
    pub proxy_relay: Option<RelayAddress>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            tick: TickConfig::default(),
            ping_interval: Duration::from_secs(1),
            ping_timeout: Duration::from_secs(10),
            remove_units_on_leave: true,
            auto_load_when_ready: false,
            required_modifications: Vec::new(),
            required_checksums: Vec::new(),
            chat_capacity: DEFAULT_CHAT_CAPACITY,
            removed_entity_history: DEFAULT_REMOVED_HISTORY,
            float_epsilon: DEFAULT_FLOAT_EPSILON,
            proxy_relay: None,
        }
    }
}

impl HostConfig {
    /// Clamps every field into its usable range.
    pub fn validated(mut self) -> Self {
        self.session = self.session.validated();
        self.tick = self.tick.validated();
        self.ping_interval = self.ping_interval.max(Duration::from_millis(10));
        if self.ping_timeout < self.ping_interval {
            tracing::warn!(
                timeout_ms = self.ping_timeout.as_millis() as u64,
                interval_ms = self.ping_interval.as_millis() as u64,
                "ping timeout shorter than ping interval, raising it"
            );
            self.ping_timeout = self.ping_interval * 2;
        }
        self.chat_capacity = self.chat_capacity.max(1);
        self.removed_entity_history = self.removed_entity_history.max(1);
        self.float_epsilon = self.float_epsilon.max(0.0);
        self
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, MultiplayError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Configuration of a joining client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub player_name: String,
    pub password: String,
    pub edition: u8,
    pub map_quality: u8,
    pub game_modifications: Vec<String>,
    pub content_checksums: Vec<ContentChecksum>,
    pub user_data: Vec<u8>,
    pub tick: TickConfig,

    /// Ticks the local clock trails the newest tick it synchronised to.
    pub interpolation_delay: u32,

    pub history: HistoryConfig,

    /// Wait before the single reconnect attempt after a relay link broke.
    pub reconnect_delay: Duration,

    pub chat_capacity: usize,
    pub removed_entity_history: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            player_name: "Player".into(),
            password: String::new(),
            edition: 0,
            map_quality: 0,
            game_modifications: Vec::new(),
            content_checksums: Vec::new(),
            user_data: Vec::new(),
            tick: TickConfig::default(),
            interpolation_delay: 2,
            history: HistoryConfig::default(),
            reconnect_delay: Duration::from_secs(2),
            chat_capacity: DEFAULT_CHAT_CAPACITY,
            removed_entity_history: DEFAULT_REMOVED_HISTORY,
        }
    }
}

impl ClientConfig {
    pub fn validated(mut self) -> Self {
        self.tick = self.tick.validated();
        self.history = self.history.validated();
        if self.interpolation_delay >= self.history.retention_ticks {
            tracing::warn!(
                delay = self.interpolation_delay,
                retention = self.history.retention_ticks,
                "interpolation delay exceeds the history window, clamping"
            );
            self.interpolation_delay = self.history.retention_ticks.saturating_sub(1);
        }
        self.chat_capacity = self.chat_capacity.max(1);
        self.removed_entity_history = self.removed_entity_history.max(1);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, MultiplayError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_config_from_partial_json() {
        let config = HostConfig::from_json(
            r#"{"session": {"name": "Harbor", "max_players": 2}, "auto_load_when_ready": true}"#,
        )
        .unwrap();
        assert_eq!(config.session.name, "Harbor");
        assert_eq!(config.session.max_players, 2);
        assert!(config.auto_load_when_ready);
        assert_eq!(config.ping_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_host_config_raises_short_ping_timeout() {
        let config = HostConfig {
            ping_interval: Duration::from_secs(2),
            ping_timeout: Duration::from_millis(500),
            ..Default::default()
        }
        .validated();
        assert_eq!(config.ping_timeout, Duration::from_secs(4));
    }

    #[test]
    fn test_client_config_clamps_interpolation_delay() {
        let config = ClientConfig {
            interpolation_delay: 100,
            history: HistoryConfig {
                retention_ticks: 8,
                max_entries: 16,
            },
            ..Default::default()
        }
        .validated();
        assert_eq!(config.interpolation_delay, 7);
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.interpolation_delay, 2);
        assert_eq!(config.history.retention_ticks, 32);
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_client_config_rejects_bad_json() {
        assert!(matches!(
            ClientConfig::from_json("{\"edition\": \"x\"}"),
            Err(MultiplayError::Config(_))
        ));
    }
}
