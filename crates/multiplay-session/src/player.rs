//! Players and the roster.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use multiplay_protocol::messages::{PlayerInfoChange, PlayerPing, PlayerSummary};
use multiplay_protocol::{Color, PlayerIndex};

// ---------------------------------------------------------------------------
// PingStatus
// ---------------------------------------------------------------------------

/// Round-trip bookkeeping for one player's link.
///
/// A ping is outstanding between [`start`](Self::start) and the matching
/// [`acknowledge`](Self::acknowledge). New pings are only sent once the
/// previous one came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingStatus {
    pub round_trip: Option<Duration>,
    pub acknowledged: bool,
    pub last_sent: Option<Instant>,
    pub ping_id: u32,
}

impl Default for PingStatus {
    fn default() -> Self {
        Self {
            round_trip: None,
            acknowledged: true,
            last_sent: None,
            ping_id: 0,
        }
    }
}

impl PingStatus {
    pub fn start(&mut self, ping_id: u32, now: Instant) {
        self.ping_id = ping_id;
        self.last_sent = Some(now);
        self.acknowledged = false;
    }

    /// Records the answer to ping `ping_id`. Returns the measured round
    /// trip, or `None` for unexpected or duplicate answers.
    pub fn acknowledge(&mut self, ping_id: u32, now: Instant) -> Option<Duration> {
        if self.acknowledged || ping_id != self.ping_id {
            return None;
        }
        let sent = self.last_sent?;
        let round_trip = now.saturating_duration_since(sent);
        self.round_trip = Some(round_trip);
        self.acknowledged = true;
        Some(round_trip)
    }

    /// Whether the outstanding ping has gone unanswered for longer than
    /// `timeout`.
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        !self.acknowledged
            && self
                .last_sent
                .is_some_and(|sent| now.saturating_duration_since(sent) > timeout)
    }

    /// Last round trip in whole milliseconds, saturated to `u16`.
    pub fn round_trip_ms(&self) -> u16 {
        self.round_trip
            .map(|rtt| rtt.as_millis().min(u128::from(u16::MAX)) as u16)
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// PlayerInfo
// ---------------------------------------------------------------------------

/// Everything the session knows about one participant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerInfo {
    pub index: PlayerIndex,
    pub team: u8,
    pub name: String,
    pub color: Color,
    pub ready: bool,
    pub map_loaded: bool,
    pub edition: u8,
    pub map_quality: u8,
    pub user_data: Vec<u8>,
    pub highscore_submitted: bool,
    pub ping: PingStatus,
}

impl PlayerInfo {
    pub fn new(index: PlayerIndex, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            ..Default::default()
        }
    }

    /// The public row sent to clients.
    pub fn to_summary(&self) -> PlayerSummary {
        PlayerSummary {
            index: self.index,
            team: self.team,
            name: self.name.clone(),
            color: self.color,
            ready: self.ready,
            edition: self.edition,
            user_data: self.user_data.clone(),
        }
    }

    /// A roster entry as a client learns it from the host.
    pub fn from_summary(summary: &PlayerSummary) -> Self {
        Self {
            index: summary.index,
            team: summary.team,
            name: summary.name.clone(),
            color: summary.color,
            ready: summary.ready,
            edition: summary.edition,
            user_data: summary.user_data.clone(),
            ..Default::default()
        }
    }

    pub fn apply_change(&mut self, change: &PlayerInfoChange) {
        self.team = change.team;
        self.color = change.color;
        self.name.clone_from(&change.name);
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// Connected players keyed by index.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: BTreeMap<PlayerIndex, PlayerInfo>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// The index the next joiner gets.
    ///
    /// One above the highest index in use, or 0 for an empty roster, so an
    /// index is never handed out again while other players are still
    /// connected. Falls back to the lowest free index once the top of the
    /// range is reached.
    pub fn allocate_index(&self) -> Option<PlayerIndex> {
        match self.players.keys().next_back() {
            None => Some(PlayerIndex(0)),
            Some(highest) if highest.0 < u8::MAX => Some(PlayerIndex(highest.0 + 1)),
            Some(_) => (0..=u8::MAX)
                .map(PlayerIndex)
                .find(|index| !self.players.contains_key(index)),
        }
    }

    /// Inserts or replaces the entry at `player.index`.
    pub fn insert(&mut self, player: PlayerInfo) {
        self.players.insert(player.index, player);
    }

    pub fn remove(&mut self, index: PlayerIndex) -> Option<PlayerInfo> {
        self.players.remove(&index)
    }

    pub fn get(&self, index: PlayerIndex) -> Option<&PlayerInfo> {
        self.players.get(&index)
    }

    pub fn get_mut(&mut self, index: PlayerIndex) -> Option<&mut PlayerInfo> {
        self.players.get_mut(&index)
    }

    pub fn contains(&self, index: PlayerIndex) -> bool {
        self.players.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerInfo> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerInfo> {
        self.players.values_mut()
    }

    pub fn indices(&self) -> Vec<PlayerIndex> {
        self.players.keys().copied().collect()
    }

    /// `true` for a non-empty roster where everyone is ready.
    pub fn all_ready(&self) -> bool {
        !self.is_empty() && self.iter().all(|p| p.ready)
    }

    pub fn all_map_loaded(&self) -> bool {
        !self.is_empty() && self.iter().all(|p| p.map_loaded)
    }

    pub fn all_highscores_submitted(&self) -> bool {
        !self.is_empty() && self.iter().all(|p| p.highscore_submitted)
    }

    pub fn summaries(&self) -> Vec<PlayerSummary> {
        self.iter().map(PlayerInfo::to_summary).collect()
    }

    pub fn pings(&self) -> Vec<PlayerPing> {
        self.iter()
            .map(|p| PlayerPing {
                index: p.index,
                rtt_ms: p.ping.round_trip_ms(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_with(indices: &[u8]) -> Roster {
        let mut roster = Roster::new();
        for i in indices {
            roster.insert(PlayerInfo::new(PlayerIndex(*i), format!("p{i}")));
        }
        roster
    }

    #[test]
    fn test_allocate_index_empty_roster_is_zero() {
        assert_eq!(Roster::new().allocate_index(), Some(PlayerIndex(0)));
    }

    #[test]
    fn test_allocate_index_never_reuses_while_others_present() {
        let mut roster = roster_with(&[0, 1]);
        roster.remove(PlayerIndex(0));
        assert_eq!(roster.allocate_index(), Some(PlayerIndex(2)));
    }

    #[test]
    fn test_allocate_index_resets_after_roster_empties() {
        let mut roster = roster_with(&[4]);
        roster.remove(PlayerIndex(4));
        assert_eq!(roster.allocate_index(), Some(PlayerIndex(0)));
    }

    #[test]
    fn test_allocate_index_wraps_to_lowest_free() {
        let roster = roster_with(&[0, 255]);
        assert_eq!(roster.allocate_index(), Some(PlayerIndex(1)));
    }

    #[test]
    fn test_all_ready_requires_players() {
        let mut roster = Roster::new();
        assert!(!roster.all_ready());
        roster.insert(PlayerInfo::new(PlayerIndex(0), "a"));
        assert!(!roster.all_ready());
        roster.get_mut(PlayerIndex(0)).unwrap().ready = true;
        assert!(roster.all_ready());
    }

    #[test]
    fn test_ping_round_trip() {
        let start = Instant::now();
        let mut ping = PingStatus::default();
        ping.start(7, start);
        assert!(!ping.acknowledged);
        assert_eq!(ping.acknowledge(6, start + Duration::from_millis(5)), None);
        assert_eq!(
            ping.acknowledge(7, start + Duration::from_millis(40)),
            Some(Duration::from_millis(40))
        );
        assert_eq!(ping.round_trip_ms(), 40);
        assert_eq!(ping.acknowledge(7, start + Duration::from_millis(50)), None);
    }

    #[test]
    fn test_ping_timeout() {
        let start = Instant::now();
        let mut ping = PingStatus::default();
        assert!(!ping.is_timed_out(start + Duration::from_secs(60), Duration::from_secs(5)));
        ping.start(1, start);
        assert!(!ping.is_timed_out(start + Duration::from_secs(5), Duration::from_secs(5)));
        assert!(ping.is_timed_out(start + Duration::from_secs(6), Duration::from_secs(5)));
    }

    #[test]
    fn test_summary_round_trip_keeps_public_fields() {
        let mut player = PlayerInfo::new(PlayerIndex(3), "Ada");
        player.team = 1;
        player.ready = true;
        player.map_loaded = true;
        let back = PlayerInfo::from_summary(&player.to_summary());
        assert_eq!(back.name, "Ada");
        assert!(back.ready);
        assert!(!back.map_loaded);
    }
}
