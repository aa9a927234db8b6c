//! The hosting role.
//!
//! A [`Host`] owns the authoritative session: it accepts links, validates
//! joins, drives the lobby through loading into the game, and once per
//! tick gathers every change into one frame for all players.
//!
//! Nothing here runs on its own. The application calls
//! [`Host::update`] from its loop (or uses [`Host::run`]); all link events
//! are drained and all jobs run inside that call.

use std::collections::BTreeMap;
use std::time::Instant;

use multiplay_cache::{ComponentRegistry, HostMapCache, UpdateStatistics};
use multiplay_protocol::messages::{
    ChatLine, CommandResult, DataUpdatePayload, EntityFade, GameEnd, GameStart, HighscoreResult,
    HighscoreSubmission, JoinAccepted, JoinRequest, JoinResult, Kicked, LoadMap, Ping,
    PlayerInfoChange, PlayerInfoUpdate, PlayerLeft, PlayerReady, PlayerUserData, TickBatch,
    UnitOrderResult,
};
use multiplay_protocol::{
    ContentChecksum, EntityId, FrameBuilder, HostEntry, JoinResponse, LeaveReason, Message,
    PlayerIndex, ProxyEndpoint, Tick, decode_frame, encode_message,
};
use multiplay_session::{
    EntityFadeHandler, PlayerInfo, SessionBase, SessionError, SessionEvent, SessionRole,
    SessionSettings, SessionState,
};
use multiplay_tick::{JobScheduler, TickDriver};
use multiplay_transport::{Acceptor, AcceptorEvent, ClientConnection, ConnectionId, LinkEvent};
use rand::Rng;
use tracing::{debug, info, trace, warn};

use crate::config::HostConfig;
use crate::factory::ListenTarget;
use crate::simulation::{HostSimulation, TickOutbox};
use crate::MultiplayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostJob {
    Gather,
    Ping,
}

/// One accepted link. `player` is set once its join was accepted.
struct PlayerLink {
    conn: Box<dyn ClientConnection>,
    player: Option<PlayerIndex>,
}

/// The authoritative side of a session.
pub struct Host {
    config: HostConfig,
    session: SessionBase,
    acceptor: Option<Box<dyn Acceptor>>,
    links: BTreeMap<ConnectionId, PlayerLink>,
    players: BTreeMap<PlayerIndex, ConnectionId>,
    cache: HostMapCache,
    outbox: TickOutbox,
    jobs: JobScheduler<HostJob>,
    jobs_started: bool,
    tick: Tick,
    next_ping_id: u32,
    highscores: BTreeMap<PlayerIndex, i32>,
    departed: Vec<PlayerIndex>,
    proxy_session: Option<u32>,
}

impl Host {
    /// Creates the session and enters the lobby. Joins are accepted from
    /// the first [`update`](Self::update) on.
    pub fn new(
        config: HostConfig,
        registry: ComponentRegistry,
        acceptor: Box<dyn Acceptor>,
    ) -> Result<Self, MultiplayError> {
        let config = config.validated();
        let mut session = SessionBase::new(config.session.clone(), config.chat_capacity);
        session.transition(SessionState::Lobby)?;
        let registry = registry.with_float_epsilon(config.float_epsilon);
        info!(
            name = %config.session.name,
            max_players = config.session.max_players,
            tick_rate_hz = config.tick.tick_rate_hz,
            "session created"
        );
        Ok(Self {
            cache: HostMapCache::new(registry, config.removed_entity_history),
            jobs: JobScheduler::new(config.tick.policy),
            config,
            session,
            acceptor: Some(acceptor),
            links: BTreeMap::new(),
            players: BTreeMap::new(),
            outbox: TickOutbox::new(),
            jobs_started: false,
            tick: Tick::default(),
            next_ping_id: 0,
            highscores: BTreeMap::new(),
            departed: Vec::new(),
            proxy_session: None,
        })
    }

    /// Opens `target` and creates the session on it.
    pub async fn listen(
        config: HostConfig,
        registry: ComponentRegistry,
        target: ListenTarget,
    ) -> Result<Self, MultiplayError> {
        let acceptor = target.open().await?;
        Self::new(config, registry, acceptor)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The last gathered tick. Zero until the game starts.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn player_count(&self) -> usize {
        self.session.roster().len()
    }

    pub fn all_players_ready(&self) -> bool {
        self.session.roster().all_ready()
    }

    /// Relay session id once the relay confirmed it.
    pub fn proxy_session_id(&self) -> Option<u32> {
        self.proxy_session
    }

    pub fn statistics(&self) -> &UpdateStatistics {
        self.cache.statistics()
    }

    pub fn cache(&self) -> &HostMapCache {
        &self.cache
    }

    /// Changes for the next gathered tick. The simulation receives the
    /// same outbox in [`HostSimulation::advance`].
    pub fn outbox_mut(&mut self) -> &mut TickOutbox {
        &mut self.outbox
    }

    pub fn fade_entity(&mut self, fade: EntityFade) {
        self.outbox.fade_entity(fade);
    }

    /// The current listing for a matchmaking server.
    pub fn host_entry(&self, address: &str, port: u16) -> HostEntry {
        let settings = self.session.settings();
        let proxy = match (self.proxy_session, &self.config.proxy_relay) {
            (Some(session_id), Some(relay)) => Some(ProxyEndpoint {
                session_id,
                host: relay.host.clone(),
                port: relay.port,
            }),
            _ => None,
        };
        HostEntry {
            session_name: settings.name.clone(),
            has_password: settings.has_password(),
            player_count: u8::try_from(self.player_count()).unwrap_or(u8::MAX),
            max_players: settings.max_players,
            map_asset_id: settings.map_asset_id,
            game_mode: settings.game_mode,
            duration_secs: settings.duration_secs,
            player_separation: settings.player_separation,
            proxy,
            address: address.to_owned(),
            port,
        }
    }

    // -----------------------------------------------------------------------
    // Update loop
    // -----------------------------------------------------------------------

    /// Drains links and runs every job due at `now`.
    pub fn update<S: HostSimulation>(&mut self, now: Instant, sim: &mut S) {
        if !self.session.state().is_active() {
            return;
        }
        if !self.jobs_started {
            self.jobs
                .schedule_periodic(HostJob::Gather, now, self.config.tick.tick_duration());
            self.jobs.schedule_periodic(
                HostJob::Ping,
                now + self.config.ping_interval,
                self.config.ping_interval,
            );
            self.jobs_started = true;
        }

        self.poll_acceptor();
        self.poll_links(now, sim);
        self.remove_departed_units(sim);

        for job in self.jobs.due(now) {
            if !self.session.state().is_active() {
                break;
            }
            match job {
                HostJob::Gather => self.gather(sim),
                HostJob::Ping => self.ping_round(now),
            }
        }
        self.flush();
    }

    /// Calls [`update`](Self::update) at the configured tick rate until the
    /// session is closed.
    pub async fn run<S: HostSimulation>(&mut self, sim: &mut S) {
        let mut driver = TickDriver::new(self.config.tick.clone());
        info!(rate_hz = self.config.tick.tick_rate_hz, "host running");
        while self.session.state().is_active() {
            let info = driver.wait_for_tick().await;
            self.update(info.now, sim);
            driver.record_tick_end();
        }
    }

    fn flush(&mut self) {
        if let Some(acceptor) = self.acceptor.as_mut() {
            acceptor.flush();
        }
    }

    fn poll_acceptor(&mut self) {
        let Some(acceptor) = self.acceptor.as_mut() else {
            return;
        };
        let mut statuses = Vec::new();
        while let Some(status) = acceptor.poll_status() {
            statuses.push(status);
        }
        let mut accepted = Vec::new();
        while let Some(conn) = acceptor.poll_accept() {
            accepted.push(conn);
        }

        for status in statuses {
            match status {
                AcceptorEvent::Ready {
                    session_id: Some(session_id),
                } => {
                    info!(session_id, "relay session ready");
                    self.proxy_session = Some(session_id);
                    self.session
                        .emit(SessionEvent::ProxySessionCreated { session_id });
                }
                AcceptorEvent::Ready { session_id: None } => debug!("acceptor ready"),
                AcceptorEvent::Lost(reason) => self.lose_acceptor(reason),
            }
        }
        for conn in accepted {
            debug!(id = %conn.id(), "link accepted");
            self.links
                .insert(conn.id(), PlayerLink { conn, player: None });
        }
    }

    /// The relay went away and took every proxied player with it.
    fn lose_acceptor(&mut self, reason: String) {
        warn!(%reason, players = self.players.len(), "lost connection to relay");
        self.proxy_session = None;
        self.session
            .emit(SessionEvent::LostConnectionToProxy(reason));
        let ids: Vec<ConnectionId> = self.links.keys().copied().collect();
        for id in ids {
            self.drop_link(id, LeaveReason::Disconnected);
        }
    }

    fn poll_links<S: HostSimulation>(&mut self, now: Instant, sim: &mut S) {
        let mut events = Vec::new();
        for (id, link) in &mut self.links {
            while let Some(event) = link.conn.poll_event() {
                let terminal = event.is_terminal();
                events.push((*id, event));
                if terminal {
                    break;
                }
            }
        }

        for (id, event) in events {
            match event {
                LinkEvent::Data(bytes) => self.handle_frame(id, &bytes, now, sim),
                LinkEvent::Connected => {}
                LinkEvent::Closed => self.drop_link(id, LeaveReason::Left),
                LinkEvent::ConnectFailed(reason) | LinkEvent::ConnectionLost(reason) => {
                    debug!(%id, %reason, "link lost");
                    self.drop_link(id, LeaveReason::Disconnected);
                }
            }
        }
    }

    fn handle_frame<S: HostSimulation>(
        &mut self,
        id: ConnectionId,
        bytes: &[u8],
        now: Instant,
        sim: &mut S,
    ) {
        let decoded = match decode_frame(bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(%id, error = %e, "dropping malformed frame");
                return;
            }
        };
        if let Some(e) = &decoded.error {
            warn!(%id, error = %e, kept = decoded.messages.len(), "frame cut short");
        }
        for message in decoded.messages {
            let Some(joined) = self.links.get(&id).map(|link| link.player) else {
                break;
            };
            if let Message::JoinRequest(request) = message {
                match joined {
                    None => self.handle_join(id, request),
                    Some(player) => warn!(%player, "duplicate join request ignored"),
                }
                continue;
            }
            let Some(player) = joined else {
                warn!(%id, kind = %message.kind(), "message from a link that has not joined");
                continue;
            };
            self.handle_player_message(player, message, now, sim);
        }
    }

    fn handle_player_message<S: HostSimulation>(
        &mut self,
        player: PlayerIndex,
        message: Message,
        now: Instant,
        sim: &mut S,
    ) {
        let in_game = self.session.state() == SessionState::InGame;
        match message {
            Message::Chat(mut line) => {
                line.sender = Some(player);
                self.session.record_chat(line.clone());
                self.broadcast(&Message::Chat(line), Some(player));
            }
            Message::ClientReadyState(ready) => self.set_ready(player, ready),
            Message::ClientUserData(data) => {
                if let Err(e) = self.set_user_data(player, data) {
                    debug!(%player, error = %e, "user data ignored");
                }
            }
            Message::ClientPlayerInfo(change) => self.change_player_info(player, change),
            Message::MapLoaded => self.mark_map_loaded(player),
            Message::CommandExecution(command) => {
                let success = in_game && sim.execute_command(player, &command);
                debug!(%player, command_id = command.command_id, success, "command executed");
                self.send_to(
                    player,
                    &Message::CommandResponse(CommandResult {
                        command_id: command.command_id,
                        kind: command.kind,
                        success,
                    }),
                );
            }
            Message::OrderedUnit(order) => {
                let entity = if in_game {
                    sim.order_unit(player, &order)
                } else {
                    None
                };
                debug!(%player, request_id = order.request_id, ?entity, "unit ordered");
                self.send_to(
                    player,
                    &Message::OrderedUnitResponse(UnitOrderResult {
                        request_id: order.request_id,
                        success: entity.is_some(),
                        entity,
                    }),
                );
            }
            Message::PingAcknowledge(ping) => {
                let Some(info) = self.session.roster_mut().get_mut(player) else {
                    return;
                };
                match info.ping.acknowledge(ping.ping_id, now) {
                    Some(rtt) => trace!(%player, rtt_ms = rtt.as_millis() as u64, "ping acknowledged"),
                    None => debug!(%player, ping_id = ping.ping_id, "unexpected ping acknowledgement"),
                }
            }
            Message::HighscoreSubmit(submission) => self.accept_highscore(player, submission),
            Message::Handler { kind, body } => {
                if let Err(e) = self.session.handlers_mut().handle(kind, Some(player), &body) {
                    warn!(%player, %kind, error = %e, "dropping handler message");
                }
            }
            other => warn!(%player, kind = %other.kind(), "unexpected message from client"),
        }
    }

    // -----------------------------------------------------------------------
    // Joining and leaving
    // -----------------------------------------------------------------------

    fn handle_join(&mut self, id: ConnectionId, request: JoinRequest) {
        let index = match self.validate_join(&request) {
            Ok(index) => index,
            Err(response) => {
                info!(%id, name = %request.player_name, %response, "join rejected");
                if let Some(mut link) = self.links.remove(&id) {
                    let reply = encode_message(&Message::JoinResponse(JoinResult::rejected(response)));
                    if let Err(e) = link.conn.send_data(&reply) {
                        debug!(%id, error = %e, "join rejection not delivered");
                    }
                    link.conn.shutdown();
                }
                return;
            }
        };

        let Some(link) = self.links.get_mut(&id) else {
            return;
        };
        link.player = Some(index);
        self.players.insert(index, id);

        let mut info = PlayerInfo::new(index, request.player_name.clone());
        info.edition = request.edition;
        info.map_quality = request.map_quality;
        info.user_data = request.user_data;
        let summary = info.to_summary();
        self.session.roster_mut().insert(info);

        let accepted = JoinResult {
            response: JoinResponse::Success,
            accepted: Some(JoinAccepted {
                player_index: index,
                session: self.session.settings().to_info(),
                roster: self.session.roster().summaries(),
            }),
        };
        self.send_to(index, &Message::JoinResponse(accepted));
        self.broadcast(&Message::PlayerJoined(summary), Some(index));

        info!(player = %index, name = %request.player_name, %id, "player joined");
        self.session.emit(SessionEvent::PlayerJoined {
            index,
            name: request.player_name,
        });
    }

    /// Checks a join request in order: game state, password, game
    /// modifications, content checksums, free slot.
    fn validate_join(&self, request: &JoinRequest) -> Result<PlayerIndex, JoinResponse> {
        let settings = self.session.settings();
        if !self.session.state().accepts_joins() {
            return Err(JoinResponse::GameInProgress);
        }
        if !settings.password_matches(&request.password) {
            return Err(JoinResponse::BadPassword);
        }
        if !modifications_match(&self.config.required_modifications, &request.game_modifications)
        {
            return Err(JoinResponse::IncompatibleGameModifications);
        }
        if !checksums_match(&self.config.required_checksums, &request.content_checksums) {
            return Err(JoinResponse::ContentAuthenticationFailed);
        }
        if self.session.roster().len() >= usize::from(settings.max_players) {
            return Err(JoinResponse::SessionFull);
        }
        self.session
            .roster()
            .allocate_index()
            .ok_or(JoinResponse::SessionFull)
    }

    fn drop_link(&mut self, id: ConnectionId, reason: LeaveReason) {
        let Some(mut link) = self.links.remove(&id) else {
            return;
        };
        link.conn.shutdown();
        if let Some(index) = link.player {
            self.remove_player(index, reason);
        }
    }

    /// Removes a player whose link is already gone.
    fn remove_player(&mut self, index: PlayerIndex, reason: LeaveReason) {
        self.players.remove(&index);
        self.highscores.remove(&index);
        if self.session.roster_mut().remove(index).is_none() {
            return;
        }
        info!(player = %index, ?reason, "player left");
        if self.config.remove_units_on_leave && self.session.state().is_in_game() {
            self.departed.push(index);
        }
        self.broadcast(&Message::PlayerLeft(PlayerLeft { index, reason }), None);
        self.session
            .emit(SessionEvent::PlayerLeft { index, reason });
        self.check_progress();
    }

    fn remove_departed_units<S: HostSimulation>(&mut self, sim: &mut S) {
        for index in std::mem::take(&mut self.departed) {
            let removed = sim.remove_player_units(index);
            debug!(player = %index, units = removed.len(), "removing units of departed player");
            for entity in removed {
                self.outbox.destroy_entity(entity);
            }
        }
    }

    /// Closes a player's link and removes them.
    ///
    /// # Errors
    /// [`SessionError::PlayerNotFound`] for an unknown index.
    pub fn kick_player(&mut self, index: PlayerIndex, reason: &str) -> Result<(), SessionError> {
        let id = *self
            .players
            .get(&index)
            .ok_or(SessionError::PlayerNotFound(index))?;
        if let Some(mut link) = self.links.remove(&id) {
            let notice = encode_message(&Message::PlayerKicked(Kicked {
                reason: reason.to_owned(),
            }));
            if let Err(e) = link.conn.send_data(&notice) {
                debug!(player = %index, error = %e, "kick notice not delivered");
            }
            link.conn.shutdown();
        }
        info!(player = %index, %reason, "player kicked");
        self.remove_player(index, LeaveReason::Kicked);
        self.flush();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lobby
    // -----------------------------------------------------------------------

    fn set_ready(&mut self, player: PlayerIndex, ready: bool) {
        if self.session.state() != SessionState::Lobby {
            debug!(%player, state = %self.session.state(), "ready state ignored outside the lobby");
            return;
        }
        let Some(info) = self.session.roster_mut().get_mut(player) else {
            return;
        };
        info.ready = ready;
        debug!(%player, ready, "ready state changed");
        self.broadcast(
            &Message::ServerReadyState(PlayerReady {
                index: player,
                ready,
            }),
            None,
        );
        self.session
            .emit(SessionEvent::ReadyStateChanged { index: player, ready });
        self.check_progress();
    }

    /// Replaces a player's user data and tells everyone.
    ///
    /// # Errors
    /// [`SessionError::PlayerNotFound`] for an unknown index.
    pub fn set_user_data(&mut self, index: PlayerIndex, data: Vec<u8>) -> Result<(), SessionError> {
        let info = self
            .session
            .roster_mut()
            .get_mut(index)
            .ok_or(SessionError::PlayerNotFound(index))?;
        info.user_data.clone_from(&data);
        self.broadcast(
            &Message::ServerUserData(PlayerUserData { index, data }),
            None,
        );
        self.session.emit(SessionEvent::UserDataChanged { index });
        Ok(())
    }

    fn change_player_info(&mut self, index: PlayerIndex, change: PlayerInfoChange) {
        let Some(info) = self.session.roster_mut().get_mut(index) else {
            return;
        };
        info.apply_change(&change);
        debug!(player = %index, team = change.team, name = %change.name, "player info changed");
        self.broadcast(
            &Message::ServerPlayerInfo(PlayerInfoUpdate { index, change }),
            None,
        );
        self.session.emit(SessionEvent::PlayerInfoChanged { index });
    }

    /// Replaces the session settings while in the lobby.
    ///
    /// # Errors
    /// [`SessionError::WrongState`] outside the lobby,
    /// [`SessionError::InvalidSettings`] when fewer slots than players
    /// would remain.
    pub fn change_session_settings(&mut self, settings: SessionSettings) -> Result<(), SessionError> {
        self.session.require_state(SessionState::Lobby)?;
        let settings = settings.validated();
        let players = self.session.roster().len();
        if usize::from(settings.max_players) < players {
            return Err(SessionError::InvalidSettings(format!(
                "max players {} is below the {players} connected",
                settings.max_players
            )));
        }
        self.session.set_settings(settings);
        self.config.session = self.session.settings().clone();
        let info = self.session.settings().to_info();
        info!(name = %info.name, max_players = info.max_players, "session settings changed");
        self.broadcast(&Message::SessionSettingsChanged(info.clone()), None);
        self.session.emit(SessionEvent::SettingsChanged(info));
        Ok(())
    }

    /// Moves every player to the loading screen.
    ///
    /// # Errors
    /// [`SessionError::InvalidTransition`] outside the lobby,
    /// [`SessionError::PlayersNotReady`] while someone is not ready.
    pub fn load_map(&mut self) -> Result<LoadMap, SessionError> {
        let state = self.session.state();
        if state != SessionState::Lobby {
            return Err(SessionError::InvalidTransition {
                from: state,
                to: SessionState::LoadingScreen,
            });
        }
        if !self.session.roster().all_ready() {
            return Err(SessionError::PlayersNotReady);
        }
        self.session.transition(SessionState::LoadingScreen)?;
        for player in self.session.roster_mut().iter_mut() {
            player.map_loaded = false;
        }

        let settings = self.session.settings();
        let load = LoadMap {
            map_asset_id: settings.map_asset_id,
            game_mode: settings.game_mode,
            duration_secs: settings.duration_secs,
            player_separation: settings.player_separation,
            random_seed: rand::rng().random(),
        };
        info!(map = load.map_asset_id, players = self.player_count(), "loading map");
        self.broadcast(&Message::LoadMap(load), None);
        self.session.emit(SessionEvent::MapLoadRequested(load));
        Ok(load)
    }

    fn mark_map_loaded(&mut self, player: PlayerIndex) {
        if self.session.state() != SessionState::LoadingScreen {
            debug!(%player, "map loaded ignored outside the loading screen");
            return;
        }
        if let Some(info) = self.session.roster_mut().get_mut(player) {
            info.map_loaded = true;
            debug!(%player, "map loaded");
        }
        self.check_progress();
    }

    /// Advances the session once every player reached the current step.
    fn check_progress(&mut self) {
        let (all_ready, all_loaded, all_submitted) = {
            let roster = self.session.roster();
            (
                roster.all_ready(),
                roster.all_map_loaded(),
                roster.all_highscores_submitted(),
            )
        };
        match self.session.state() {
            SessionState::Lobby if self.config.auto_load_when_ready && all_ready => {
                if let Err(e) = self.load_map() {
                    warn!(error = %e, "automatic map load failed");
                }
            }
            SessionState::LoadingScreen if all_loaded => self.start_game(),
            SessionState::PostGame if all_submitted => {
                if let Err(e) = self.finish_post_game() {
                    warn!(error = %e, "finishing post game failed");
                }
            }
            _ => {}
        }
    }

    fn start_game(&mut self) {
        if let Err(e) = self.session.transition(SessionState::InGame) {
            warn!(error = %e, "game start refused");
            return;
        }
        let start = GameStart {
            start_tick: self.tick,
        };
        info!(start_tick = %start.start_tick, players = self.player_count(), "game started");
        self.broadcast(&Message::GameStart(start), None);
    }

    // -----------------------------------------------------------------------
    // Post game
    // -----------------------------------------------------------------------

    /// Ends the running game.
    ///
    /// # Errors
    /// [`SessionError::InvalidTransition`] unless in game.
    pub fn end_game(&mut self, winning_team: Option<u8>) -> Result<GameEnd, SessionError> {
        self.session.transition(SessionState::PostGame)?;
        for player in self.session.roster_mut().iter_mut() {
            player.highscore_submitted = false;
        }
        self.highscores.clear();
        let end = GameEnd {
            winning_team,
            final_tick: self.tick,
        };
        info!(?winning_team, final_tick = %self.tick, "game ended");
        self.broadcast(&Message::GameEnd(end), None);
        self.session.emit(SessionEvent::GameEnded(end));
        Ok(end)
    }

    fn accept_highscore(&mut self, player: PlayerIndex, submission: HighscoreSubmission) {
        let accepted = self.session.state() == SessionState::PostGame
            && self
                .session
                .roster()
                .get(player)
                .is_some_and(|p| !p.highscore_submitted);
        let rank = if accepted {
            if let Some(info) = self.session.roster_mut().get_mut(player) {
                info.highscore_submitted = true;
            }
            self.highscores.insert(player, submission.score);
            let better = self
                .highscores
                .values()
                .filter(|score| **score > submission.score)
                .count();
            u16::try_from(better + 1).ok()
        } else {
            None
        };
        info!(%player, score = submission.score, accepted, ?rank, "highscore submitted");
        self.send_to(
            player,
            &Message::HighscoreResult(HighscoreResult { accepted, rank }),
        );
        self.session.emit(SessionEvent::HighscoreSubmitted {
            index: player,
            accepted,
        });
        self.check_progress();
    }

    /// Leaves post game for good and moves every client along.
    pub fn finish_post_game(&mut self) -> Result<(), SessionError> {
        self.session.transition(SessionState::PostGameFinish)?;
        info!(submitted = self.highscores.len(), "post game finished");
        self.broadcast(&Message::PostGameFinished, None);
        Ok(())
    }

    /// Tells every player the session is over, cancels every job and
    /// releases every link and the acceptor.
    pub fn close_session(&mut self) {
        if !self.session.state().is_active() {
            return;
        }
        self.broadcast(&Message::CloseSession, None);
        self.flush();
        for (_, mut link) in std::mem::take(&mut self.links) {
            link.conn.shutdown();
        }
        self.flush();
        self.players.clear();
        self.jobs.cancel_all();
        self.jobs_started = false;
        if let Some(mut acceptor) = self.acceptor.take() {
            acceptor.shutdown();
        }
        self.cache.clear();
        self.outbox.clear();
        self.departed.clear();
        self.highscores.clear();
        self.proxy_session = None;
        self.session.reset();
        self.session.emit(SessionEvent::SessionClosed);
        info!("session closed");
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Builds and broadcasts the frame for the next tick.
    fn gather<S: HostSimulation>(&mut self, sim: &mut S) {
        if self.session.state() != SessionState::InGame {
            return;
        }
        self.tick = self.tick.next();
        let tick = self.tick;
        sim.advance(tick, &mut self.outbox);

        let mut created = Vec::new();
        for (creation, components) in std::mem::take(&mut self.outbox.creates) {
            match self.cache.track(creation.entity, &components) {
                Ok(()) => created.push(creation),
                Err(e) => warn!(entity = %creation.entity, error = %e, "entity not announced"),
            }
        }
        let destroyed: Vec<EntityId> = std::mem::take(&mut self.outbox.destroys)
            .into_iter()
            .filter(|entity| {
                let tracked = self.cache.untrack(*entity, tick);
                if !tracked {
                    debug!(%entity, "destroy of an untracked entity skipped");
                }
                tracked
            })
            .collect();
        let fades = std::mem::take(&mut self.outbox.fades);
        if !fades.is_empty() {
            match self.session.handlers_mut().handler_mut::<EntityFadeHandler>() {
                Some(handler) => fades.into_iter().for_each(|fade| handler.fade(fade)),
                None => warn!(count = fades.len(), "no fade handler, fades dropped"),
            }
        }

        let body = self.cache.update_cache(&*sim);

        let mut frame = FrameBuilder::new();
        if !created.is_empty() {
            frame.push(&Message::CreateEntity(TickBatch {
                tick,
                items: created,
            }));
        }
        frame.push(&Message::DataUpdate(DataUpdatePayload { tick, body }));
        if !destroyed.is_empty() {
            frame.push(&Message::DestroyEntity(TickBatch {
                tick,
                items: destroyed,
            }));
        }
        for message in self.outbox.drain_events(tick) {
            frame.push(&message);
        }
        for message in self.session.handlers_mut().gather(tick) {
            frame.push(&message);
        }
        let messages = frame.len();
        let bytes = frame.finish();
        trace!(%tick, messages, bytes = bytes.len(), "tick gathered");
        self.broadcast_bytes(&bytes, None);
    }

    /// Pings every player whose last ping came back, drops the ones that
    /// stayed silent too long and publishes the ping table.
    fn ping_round(&mut self, now: Instant) {
        let timeout = self.config.ping_timeout;
        let mut timed_out = Vec::new();
        let mut pings = Vec::new();
        for info in self.session.roster_mut().iter_mut() {
            if info.ping.is_timed_out(now, timeout) {
                timed_out.push(info.index);
            } else if info.ping.acknowledged {
                self.next_ping_id = self.next_ping_id.wrapping_add(1);
                info.ping.start(self.next_ping_id, now);
                pings.push((info.index, self.next_ping_id));
            }
        }
        for (index, ping_id) in pings {
            self.send_to(index, &Message::Ping(Ping { ping_id }));
        }
        for index in timed_out {
            warn!(player = %index, "ping timed out, dropping player");
            if let Some(mut link) = self
                .players
                .get(&index)
                .and_then(|id| self.links.remove(id))
            {
                link.conn.shutdown();
            }
            self.remove_player(index, LeaveReason::TimedOut);
        }
        if !self.session.roster().is_empty() {
            let table = self.session.roster().pings();
            self.broadcast(&Message::PlayerPings(table.clone()), None);
            self.session.emit(SessionEvent::PingsUpdated(table));
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    fn send_to(&mut self, index: PlayerIndex, message: &Message) {
        let Some(link) = self
            .players
            .get(&index)
            .and_then(|id| self.links.get_mut(id))
        else {
            return;
        };
        if let Err(e) = link.conn.send_data(&encode_message(message)) {
            warn!(player = %index, kind = %message.kind(), error = %e, "send failed");
        }
    }

    /// Sends `message` to every joined player except `except`.
    pub fn broadcast(&mut self, message: &Message, except: Option<PlayerIndex>) {
        self.broadcast_bytes(&encode_message(message), except);
    }

    fn broadcast_bytes(&mut self, bytes: &[u8], except: Option<PlayerIndex>) {
        for link in self.links.values_mut() {
            let Some(index) = link.player else {
                continue;
            };
            if Some(index) == except {
                continue;
            }
            if let Err(e) = link.conn.send_data(bytes) {
                warn!(player = %index, error = %e, "broadcast send failed");
            }
        }
    }
}

impl SessionRole for Host {
    fn session(&self) -> &SessionBase {
        &self.session
    }

    fn session_mut(&mut self) -> &mut SessionBase {
        &mut self.session
    }

    fn local_player(&self) -> Option<PlayerIndex> {
        None
    }

    fn dispatch_chat(&mut self, line: &ChatLine) {
        self.broadcast(&Message::Chat(line.clone()), None);
    }
}

/// Both sides run the same set of modifications, in any order.
fn modifications_match(required: &[String], offered: &[String]) -> bool {
    let mut required: Vec<&String> = required.iter().collect();
    let mut offered: Vec<&String> = offered.iter().collect();
    required.sort_unstable();
    required.dedup();
    offered.sort_unstable();
    offered.dedup();
    required == offered
}

/// Every required checksum is present with the same value.
fn checksums_match(required: &[ContentChecksum], offered: &[ContentChecksum]) -> bool {
    required.iter().all(|checksum| offered.contains(checksum))
}
