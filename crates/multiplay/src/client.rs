//! The joining role.
//!
//! A [`Client`] holds one link to the host. It mirrors the host's roster
//! and settings and buffers every per-tick message until its local clock
//! reaches that tick. The clock trails the newest tick received by the
//! configured interpolation delay.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use multiplay_cache::{ClientMapCache, ComponentRegistry, PushOutcome, TickHistory};
use multiplay_protocol::messages::{
    ChatLine, Command, HighscoreSubmission, JoinRequest, JoinResult, MinimapPingMark, Ping,
    PlayerInfoChange, PlayerPing, UnitOrder,
};
use multiplay_protocol::{
    EntityId, JoinResponse, Message, OperationMessage, PlayerIndex, Tick, Vec3, decode_frame,
    encode_message,
};
use multiplay_session::{
    EntityFadeHandler, MinimapPingHandler, PlayerInfo, SessionBase, SessionError, SessionEvent,
    SessionRole, SessionState,
};
use multiplay_tick::{JobScheduler, TickDriver};
use multiplay_transport::{HostConnection, LinkEvent};
use tracing::{debug, info, trace, warn};

use crate::MultiplayError;
use crate::config::ClientConfig;
use crate::factory::ConnectTarget;
use crate::simulation::{ClientSimulation, SimulationEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientJob {
    Tick,
    Reconnect,
}

/// The joining side of a session.
pub struct Client {
    config: ClientConfig,
    session: SessionBase,
    link: Box<dyn HostConnection>,
    local_player: Option<PlayerIndex>,
    join_response: Option<JoinResponse>,
    cache: ClientMapCache,
    histories: BTreeMap<OperationMessage, TickHistory<SimulationEvent>>,
    jobs: JobScheduler<ClientJob>,
    jobs_started: bool,
    /// The tick applied next. `None` until the first tick arrived.
    clock: Option<Tick>,
    newest: Option<Tick>,
    pending_commands: BTreeMap<u32, Command>,
    pending_orders: BTreeMap<u32, UnitOrder>,
    next_command_id: u32,
    next_order_id: u32,
    pings: Vec<PlayerPing>,
    lost_at: Option<Instant>,
    reconnect_attempted: bool,
}

impl Client {
    /// Starts connecting over `link`. The join request goes out once the
    /// link reports it is connected.
    pub fn new(
        config: ClientConfig,
        registry: ComponentRegistry,
        mut link: Box<dyn HostConnection>,
    ) -> Result<Self, MultiplayError> {
        let config = config.validated();
        let mut session = SessionBase::new(Default::default(), config.chat_capacity);
        link.connect()?;
        session.transition(SessionState::ConnectingToHost)?;
        info!(name = %config.player_name, "connecting to host");
        Ok(Self {
            cache: ClientMapCache::new(registry, config.history, config.removed_entity_history),
            jobs: JobScheduler::new(config.tick.policy),
            config,
            session,
            link,
            local_player: None,
            join_response: None,
            histories: BTreeMap::new(),
            jobs_started: false,
            clock: None,
            newest: None,
            pending_commands: BTreeMap::new(),
            pending_orders: BTreeMap::new(),
            next_command_id: 0,
            next_order_id: 0,
            pings: Vec::new(),
            lost_at: None,
            reconnect_attempted: false,
        })
    }

    pub fn connect(
        config: ClientConfig,
        registry: ComponentRegistry,
        target: ConnectTarget,
    ) -> Result<Self, MultiplayError> {
        Self::new(config, registry, target.into_link())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The host's answer to our join request, once it arrived.
    pub fn join_response(&self) -> Option<JoinResponse> {
        self.join_response
    }

    /// The tick the local clock applies next.
    pub fn clock(&self) -> Option<Tick> {
        self.clock
    }

    /// The newest tick received from the host.
    pub fn newest_tick(&self) -> Option<Tick> {
        self.newest
    }

    pub fn cache(&self) -> &ClientMapCache {
        &self.cache
    }

    pub fn player(&self, index: PlayerIndex) -> Option<&PlayerInfo> {
        self.session.roster().get(index)
    }

    /// The last ping table published by the host.
    pub fn pings(&self) -> &[PlayerPing] {
        &self.pings
    }

    pub fn pending_commands(&self) -> usize {
        self.pending_commands.len()
    }

    pub fn pending_orders(&self) -> usize {
        self.pending_orders.len()
    }

    /// Per-tick events buffered but not yet applied.
    pub fn pending_events(&self) -> usize {
        self.histories.values().map(TickHistory::len).sum()
    }

    // -----------------------------------------------------------------------
    // Update loop
    // -----------------------------------------------------------------------

    /// Drains the link and runs every job due at `now`.
    pub fn update<S: ClientSimulation>(&mut self, now: Instant, sim: &mut S) {
        if !self.jobs_started {
            self.jobs
                .schedule_periodic(ClientJob::Tick, now, self.config.tick.tick_duration());
            self.jobs_started = true;
        }

        self.poll_link(now);

        for job in self.jobs.due(now) {
            match job {
                ClientJob::Tick => self.advance_clock(sim),
                ClientJob::Reconnect => self.reconnect(),
            }
        }
    }

    /// Calls [`update`](Self::update) at the configured tick rate while the
    /// session is active or a reconnect is pending.
    pub async fn run<S: ClientSimulation>(&mut self, sim: &mut S) {
        let mut driver = TickDriver::new(self.config.tick.clone());
        while self.session.state().is_active() || self.jobs.is_scheduled(ClientJob::Reconnect) {
            let info = driver.wait_for_tick().await;
            self.update(info.now, sim);
            driver.record_tick_end();
        }
    }

    fn poll_link(&mut self, now: Instant) {
        while let Some(event) = self.link.poll_event() {
            let terminal = event.is_terminal();
            match event {
                LinkEvent::Connected => self.on_connected(),
                LinkEvent::Data(bytes) => self.handle_frame(&bytes),
                LinkEvent::ConnectFailed(reason) => {
                    warn!(%reason, "could not reach host");
                    self.session.emit(SessionEvent::ConnectFailed(reason));
                    self.drop_session();
                }
                LinkEvent::ConnectionLost(reason) => self.on_connection_lost(reason, now),
                LinkEvent::Closed => {
                    if self.session.state().is_active() {
                        info!("host closed the link");
                        self.session
                            .emit(SessionEvent::ConnectionLost("closed by host".into()));
                        self.drop_session();
                    }
                }
            }
            if terminal {
                break;
            }
        }
    }

    fn on_connected(&mut self) {
        if let Err(e) = self.session.transition(SessionState::ConnectedToHost) {
            warn!(error = %e, "unexpected connect");
            return;
        }
        let request = JoinRequest {
            player_name: self.config.player_name.clone(),
            password: self.config.password.clone(),
            edition: self.config.edition,
            map_quality: self.config.map_quality,
            game_modifications: self.config.game_modifications.clone(),
            content_checksums: self.config.content_checksums.clone(),
            user_data: self.config.user_data.clone(),
        };
        debug!(name = %request.player_name, "sending join request");
        self.send(&Message::JoinRequest(request));
    }

    /// A relayed link that broke before the game started gets one
    /// reconnect attempt. The host refuses joins once the map is loading,
    /// so a loss from then on ends the session.
    fn on_connection_lost(&mut self, reason: String, now: Instant) {
        warn!(%reason, "connection to host lost");
        let before_game = matches!(
            self.session.state(),
            SessionState::ConnectingToHost | SessionState::ConnectedToHost | SessionState::Lobby
        );
        self.session.emit(SessionEvent::ConnectionLost(reason));
        self.drop_session();
        if before_game && self.link.reconnectable() && !self.reconnect_attempted {
            let at = now + self.config.reconnect_delay;
            info!(delay_ms = self.config.reconnect_delay.as_millis() as u64, "scheduling reconnect");
            self.lost_at = Some(now);
            self.jobs.schedule_once(ClientJob::Reconnect, at);
        }
    }

    /// One attempt at getting back to a relayed session.
    fn reconnect(&mut self) {
        self.reconnect_attempted = true;
        let waited = self.lost_at.take();
        info!(waited = waited.is_some(), "reconnecting to host");
        if let Err(e) = self.link.connect() {
            warn!(error = %e, "reconnect failed");
            self.session.emit(SessionEvent::ConnectFailed(e.to_string()));
            return;
        }
        if let Err(e) = self.session.transition(SessionState::ConnectingToHost) {
            warn!(error = %e, "reconnect refused");
        }
    }

    /// Back to `None` with every buffered tick forgotten.
    fn drop_session(&mut self) {
        self.session.reset();
        self.local_player = None;
        self.clear_ticks();
        self.pending_commands.clear();
        self.pending_orders.clear();
        self.pings.clear();
    }

    fn clear_ticks(&mut self) {
        self.cache.clear();
        self.histories.clear();
        self.clock = None;
        self.newest = None;
    }

    // -----------------------------------------------------------------------
    // Receiving
    // -----------------------------------------------------------------------

    fn handle_frame(&mut self, bytes: &[u8]) {
        let decoded = match decode_frame(bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        if let Some(e) = &decoded.error {
            warn!(error = %e, kept = decoded.messages.len(), "frame cut short");
        }
        for message in decoded.messages {
            if !self.session.state().is_active() {
                break;
            }
            self.handle_message(message);
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::JoinResponse(result) => self.on_join_result(result),
            Message::PlayerJoined(summary) => {
                let index = summary.index;
                let name = summary.name.clone();
                info!(player = %index, %name, "player joined");
                self.session
                    .roster_mut()
                    .insert(PlayerInfo::from_summary(&summary));
                self.session.emit(SessionEvent::PlayerJoined { index, name });
            }
            Message::PlayerLeft(left) => {
                info!(player = %left.index, reason = ?left.reason, "player left");
                self.session.roster_mut().remove(left.index);
                self.session.emit(SessionEvent::PlayerLeft {
                    index: left.index,
                    reason: left.reason,
                });
            }
            Message::PlayerKicked(kicked) => {
                warn!(reason = %kicked.reason, "kicked from session");
                self.session.emit(SessionEvent::Kicked {
                    reason: kicked.reason,
                });
                self.link.shutdown();
                self.drop_session();
            }
            Message::ServerReadyState(ready) => {
                if let Some(player) = self.session.roster_mut().get_mut(ready.index) {
                    player.ready = ready.ready;
                }
                self.session.emit(SessionEvent::ReadyStateChanged {
                    index: ready.index,
                    ready: ready.ready,
                });
            }
            Message::ServerUserData(update) => {
                if let Some(player) = self.session.roster_mut().get_mut(update.index) {
                    player.user_data = update.data;
                }
                self.session
                    .emit(SessionEvent::UserDataChanged { index: update.index });
            }
            Message::ServerPlayerInfo(update) => {
                if let Some(player) = self.session.roster_mut().get_mut(update.index) {
                    player.apply_change(&update.change);
                }
                self.session
                    .emit(SessionEvent::PlayerInfoChanged { index: update.index });
            }
            Message::SessionSettingsChanged(info) => {
                self.session.settings_mut().apply_info(&info);
                debug!(name = %info.name, "session settings changed");
                self.session.emit(SessionEvent::SettingsChanged(info));
            }
            Message::LoadMap(load) => {
                if let Err(e) = self.session.transition(SessionState::LoadingScreen) {
                    warn!(error = %e, "map load ignored");
                    return;
                }
                for player in self.session.roster_mut().iter_mut() {
                    player.map_loaded = false;
                }
                self.clear_ticks();
                info!(map = load.map_asset_id, seed = load.random_seed, "loading map");
                self.session.emit(SessionEvent::MapLoadRequested(load));
            }
            Message::GameStart(start) => {
                if let Err(e) = self.session.transition(SessionState::InGame) {
                    warn!(error = %e, "game start ignored");
                    return;
                }
                info!(start_tick = %start.start_tick, "game started");
                self.clock = None;
            }
            Message::Chat(line) => self.session.record_chat(line),
            Message::GameEnd(end) => {
                if let Err(e) = self.session.transition(SessionState::PostGame) {
                    warn!(error = %e, "game end ignored");
                    return;
                }
                info!(winning_team = ?end.winning_team, final_tick = %end.final_tick, "game ended");
                self.session.emit(SessionEvent::GameEnded(end));
            }
            Message::HighscoreResult(result) => {
                debug!(accepted = result.accepted, rank = ?result.rank, "highscore result");
                if let Some(index) = self.local_player {
                    self.session.emit(SessionEvent::HighscoreSubmitted {
                        index,
                        accepted: result.accepted,
                    });
                }
            }
            Message::PostGameFinished => {
                if let Err(e) = self.session.transition(SessionState::PostGameFinish) {
                    warn!(error = %e, "post game finish ignored");
                    return;
                }
                info!("post game finished");
            }
            Message::DataUpdate(update) => {
                self.observe_tick(update.tick);
                if let Err(e) = self.cache.receive_update(update.tick, &update.body) {
                    warn!(tick = %update.tick, error = %e, "cache update rejected");
                }
            }
            Message::CreateEntity(batch) => {
                self.observe_tick(batch.tick);
                self.cache.receive_creates(batch);
            }
            Message::DestroyEntity(batch) => {
                self.observe_tick(batch.tick);
                self.cache.receive_destroys(batch);
            }
            Message::Handler { kind, body } => {
                if let Err(e) = self.session.handlers_mut().handle(kind, None, &body) {
                    warn!(%kind, error = %e, "dropping handler message");
                }
            }
            Message::CommandResponse(result) => {
                if self.pending_commands.remove(&result.command_id).is_none() {
                    debug!(command_id = result.command_id, "response for unknown command");
                }
                self.session.emit(SessionEvent::CommandResult(result));
            }
            Message::OrderedUnitResponse(result) => {
                if self.pending_orders.remove(&result.request_id).is_none() {
                    debug!(request_id = result.request_id, "response for unknown order");
                }
                self.session.emit(SessionEvent::OrderedUnitResult(result));
            }
            Message::Ping(ping) => self.send(&Message::PingAcknowledge(Ping {
                ping_id: ping.ping_id,
            })),
            Message::PlayerPings(pings) => {
                for entry in &pings {
                    if let Some(player) = self.session.roster_mut().get_mut(entry.index) {
                        player.ping.round_trip =
                            Some(Duration::from_millis(u64::from(entry.rtt_ms)));
                    }
                }
                self.pings.clone_from(&pings);
                self.session.emit(SessionEvent::PingsUpdated(pings));
            }
            Message::CloseSession => {
                info!("host closed the session");
                self.link.shutdown();
                self.jobs.cancel_kind(ClientJob::Reconnect);
                self.drop_session();
                self.session.emit(SessionEvent::SessionClosed);
            }
            other => match SimulationEvent::from_message(other) {
                Some((tick, events)) => self.buffer_events(tick, events),
                None => warn!("unexpected message from host"),
            },
        }
    }

    fn on_join_result(&mut self, result: JoinResult) {
        let response = result.response;
        self.join_response = Some(response);
        match result.accepted {
            Some(accepted) if response.is_success() => {
                self.local_player = Some(accepted.player_index);
                self.session.settings_mut().apply_info(&accepted.session);
                for summary in &accepted.roster {
                    self.session
                        .roster_mut()
                        .insert(PlayerInfo::from_summary(summary));
                }
                if let Err(e) = self.session.transition(SessionState::Lobby) {
                    warn!(error = %e, "join accepted in an unexpected state");
                }
                self.reconnect_attempted = false;
                info!(player = %accepted.player_index, players = accepted.roster.len(), "joined session");
            }
            _ => {
                warn!(%response, "join rejected");
                self.link.shutdown();
                self.drop_session();
            }
        }
        self.session.emit(SessionEvent::JoinResponse(response));
    }

    /// Starts the clock on the first tick and snaps it forward when it fell
    /// out of the history window.
    fn observe_tick(&mut self, tick: Tick) {
        if self.newest.is_none_or(|newest| tick > newest) {
            self.newest = Some(tick);
        }
        let delay = self.config.interpolation_delay;
        match self.clock {
            None => {
                let start = tick.saturating_sub(delay);
                debug!(%tick, clock = %start, "clock started");
                self.clock = Some(start);
            }
            Some(clock) if tick.since(clock) > self.config.history.retention_ticks => {
                let snapped = tick.saturating_sub(delay);
                warn!(%clock, %snapped, "clock fell behind, snapping forward");
                self.clock = Some(snapped);
            }
            Some(_) => {}
        }
    }

    fn buffer_events(&mut self, tick: Tick, events: Vec<SimulationEvent>) {
        self.observe_tick(tick);
        let config = self.config.history;
        for event in events {
            let kind = event.kind();
            let outcome = self
                .histories
                .entry(kind)
                .or_insert_with(|| TickHistory::new(config))
                .push(tick, event);
            if outcome != PushOutcome::Buffered {
                warn!(%kind, %tick, ?outcome, "event dropped");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    /// Applies everything buffered for the current clock tick, then moves
    /// the clock on unless it caught up with the newest tick.
    fn advance_clock<S: ClientSimulation>(&mut self, sim: &mut S) {
        if self.session.state() != SessionState::InGame {
            return;
        }
        let (Some(clock), Some(newest)) = (self.clock, self.newest) else {
            return;
        };

        let summary = self.cache.apply_ready(clock, &mut *sim);

        let mut events: Vec<(Tick, SimulationEvent)> = self
            .histories
            .values_mut()
            .flat_map(|history| history.drain_ready(clock))
            .collect();

        let handlers = self.session.handlers_mut();
        handlers.apply(clock);
        if let Some(fades) = handlers.handler_mut::<EntityFadeHandler>() {
            events.extend(
                fades
                    .drain_applied()
                    .into_iter()
                    .map(|(tick, fade)| (tick, SimulationEvent::EntityFade(fade))),
            );
        }
        if let Some(pings) = handlers.handler_mut::<MinimapPingHandler>() {
            events.extend(
                pings
                    .drain_applied()
                    .into_iter()
                    .map(|(tick, mark)| (tick, SimulationEvent::MinimapPing(mark))),
            );
        }
        events.sort_by_key(|(tick, _)| *tick);
        let applied = events.len();
        for (tick, event) in events {
            sim.apply_event(tick, event);
        }

        for message in self.session.handlers_mut().gather(clock) {
            self.send(&message);
        }

        trace!(
            %clock,
            created = summary.created,
            updated = summary.updated,
            destroyed = summary.destroyed,
            events = applied,
            "tick applied"
        );
        if clock < newest {
            self.clock = Some(clock.next());
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    fn send(&mut self, message: &Message) {
        if let Err(e) = self.link.send_data(&encode_message(message)) {
            warn!(kind = %message.kind(), error = %e, "send failed");
        }
    }

    fn require_joined(&self) -> Result<PlayerIndex, SessionError> {
        self.local_player.ok_or(SessionError::NotConnected)
    }

    /// Leaves the session. The host sees the link close.
    pub fn leave(&mut self) {
        if !self.session.state().is_active() {
            return;
        }
        info!("leaving session");
        self.link.shutdown();
        self.jobs.cancel_kind(ClientJob::Reconnect);
        self.drop_session();
    }

    /// Tells the host whether we are ready. The roster changes once the
    /// host echoes it.
    pub fn set_ready(&mut self, ready: bool) -> Result<(), SessionError> {
        self.session.require_state(SessionState::Lobby)?;
        self.send(&Message::ClientReadyState(ready));
        Ok(())
    }

    pub fn set_user_data(&mut self, data: Vec<u8>) -> Result<(), SessionError> {
        self.require_joined()?;
        self.send(&Message::ClientUserData(data));
        Ok(())
    }

    pub fn change_player_info(&mut self, change: PlayerInfoChange) -> Result<(), SessionError> {
        self.require_joined()?;
        self.send(&Message::ClientPlayerInfo(change));
        Ok(())
    }

    /// Reports the map as loaded. The game starts once everyone did.
    pub fn notify_map_loaded(&mut self) -> Result<(), SessionError> {
        self.session.require_state(SessionState::LoadingScreen)?;
        if let Some(index) = self.local_player {
            if let Some(player) = self.session.roster_mut().get_mut(index) {
                player.map_loaded = true;
            }
        }
        self.send(&Message::MapLoaded);
        Ok(())
    }

    /// Sends a command to the host. Returns its id; the result arrives as
    /// [`SessionEvent::CommandResult`].
    pub fn execute_command(
        &mut self,
        kind: u16,
        entities: Vec<EntityId>,
        target: Option<Vec3>,
        argument: i32,
    ) -> Result<u32, SessionError> {
        self.session.require_state(SessionState::InGame)?;
        self.next_command_id = self.next_command_id.wrapping_add(1);
        let command = Command {
            command_id: self.next_command_id,
            kind,
            entities,
            target,
            argument,
        };
        debug!(command_id = command.command_id, kind, "executing command");
        self.send(&Message::CommandExecution(command.clone()));
        self.pending_commands.insert(command.command_id, command);
        Ok(self.next_command_id)
    }

    /// Orders a unit. Returns the request id; the result arrives as
    /// [`SessionEvent::OrderedUnitResult`].
    pub fn order_unit(&mut self, unit_type: u16, spawn_point: Vec3) -> Result<u32, SessionError> {
        self.session.require_state(SessionState::InGame)?;
        self.next_order_id = self.next_order_id.wrapping_add(1);
        let order = UnitOrder {
            request_id: self.next_order_id,
            unit_type,
            spawn_point,
        };
        self.send(&Message::OrderedUnit(order.clone()));
        self.pending_orders.insert(order.request_id, order);
        Ok(self.next_order_id)
    }

    pub fn submit_highscore(&mut self, score: i32, display_name: &str) -> Result<(), SessionError> {
        self.session.require_state(SessionState::PostGame)?;
        self.send(&Message::HighscoreSubmit(HighscoreSubmission {
            score,
            display_name: display_name.to_owned(),
        }));
        Ok(())
    }

    /// Places a ping on everyone's minimap with the next gathered tick.
    pub fn ping_minimap(&mut self, x: f32, y: f32) -> Result<(), SessionError> {
        self.session.require_state(SessionState::InGame)?;
        let player = self.require_joined()?;
        let handler = self
            .session
            .handlers_mut()
            .handler_mut::<MinimapPingHandler>()
            .ok_or(SessionError::UnhandledMessage(OperationMessage::MinimapPing))?;
        handler.ping(MinimapPingMark { player, x, y });
        Ok(())
    }
}

impl SessionRole for Client {
    fn session(&self) -> &SessionBase {
        &self.session
    }

    fn session_mut(&mut self) -> &mut SessionBase {
        &mut self.session
    }

    fn local_player(&self) -> Option<PlayerIndex> {
        self.local_player
    }

    fn dispatch_chat(&mut self, line: &ChatLine) {
        self.send(&Message::Chat(line.clone()));
    }
}
