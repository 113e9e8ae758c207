//! Coordinator
//!
//! Owns the registry, the session directory and the grace scheduler, and turns
//! every inbound event into a list of outbound messages. Nothing here touches
//! a socket: the server applies the returned [`Effects`].

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::core::rng::derive_game_seed;
use crate::game::catalog::find_district;
use crate::game::{Game, GameError, GameEvent, GamePhase, GameRules, Username};
use crate::network::grace::GraceScheduler;
use crate::network::protocol::{
    AckInfo, CardRequest, ClientMessage, CreateSessionRequest, GameStartedInfo, JoinSessionRequest,
    KickRequest, KickedInfo, NextPickerInfo, OfferInfo, PhaseInfo, PickRoleRequest, PlayerView,
    RegisteredInfo, RoleSelectionInfo, ServerError, ServerMessage, SessionRef, SessionView,
    UpdateRolesRequest,
};
use crate::network::registry::{ConnectionId, ConnectionRegistry, Disconnected};
use crate::session::{JoinOutcome, LeaveOutcome, LobbyRules, SessionDirectory, SessionError};

// =============================================================================
// EFFECTS
// =============================================================================

/// Recipients of one outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// A single connection.
    Connection(ConnectionId),
    /// Several connections, usually the live members of a session.
    Connections(Vec<ConnectionId>),
    /// Every open connection.
    Everyone,
}

impl Audience {
    /// Whether `conn` receives messages sent to this audience.
    pub fn includes(&self, conn: ConnectionId) -> bool {
        match self {
            Audience::Connection(c) => *c == conn,
            Audience::Connections(list) => list.contains(&conn),
            Audience::Everyone => true,
        }
    }
}

/// One message and who gets it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// Who receives it.
    pub audience: Audience,
    /// What is sent.
    pub message: ServerMessage,
}

/// Ordered outbound messages produced by one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects(Vec<Outbound>);

impl Effects {
    /// No messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send to one connection.
    pub fn to(&mut self, conn: ConnectionId, message: ServerMessage) {
        self.0.push(Outbound {
            audience: Audience::Connection(conn),
            message,
        });
    }

    /// Send to several connections. Dropped when the list is empty.
    pub fn to_many(&mut self, conns: Vec<ConnectionId>, message: ServerMessage) {
        if conns.is_empty() {
            return;
        }
        self.0.push(Outbound {
            audience: Audience::Connections(conns),
            message,
        });
    }

    /// Send to every connection.
    pub fn everyone(&mut self, message: ServerMessage) {
        self.0.push(Outbound {
            audience: Audience::Everyone,
            message,
        });
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages in send order.
    pub fn iter(&self) -> impl Iterator<Item = &Outbound> {
        self.0.iter()
    }

    /// Messages `conn` would receive, in order.
    pub fn messages_for(&self, conn: ConnectionId) -> Vec<&ServerMessage> {
        self.0
            .iter()
            .filter(|o| o.audience.includes(conn))
            .map(|o| &o.message)
            .collect()
    }
}

impl IntoIterator for Effects {
    type Item = Outbound;
    type IntoIter = std::vec::IntoIter<Outbound>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a disconnected player keeps their seat.
    pub grace_period: Duration,
    /// Lobby policy.
    pub lobby: LobbyRules,
    /// Rules every new game starts with.
    pub rules: GameRules,
    /// Mixed into every game seed.
    pub entropy: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(crate::DEFAULT_GRACE_SECS),
            lobby: LobbyRules::default(),
            rules: GameRules::default(),
            entropy: 0,
        }
    }
}

/// How a rejected request is reported.
#[derive(Clone, Copy)]
enum Rejection {
    JoinError,
    Ack,
    Error,
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// The owned store and its transition function.
#[derive(Debug)]
pub struct Coordinator {
    registry: ConnectionRegistry,
    directory: SessionDirectory,
    grace: GraceScheduler,
    lobby: LobbyRules,
    rules: GameRules,
    entropy: u64,
    games_started: u64,
}

impl Coordinator {
    /// Empty store.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            directory: SessionDirectory::new(config.lobby.default_max_players),
            grace: GraceScheduler::new(config.grace_period),
            lobby: config.lobby,
            rules: config.rules,
            entropy: config.entropy,
            games_started: 0,
        }
    }

    /// Identity bindings.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// All sessions.
    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    /// Pending seat releases.
    pub fn grace(&self) -> &GraceScheduler {
        &self.grace
    }

    /// Apply one client message from `conn`.
    ///
    /// A rejected request leaves every piece of state as it was and yields
    /// exactly one message, addressed to the caller.
    pub fn handle(&mut self, conn: ConnectionId, mut msg: ClientMessage, now: Instant) -> Effects {
        msg.trim_session_names();
        let request = msg.name();
        let rejection = match &msg {
            ClientMessage::JoinSession(_) | ClientMessage::JoinLobby(_) => Rejection::JoinError,
            ClientMessage::CreateSession(_) => Rejection::Ack,
            _ => Rejection::Error,
        };

        let mut fx = Effects::new();
        match self.dispatch(conn, msg, now, &mut fx) {
            Ok(()) => fx,
            Err(err) => self.reject(conn, request, rejection, err),
        }
    }

    fn dispatch(
        &mut self,
        conn: ConnectionId,
        msg: ClientMessage,
        now: Instant,
        fx: &mut Effects,
    ) -> Result<(), SessionError> {
        match msg {
            ClientMessage::RegisterUsername(name) => self.register(conn, &name, now, fx),
            ClientMessage::GetSessions => {
                fx.to(conn, ServerMessage::SessionsUpdated(self.session_views()));
                Ok(())
            }
            ClientMessage::CreateSession(req) => self.create_session(conn, req, fx),
            ClientMessage::JoinSession(req) => self.join_session(conn, req, fx),
            ClientMessage::JoinLobby(req) => {
                let req = JoinSessionRequest {
                    session_name: req.session_name,
                    username: req.username,
                    password: None,
                };
                self.join_session(conn, req, fx)
            }
            ClientMessage::LeaveLobby(req) => self.leave_lobby(conn, req, fx),
            ClientMessage::ToggleReady(req) => self.toggle_ready(conn, req, fx),
            ClientMessage::UpdateRoles(req) => self.update_roles(conn, req, fx),
            ClientMessage::StartGame(req) => self.start_game(conn, req, fx),
            ClientMessage::GetSessionState(req) => self.session_state(conn, req, fx),
            ClientMessage::PickRole(req) => self.pick_role(conn, req, fx),
            ClientMessage::RequestCards(req) => {
                let me = self.claimed(conn, req.username.as_deref())?;
                self.play(&req.session_name, &me, fx, |game| game.request_cards(&me))
            }
            ClientMessage::TakeCoins(req) => {
                let me = self.claimed(conn, req.username.as_deref())?;
                self.play(&req.session_name, &me, fx, |game| game.take_coins(&me))
            }
            ClientMessage::PickCard(CardRequest { session_name, card }) => {
                let me = self.caller(conn)?;
                self.play(&session_name, &me, fx, |game| game.pick_card(&me, &card))
            }
            ClientMessage::BuildDistrict(CardRequest { session_name, card }) => {
                let me = self.caller(conn)?;
                self.play(&session_name, &me, fx, |game| game.build_district(&me, &card))
            }
            ClientMessage::RemoveSession(req) => self.remove_session(conn, req, fx),
            ClientMessage::KickPlayer(req) => self.kick_player(conn, req, fx),
        }
    }

    /// A transport connection closed.
    ///
    /// A seated identity keeps its seat for the grace window; anyone else is
    /// forgotten straight away.
    pub fn connection_closed(&mut self, conn: ConnectionId, now: Instant) -> Effects {
        self.release_connection(conn, now);
        Effects::new()
    }

    /// Release every seat whose grace window has run out by `now`.
    pub fn expire_grace(&mut self, now: Instant) -> Effects {
        let mut fx = Effects::new();

        for (identity, pending) in self.grace.take_expired(now) {
            if self.registry.connection_of(&identity).is_some() {
                debug!(player = %identity, "grace expired after reconnect, ignoring");
                continue;
            }
            if self.registry.session_of(&identity) != Some(pending.session.as_str()) {
                debug!(player = %identity, session = %pending.session, "grace expired for a stale seat");
                continue;
            }

            info!(player = %identity, session = %pending.session, "grace expired, releasing seat");
            self.leave_quietly(&pending.session, &identity, &mut fx);
        }

        fx
    }

    /// Earliest pending grace deadline.
    pub fn next_grace_deadline(&self) -> Option<Instant> {
        self.grace.next_deadline()
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    fn caller(&self, conn: ConnectionId) -> Result<Username, SessionError> {
        self.registry
            .resolve(conn)
            .cloned()
            .ok_or_else(|| SessionError::NotAuthorized("register a username first".into()))
    }

    /// Registered identity, checked against a payload-supplied name.
    fn claimed(&self, conn: ConnectionId, claimed: Option<&str>) -> Result<Username, SessionError> {
        let me = self.caller(conn)?;
        match claimed.map(str::trim).filter(|c| !c.is_empty()) {
            Some(name) if name != me.as_str() => Err(SessionError::NotAuthorized(format!(
                "connection is registered as {me}, not {name}"
            ))),
            _ => Ok(me),
        }
    }

    fn register(
        &mut self,
        conn: ConnectionId,
        raw: &str,
        now: Instant,
        fx: &mut Effects,
    ) -> Result<(), SessionError> {
        let name = Username::parse(raw)
            .ok_or_else(|| SessionError::InvalidArgument("username is empty".into()))?;

        if self.registry.resolve(conn).is_some_and(|current| *current != name) {
            self.release_connection(conn, now);
        }

        if let Some(replaced) = self.registry.register(&name, conn) {
            info!(player = %name, %conn, %replaced, "identity moved to a new connection");
        }
        if self.grace.cancel(&name).is_some() {
            info!(player = %name, "reconnected within grace window");
        }
        info!(player = %name, %conn, "username registered");

        fx.to(
            conn,
            ServerMessage::Registered(RegisteredInfo {
                username: name.clone(),
                session_name: self.registry.session_of(&name).map(str::to_string),
                server_version: crate::VERSION.to_string(),
            }),
        );
        Ok(())
    }

    fn release_connection(&mut self, conn: ConnectionId, now: Instant) {
        match self.registry.disconnect(conn) {
            Some(Disconnected {
                identity,
                session: Some(session),
            }) => {
                let deadline = self.grace.begin(&identity, &session, now);
                info!(
                    player = %identity,
                    %session,
                    grace_ms = deadline.saturating_duration_since(now).as_millis() as u64,
                    "seated player disconnected"
                );
            }
            Some(Disconnected { identity, .. }) => {
                info!(player = %identity, %conn, "player disconnected");
            }
            None => debug!(%conn, "anonymous connection closed"),
        }
    }

    // =========================================================================
    // DIRECTORY
    // =========================================================================

    fn create_session(
        &mut self,
        conn: ConnectionId,
        req: CreateSessionRequest,
        fx: &mut Effects,
    ) -> Result<(), SessionError> {
        let me = self.claimed(conn, req.host.as_deref())?;
        let previous = self.registry.session_of(&me).map(str::to_string);

        let session = self
            .directory
            .create(&req.name, &me, req.password.as_deref(), req.max_players)?;
        let view = SessionView::from(session);
        let name = view.name.clone();
        info!(session = %name, host = %me, max_players = view.max_players, "session created");

        if let Some(previous) = previous {
            self.leave_quietly(&previous, &me, fx);
        }
        self.registry.seat(&me, Some(&name));

        fx.to(
            conn,
            ServerMessage::Ack(AckInfo {
                request: "createSession".into(),
                success: true,
                message: None,
            }),
        );
        fx.to(conn, ServerMessage::JoinedSession(name));
        fx.to(conn, ServerMessage::LobbyStateUpdated(view));
        fx.everyone(ServerMessage::SessionsUpdated(self.session_views()));
        Ok(())
    }

    fn join_session(
        &mut self,
        conn: ConnectionId,
        req: JoinSessionRequest,
        fx: &mut Effects,
    ) -> Result<(), SessionError> {
        let me = self.claimed(conn, req.username.as_deref())?;
        let name = req.session_name.as_str();
        let previous = self.registry.session_of(&me).map(str::to_string);

        let outcome = self.directory.join(name, &me, req.password.as_deref())?;

        if let Some(previous) = previous.filter(|p| p != name) {
            self.leave_quietly(&previous, &me, fx);
        }
        self.registry.seat(&me, Some(name));
        self.grace.cancel(&me);

        fx.to(conn, ServerMessage::JoinedSession(name.to_string()));
        self.broadcast_lobby(name, fx);
        if outcome == JoinOutcome::Joined {
            info!(session = %name, player = %me, "player joined");
            fx.everyone(ServerMessage::SessionsUpdated(self.session_views()));
        }
        Ok(())
    }

    fn leave_lobby(&mut self, conn: ConnectionId, req: SessionRef, fx: &mut Effects) -> Result<(), SessionError> {
        let me = self.claimed(conn, req.username.as_deref())?;
        let name = req.session_name.as_str();

        let outcome = self.directory.leave(name, &me)?;
        if outcome == LeaveOutcome::NotMember {
            return Err(SessionError::FailedPrecondition(format!("{me} is not in {name}")));
        }

        info!(session = %name, player = %me, "player left");
        self.registry.unseat(&me, name);
        self.grace.cancel(&me);
        self.announce_leave(name, outcome, fx);
        Ok(())
    }

    fn remove_session(
        &mut self,
        conn: ConnectionId,
        req: SessionRef,
        fx: &mut Effects,
    ) -> Result<(), SessionError> {
        let me = self.claimed(conn, req.username.as_deref())?;
        let removed = self.directory.remove(&req.session_name, &me)?;
        info!(session = %removed.name(), host = %me, "session removed");

        fx.to_many(
            self.registry.live_connections(removed.players()),
            ServerMessage::LobbyClosed,
        );
        for member in removed.players() {
            self.grace.cancel(member);
            self.registry.unseat(member, removed.name());
        }
        fx.everyone(ServerMessage::SessionsUpdated(self.session_views()));
        Ok(())
    }

    fn kick_player(&mut self, conn: ConnectionId, req: KickRequest, fx: &mut Effects) -> Result<(), SessionError> {
        let me = self.caller(conn)?;
        let target = Username::parse(&req.player_to_kick)
            .ok_or_else(|| SessionError::InvalidArgument("playerToKick is empty".into()))?;
        let name = req.session_name.as_str();

        self.directory.kick(name, &me, &target)?;
        info!(session = %name, host = %me, player = %target, "player kicked");

        if let Some(target_conn) = self.registry.connection_of(&target) {
            fx.to(
                target_conn,
                ServerMessage::Kicked(KickedInfo {
                    session_name: name.to_string(),
                }),
            );
        }
        self.grace.cancel(&target);
        self.registry.unseat(&target, name);

        self.broadcast_lobby(name, fx);
        fx.everyone(ServerMessage::SessionsUpdated(self.session_views()));
        Ok(())
    }

    /// Leave `name` as part of another operation. A missing session is fine.
    fn leave_quietly(&mut self, name: &str, identity: &Username, fx: &mut Effects) {
        match self.directory.leave(name, identity) {
            Ok(outcome) => {
                debug!(session = %name, player = %identity, ?outcome, "seat released");
                self.announce_leave(name, outcome, fx);
            }
            Err(err) => debug!(session = %name, player = %identity, %err, "seat already gone"),
        }
        self.registry.unseat(identity, name);
    }

    fn announce_leave(&self, name: &str, outcome: LeaveOutcome, fx: &mut Effects) {
        match outcome {
            LeaveOutcome::NotMember => {}
            LeaveOutcome::Left { new_host } => {
                if let Some(host) = new_host {
                    info!(session = %name, %host, "host handed over");
                }
                self.broadcast_lobby(name, fx);
                fx.everyone(ServerMessage::SessionsUpdated(self.session_views()));
            }
            LeaveOutcome::Destroyed => {
                info!(session = %name, "session emptied and closed");
                fx.everyone(ServerMessage::SessionsUpdated(self.session_views()));
            }
        }
    }

    // =========================================================================
    // LOBBY
    // =========================================================================

    fn toggle_ready(&mut self, conn: ConnectionId, req: SessionRef, fx: &mut Effects) -> Result<(), SessionError> {
        let me = self.claimed(conn, req.username.as_deref())?;
        let ready = self.directory.get_mut(&req.session_name)?.toggle_ready(&me)?;
        debug!(session = %req.session_name, player = %me, ready, "readiness toggled");

        self.broadcast_lobby(&req.session_name, fx);
        Ok(())
    }

    fn update_roles(
        &mut self,
        conn: ConnectionId,
        req: UpdateRolesRequest,
        fx: &mut Effects,
    ) -> Result<(), SessionError> {
        let me = self.caller(conn)?;
        self.directory
            .get_mut(&req.session_name)?
            .set_draft_roles(&me, req.roles)?;
        debug!(session = %req.session_name, "seat map updated");

        self.broadcast_lobby(&req.session_name, fx);
        Ok(())
    }

    fn start_game(&mut self, conn: ConnectionId, req: SessionRef, fx: &mut Effects) -> Result<(), SessionError> {
        let me = self.claimed(conn, req.username.as_deref())?;
        let name = req.session_name.as_str();
        let seed = derive_game_seed(self.entropy, name, self.games_started);

        let game = self
            .directory
            .get_mut(name)?
            .start_game(&me, &self.rules, &self.lobby, seed)?;
        let players = PlayerView::snapshot(game);
        let selection = RoleSelectionInfo {
            available_roles: game.available_roles().to_vec(),
            players: players.clone(),
            current_picker_id: game.current_player().clone(),
        };
        self.games_started += 1;
        info!(
            session = %name,
            players = players.len(),
            seed = %hex::encode(seed.to_be_bytes()),
            "game started"
        );

        let members = self.member_connections(name);
        fx.to_many(
            members.clone(),
            ServerMessage::GameStarted(GameStartedInfo {
                session_name: name.to_string(),
                players,
            }),
        );
        fx.to_many(members, ServerMessage::StartRoleSelection(selection));
        self.broadcast_lobby(name, fx);
        fx.everyone(ServerMessage::SessionsUpdated(self.session_views()));
        Ok(())
    }

    fn session_state(&self, conn: ConnectionId, req: SessionRef, fx: &mut Effects) -> Result<(), SessionError> {
        let me = self.claimed(conn, req.username.as_deref())?;
        let session = self.directory.get(&req.session_name)?;
        if !session.is_member(&me) {
            return Err(SessionError::NotAuthorized(format!(
                "{me} is not in {}",
                session.name()
            )));
        }

        fx.to(conn, ServerMessage::LobbyStateUpdated(SessionView::from(session)));
        let Some(game) = session.game() else {
            return Ok(());
        };

        let players = PlayerView::snapshot(game);
        match game.phase() {
            GamePhase::RoleDraft => fx.to(
                conn,
                ServerMessage::StartRoleSelection(RoleSelectionInfo {
                    available_roles: game.available_roles().to_vec(),
                    players: players.clone(),
                    current_picker_id: game.current_player().clone(),
                }),
            ),
            GamePhase::Action => {
                fx.to(conn, ServerMessage::StartGamePhase(PhaseInfo { phase: game.phase().number() }));
                fx.to(
                    conn,
                    ServerMessage::NextPicker(NextPickerInfo {
                        current_picker_id: game.current_player().clone(),
                        available_roles: None,
                    }),
                );
            }
        }
        fx.to(conn, ServerMessage::CardsUpdated(players));

        if let Some(cards) = game.player(&me).and_then(|p| p.pending_offer.clone()) {
            fx.to(conn, ServerMessage::OfferCards(OfferInfo { cards }));
        }
        Ok(())
    }

    // =========================================================================
    // GAME
    // =========================================================================

    fn pick_role(&mut self, conn: ConnectionId, req: PickRoleRequest, fx: &mut Effects) -> Result<(), SessionError> {
        let me = self.caller(conn)?;
        let session = match req.session_name {
            Some(name) => name,
            None => self
                .registry
                .session_of(&me)
                .map(str::to_string)
                .ok_or_else(|| SessionError::FailedPrecondition(format!("{me} is not in a session")))?,
        };
        self.play(&session, &me, fx, |game| game.pick_role(&me, &req.role))
    }

    /// Run one game transition for `me` in `name` and fan out its events.
    fn play<F>(&mut self, name: &str, me: &Username, fx: &mut Effects, apply: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut Game) -> Result<Vec<GameEvent>, GameError>,
    {
        let session = self.directory.get_mut(name)?;
        if !session.is_member(me) {
            return Err(SessionError::FailedPrecondition(format!("{me} is not in {name}")));
        }
        let game = session
            .game_mut()
            .ok_or_else(|| SessionError::FailedPrecondition("no game in progress".into()))?;

        let events = apply(game).map_err(|err| {
            debug!(session = %name, player = %me, %err, "game move rejected");
            SessionError::from(err)
        })?;

        let players = PlayerView::snapshot(game);
        let build_cost = game.rules().build_cost;
        let members = self.member_connections(name);
        let snapshot_is_cards = events
            .iter()
            .any(|e| matches!(e, GameEvent::CardTaken { .. } | GameEvent::DistrictBuilt { .. }));
        let mut snapshot_sent = false;

        for event in events {
            match event {
                GameEvent::RoleAssigned { player, role } => {
                    debug!(session = %name, %player, %role, "role drafted");
                    fx.to_many(members.clone(), ServerMessage::RolesSelected(players.clone()));
                }
                GameEvent::DraftAdvanced { picker, available_roles } => {
                    fx.to_many(
                        members.clone(),
                        ServerMessage::NextPicker(NextPickerInfo {
                            current_picker_id: picker,
                            available_roles: Some(available_roles),
                        }),
                    );
                }
                GameEvent::PhaseChanged { phase } => {
                    info!(session = %name, ?phase, "phase changed");
                    fx.to_many(
                        members.clone(),
                        ServerMessage::StartGamePhase(PhaseInfo { phase: phase.number() }),
                    );
                }
                GameEvent::TurnPassed { player } => {
                    fx.to_many(
                        members.clone(),
                        ServerMessage::NextPicker(NextPickerInfo {
                            current_picker_id: player,
                            available_roles: None,
                        }),
                    );
                }
                GameEvent::CardsOffered { player, cards } => {
                    if let Some(target) = self.registry.connection_of(&player) {
                        fx.to(target, ServerMessage::OfferCards(OfferInfo { cards }));
                    }
                }
                GameEvent::CoinsChanged { .. } | GameEvent::CardTaken { .. } | GameEvent::DistrictBuilt { .. } => {
                    if let GameEvent::DistrictBuilt { card, .. } = &event {
                        let listed = find_district(card).map(|d| d.cost);
                        debug!(session = %name, %card, ?listed, charged = build_cost, "district built");
                    }
                    if !snapshot_sent {
                        snapshot_sent = true;
                        let message = if snapshot_is_cards {
                            ServerMessage::CardsUpdated(players.clone())
                        } else {
                            ServerMessage::CoinsUpdated(players.clone())
                        };
                        fx.to_many(members.clone(), message);
                    }
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn session_views(&self) -> Vec<SessionView> {
        self.directory.list().map(SessionView::from).collect()
    }

    fn member_connections(&self, name: &str) -> Vec<ConnectionId> {
        self.directory
            .get(name)
            .map(|s| self.registry.live_connections(s.players()))
            .unwrap_or_default()
    }

    fn broadcast_lobby(&self, name: &str, fx: &mut Effects) {
        if let Ok(session) = self.directory.get(name) {
            fx.to_many(
                self.registry.live_connections(session.players()),
                ServerMessage::LobbyStateUpdated(SessionView::from(session)),
            );
        }
    }

    fn reject(&self, conn: ConnectionId, request: &str, rejection: Rejection, err: SessionError) -> Effects {
        debug!(%conn, request, %err, "request rejected");

        let message = match rejection {
            Rejection::JoinError => ServerMessage::JoinSessionError(err.to_string()),
            Rejection::Ack => ServerMessage::Ack(AckInfo {
                request: request.to_string(),
                success: false,
                message: Some(err.to_string()),
            }),
            Rejection::Error => ServerMessage::Error(ServerError::from(&err)),
        };

        let mut fx = Effects::new();
        fx.to(conn, message);
        fx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::ErrorCode;
    use crate::network::registry::Presence;
    use crate::session::SeatRoles;

    const GRACE: Duration = Duration::from_secs(30);

    struct Harness {
        coordinator: Coordinator,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            let config = CoordinatorConfig {
                grace_period: GRACE,
                entropy: 7,
                ..Default::default()
            };
            Self {
                coordinator: Coordinator::new(config),
                now: Instant::now(),
            }
        }

        fn send(&mut self, conn: ConnectionId, msg: ClientMessage) -> Effects {
            self.coordinator.handle(conn, msg, self.now)
        }

        fn connect(&mut self, name: &str) -> ConnectionId {
            let conn = ConnectionId::new();
            self.send(conn, ClientMessage::RegisterUsername(name.into()));
            conn
        }

        fn create(&mut self, conn: ConnectionId, name: &str, password: Option<&str>) -> Effects {
            self.send(
                conn,
                ClientMessage::CreateSession(CreateSessionRequest {
                    name: name.into(),
                    host: None,
                    password: password.map(str::to_string),
                    max_players: Some(4),
                }),
            )
        }

        fn join(&mut self, conn: ConnectionId, name: &str, password: Option<&str>) -> Effects {
            self.send(
                conn,
                ClientMessage::JoinSession(JoinSessionRequest {
                    session_name: name.into(),
                    username: None,
                    password: password.map(str::to_string),
                }),
            )
        }

        fn players(&self, name: &str) -> Vec<String> {
            self.coordinator
                .directory()
                .get(name)
                .map(|s| s.players().iter().map(|p| p.to_string()).collect())
                .unwrap_or_default()
        }

        fn game(&self, name: &str) -> &Game {
            self.coordinator.directory().get(name).unwrap().game().unwrap()
        }

        /// alice hosts s1, bob joins, seats 1..2 hold Assassin and Spy, game started.
        fn started_game() -> (Self, ConnectionId, ConnectionId) {
            let mut h = Self::new();
            let alice = h.connect("alice");
            let bob = h.connect("bob");
            h.create(alice, "s1", None);
            h.join(bob, "s1", None);

            let roles: SeatRoles = [("1".to_string(), "Assassin".to_string()), ("2".to_string(), "Spy".to_string())].into();
            h.send(
                alice,
                ClientMessage::UpdateRoles(UpdateRolesRequest {
                    session_name: "s1".into(),
                    roles,
                }),
            );
            h.send(alice, ClientMessage::StartGame(SessionRef::new("s1")));
            (h, alice, bob)
        }

        fn pick(&mut self, conn: ConnectionId, role: &str) -> Effects {
            self.send(
                conn,
                ClientMessage::PickRole(PickRoleRequest {
                    session_name: None,
                    role: role.into(),
                }),
            )
        }
    }

    fn error_code(fx: &Effects, conn: ConnectionId) -> Option<ErrorCode> {
        fx.messages_for(conn).iter().find_map(|m| match m {
            ServerMessage::Error(err) => Some(err.code),
            _ => None,
        })
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let mut h = Harness::new();
        let conn = ConnectionId::new();

        let fx = h.send(conn, ClientMessage::RegisterUsername("   ".into()));

        assert_eq!(error_code(&fx, conn), Some(ErrorCode::InvalidArgument));
        assert!(h.coordinator.registry().resolve(conn).is_none());
    }

    #[test]
    fn test_unregistered_caller_not_authorized() {
        let mut h = Harness::new();
        let conn = ConnectionId::new();

        let fx = h.send(conn, ClientMessage::ToggleReady(SessionRef::new("s1")));

        assert_eq!(fx.len(), 1);
        assert_eq!(error_code(&fx, conn), Some(ErrorCode::NotAuthorized));
    }

    #[test]
    fn test_create_session_lists_host() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let watcher = ConnectionId::new();

        let fx = h.create(alice, "s1", None);

        let to_alice = fx.messages_for(alice);
        assert!(matches!(
            to_alice[0],
            ServerMessage::Ack(AckInfo { success: true, .. })
        ));
        assert_eq!(to_alice[1], &ServerMessage::JoinedSession("s1".into()));
        assert!(matches!(to_alice[2], ServerMessage::LobbyStateUpdated(_)));
        let listing = fx.messages_for(watcher);
        let ServerMessage::SessionsUpdated(sessions) = listing[0] else {
            panic!("expected sessionsUpdated");
        };
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].players, vec![Username::new("alice")]);
        assert_eq!(sessions[0].max_players, 4);
    }

    #[test]
    fn test_create_duplicate_acks_failure() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");
        h.create(alice, "s1", None);

        let fx = h.create(bob, "s1", None);

        assert_eq!(fx.len(), 1);
        assert!(matches!(
            fx.messages_for(bob)[0],
            ServerMessage::Ack(AckInfo { success: false, .. })
        ));
        assert_eq!(h.players("s1"), vec!["alice"]);
    }

    #[test]
    fn test_payload_username_must_match_identity() {
        let mut h = Harness::new();
        let alice = h.connect("alice");

        let fx = h.send(
            alice,
            ClientMessage::CreateSession(CreateSessionRequest {
                name: "s1".into(),
                host: Some("mallory".into()),
                ..Default::default()
            }),
        );

        assert!(matches!(
            fx.messages_for(alice)[0],
            ServerMessage::Ack(AckInfo { success: false, .. })
        ));
        assert!(h.coordinator.directory().is_empty());
    }

    #[test]
    fn test_join_with_password() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");
        h.create(alice, "s1", Some("pw"));

        let fx = h.join(bob, "s1", Some("nope"));
        assert!(matches!(fx.messages_for(bob)[0], ServerMessage::JoinSessionError(_)));
        assert_eq!(h.players("s1"), vec!["alice"]);

        let fx = h.join(bob, "s1", Some("pw"));
        assert_eq!(fx.messages_for(bob)[0], &ServerMessage::JoinedSession("s1".into()));
        assert!(fx
            .messages_for(alice)
            .iter()
            .any(|m| matches!(m, ServerMessage::LobbyStateUpdated(v) if v.players.len() == 2)));
        assert_eq!(h.players("s1"), vec!["alice", "bob"]);
    }

    #[test]
    fn test_join_other_session_leaves_previous() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");
        let carol = h.connect("carol");
        h.create(alice, "s1", None);
        h.create(bob, "s2", None);
        h.join(carol, "s1", None);

        h.join(carol, "s2", None);

        assert_eq!(h.players("s1"), vec!["alice"]);
        assert_eq!(h.players("s2"), vec!["bob", "carol"]);
        assert_eq!(
            h.coordinator.registry().session_of(&Username::new("carol")),
            Some("s2")
        );
    }

    #[test]
    fn test_leave_last_member_destroys_session() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        h.create(alice, "s1", None);

        h.send(alice, ClientMessage::LeaveLobby(SessionRef::new("s1")));

        assert!(h.coordinator.directory().is_empty());
        assert_eq!(h.coordinator.registry().session_of(&Username::new("alice")), None);
    }

    #[test]
    fn test_host_leaving_hands_over() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");
        h.create(alice, "s1", None);
        h.join(bob, "s1", None);

        let fx = h.send(alice, ClientMessage::LeaveLobby(SessionRef::new("s1")));

        let session = h.coordinator.directory().get("s1").unwrap();
        assert_eq!(session.host(), &Username::new("bob"));
        assert!(fx
            .messages_for(bob)
            .iter()
            .any(|m| matches!(m, ServerMessage::LobbyStateUpdated(v) if v.host == Username::new("bob"))));
    }

    #[test]
    fn test_remove_session_host_only() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");
        h.create(alice, "s1", None);
        h.join(bob, "s1", None);

        let fx = h.send(bob, ClientMessage::RemoveSession(SessionRef::new("s1")));
        assert_eq!(error_code(&fx, bob), Some(ErrorCode::NotAuthorized));

        let fx = h.send(alice, ClientMessage::RemoveSession(SessionRef::new("s1")));
        assert!(fx.messages_for(bob).contains(&&ServerMessage::LobbyClosed));
        assert!(h.coordinator.directory().is_empty());
        assert_eq!(h.coordinator.registry().session_of(&Username::new("bob")), None);
    }

    #[test]
    fn test_kick_player() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");
        h.create(alice, "s1", None);
        h.join(bob, "s1", None);

        let kick = |target: &str| {
            ClientMessage::KickPlayer(KickRequest {
                session_name: "s1".into(),
                player_to_kick: target.into(),
            })
        };

        assert_eq!(error_code(&h.send(bob, kick("alice")), bob), Some(ErrorCode::NotAuthorized));
        assert_eq!(
            error_code(&h.send(alice, kick("alice")), alice),
            Some(ErrorCode::FailedPrecondition)
        );
        assert_eq!(error_code(&h.send(alice, kick("zed")), alice), Some(ErrorCode::NotFound));

        let fx = h.send(alice, kick("bob"));
        assert!(fx.messages_for(bob).contains(&&ServerMessage::Kicked(KickedInfo {
            session_name: "s1".into()
        })));
        assert_eq!(h.players("s1"), vec!["alice"]);
    }

    #[test]
    fn test_start_game_opens_draft() {
        let (h, _alice, _bob) = Harness::started_game();

        let game = h.game("s1");
        assert_eq!(game.phase(), GamePhase::RoleDraft);
        assert_eq!(game.available_roles(), ["Assassin".to_string(), "Spy".to_string()]);
        assert_eq!(game.current_player(), &Username::new("alice"));
        assert!(h.coordinator.directory().get("s1").unwrap().game().is_some());
    }

    #[test]
    fn test_start_game_broadcast_order() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");
        h.create(alice, "s1", None);
        h.join(bob, "s1", None);
        let roles: SeatRoles = [("1".to_string(), "King".to_string()), ("2".to_string(), "Thief".to_string())].into();
        h.send(
            alice,
            ClientMessage::UpdateRoles(UpdateRolesRequest {
                session_name: "s1".into(),
                roles,
            }),
        );

        let fx = h.send(alice, ClientMessage::StartGame(SessionRef::new("s1")));

        let to_bob = fx.messages_for(bob);
        assert!(matches!(to_bob[0], ServerMessage::GameStarted(_)));
        let ServerMessage::StartRoleSelection(selection) = to_bob[1] else {
            panic!("expected startRoleSelection");
        };
        assert_eq!(selection.current_picker_id, Username::new("alice"));
        assert_eq!(selection.players.len(), 2);
    }

    #[test]
    fn test_start_game_non_host_rejected() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");
        h.create(alice, "s1", None);
        h.join(bob, "s1", None);

        let fx = h.send(bob, ClientMessage::StartGame(SessionRef::new("s1")));

        assert_eq!(error_code(&fx, bob), Some(ErrorCode::NotAuthorized));
    }

    #[test]
    fn test_draft_to_action() {
        let (mut h, alice, bob) = Harness::started_game();

        // out of turn
        let fx = h.pick(bob, "Spy");
        assert_eq!(error_code(&fx, bob), Some(ErrorCode::FailedPrecondition));
        assert_eq!(h.game("s1").available_roles().len(), 2);

        let fx = h.pick(alice, "Assassin");
        assert!(fx.messages_for(bob).iter().any(|m| matches!(
            m,
            ServerMessage::NextPicker(NextPickerInfo { current_picker_id, available_roles: Some(roles) })
                if *current_picker_id == Username::new("bob") && roles == &vec!["Spy".to_string()]
        )));

        let fx = h.pick(bob, "Spy");
        assert!(fx
            .messages_for(alice)
            .contains(&&ServerMessage::StartGamePhase(PhaseInfo { phase: 2 })));

        let game = h.game("s1");
        assert_eq!(game.phase(), GamePhase::Action);
        assert_eq!(game.current_player(), &Username::new("alice"));
    }

    #[test]
    fn test_take_coins_and_stale_call() {
        let (mut h, alice, bob) = Harness::started_game();
        h.pick(alice, "Assassin");
        h.pick(bob, "Spy");

        let fx = h.send(alice, ClientMessage::TakeCoins(SessionRef::new("s1")));
        assert!(matches!(fx.messages_for(bob)[0], ServerMessage::CoinsUpdated(_)));

        let fx = h.send(alice, ClientMessage::TakeCoins(SessionRef::new("s1")));
        assert_eq!(fx.len(), 1);
        assert_eq!(error_code(&fx, alice), Some(ErrorCode::FailedPrecondition));

        let game = h.game("s1");
        assert_eq!(game.player(&Username::new("alice")).unwrap().coins, 4);
        assert_eq!(game.current_player(), &Username::new("bob"));
    }

    #[test]
    fn test_request_cards_is_private() {
        let (mut h, alice, bob) = Harness::started_game();
        h.pick(alice, "Assassin");
        h.pick(bob, "Spy");

        let fx = h.send(alice, ClientMessage::RequestCards(SessionRef::new("s1")));

        assert!(fx.messages_for(bob).is_empty());
        let ServerMessage::OfferCards(offer) = fx.messages_for(alice)[0] else {
            panic!("expected offerCards");
        };
        assert_eq!(offer.cards.len(), 2);

        // turn stays with alice until she picks
        assert_eq!(h.game("s1").current_player(), &Username::new("alice"));
        let card = offer.cards[0].clone();
        let fx = h.send(
            alice,
            ClientMessage::PickCard(CardRequest {
                session_name: "s1".into(),
                card: card.clone(),
            }),
        );
        assert!(matches!(fx.messages_for(bob)[0], ServerMessage::CardsUpdated(_)));
        assert_eq!(h.game("s1").player(&Username::new("alice")).unwrap().hand, vec![card]);
    }

    #[test]
    fn test_build_without_card_rejected() {
        let (mut h, alice, bob) = Harness::started_game();
        h.pick(alice, "Assassin");
        h.pick(bob, "Spy");

        let fx = h.send(
            alice,
            ClientMessage::BuildDistrict(CardRequest {
                session_name: "s1".into(),
                card: "castle".into(),
            }),
        );

        assert_eq!(error_code(&fx, alice), Some(ErrorCode::FailedPrecondition));
        assert_eq!(h.game("s1").current_player(), &Username::new("alice"));
    }

    #[test]
    fn test_reconnect_within_grace_keeps_seat() {
        let (mut h, alice, bob) = Harness::started_game();
        h.pick(alice, "Assassin");
        h.pick(bob, "Spy");
        h.send(alice, ClientMessage::TakeCoins(SessionRef::new("s1")));

        h.coordinator.connection_closed(bob, h.now);
        assert_eq!(
            h.coordinator.registry().presence(&Username::new("bob")),
            Presence::GracePeriod
        );

        h.now += Duration::from_secs(10);
        let bob2 = h.connect("bob");
        h.send(
            bob2,
            ClientMessage::JoinLobby(SessionRef::new("s1")),
        );

        h.now += GRACE * 2;
        let fx = h.coordinator.expire_grace(h.now);
        assert!(fx.is_empty());
        assert_eq!(h.players("s1"), vec!["alice", "bob"]);

        let fx = h.send(bob2, ClientMessage::GetSessionState(SessionRef::new("s1")));
        let to_bob = fx.messages_for(bob2);
        assert!(matches!(to_bob[0], ServerMessage::LobbyStateUpdated(_)));
        assert!(to_bob.contains(&&ServerMessage::StartGamePhase(PhaseInfo { phase: 2 })));
        assert_eq!(h.game("s1").current_player(), &Username::new("bob"));
        assert_eq!(h.game("s1").player(&Username::new("bob")).unwrap().coins, 2);
    }

    #[test]
    fn test_grace_expiry_releases_seat() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");
        h.create(alice, "s1", None);
        h.join(bob, "s1", None);

        h.coordinator.connection_closed(bob, h.now);
        assert!(h.coordinator.expire_grace(h.now + GRACE / 2).is_empty());

        let fx = h.coordinator.expire_grace(h.now + GRACE);
        assert!(fx
            .messages_for(alice)
            .iter()
            .any(|m| matches!(m, ServerMessage::LobbyStateUpdated(v) if v.players.len() == 1)));
        assert_eq!(h.players("s1"), vec!["alice"]);
        assert_eq!(
            h.coordinator.registry().presence(&Username::new("bob")),
            Presence::Removed
        );
    }

    #[test]
    fn test_grace_expiry_of_last_member_destroys_session() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        h.create(alice, "s1", None);

        h.coordinator.connection_closed(alice, h.now);
        h.coordinator.expire_grace(h.now + GRACE);

        assert!(h.coordinator.directory().is_empty());
    }

    #[test]
    fn test_grace_expiry_tolerates_removed_session() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");
        h.create(alice, "s1", None);
        h.join(bob, "s1", None);

        h.coordinator.connection_closed(bob, h.now);
        h.send(alice, ClientMessage::RemoveSession(SessionRef::new("s1")));

        let fx = h.coordinator.expire_grace(h.now + GRACE);
        assert!(fx.is_empty());
        assert_eq!(
            h.coordinator.registry().presence(&Username::new("bob")),
            Presence::Removed
        );
    }

    #[test]
    fn test_unseated_disconnect_forgets_identity() {
        let mut h = Harness::new();
        let alice = h.connect("alice");

        h.coordinator.connection_closed(alice, h.now);

        assert!(h.coordinator.grace().is_empty());
        assert_eq!(
            h.coordinator.registry().presence(&Username::new("alice")),
            Presence::Removed
        );
    }

    #[test]
    fn test_padded_session_name_reaches_same_session() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        let bob = h.connect("bob");

        let fx = h.create(alice, "s1 ", None);
        assert_eq!(fx.messages_for(alice)[1], &ServerMessage::JoinedSession("s1".into()));
        let fx = h.join(bob, " s1", None);
        assert_eq!(fx.messages_for(bob)[0], &ServerMessage::JoinedSession("s1".into()));
        assert_eq!(h.coordinator.registry().session_of(&Username::new("bob")), Some("s1"));

        let fx = h.send(bob, ClientMessage::ToggleReady(SessionRef::new("s1 ")));
        assert_eq!(error_code(&fx, bob), None);
        assert!(h
            .coordinator
            .directory()
            .get("s1")
            .unwrap()
            .is_ready(&Username::new("bob")));

        let roles: SeatRoles = [("1".to_string(), "King".to_string()), ("2".to_string(), "Thief".to_string())].into();
        let fx = h.send(
            alice,
            ClientMessage::UpdateRoles(UpdateRolesRequest {
                session_name: "\ts1".into(),
                roles,
            }),
        );
        assert_eq!(error_code(&fx, alice), None);

        let fx = h.send(alice, ClientMessage::StartGame(SessionRef::new(" s1 ")));
        assert_eq!(error_code(&fx, alice), None);
        assert_eq!(h.game("s1").phase(), GamePhase::RoleDraft);
    }

    #[test]
    fn test_outsider_cannot_join_running_game() {
        let (mut h, _alice, _bob) = Harness::started_game();
        let carol = h.connect("carol");

        let fx = h.join(carol, "s1", None);

        assert_eq!(fx.len(), 1);
        assert!(matches!(fx.messages_for(carol)[0], ServerMessage::JoinSessionError(_)));
        assert_eq!(h.players("s1"), vec!["alice", "bob"]);
        assert_eq!(h.coordinator.registry().session_of(&Username::new("carol")), None);
    }

    #[test]
    fn test_rejoin_after_grace_expiry_resumes_game() {
        let (mut h, alice, bob) = Harness::started_game();
        h.pick(alice, "Assassin");
        h.pick(bob, "Spy");
        let card = |name: &str| CardRequest {
            session_name: "s1".into(),
            card: name.into(),
        };
        let coins = || ClientMessage::TakeCoins(SessionRef::new("s1"));

        h.send(alice, coins());
        h.send(bob, ClientMessage::PickCard(card("market")));
        h.send(alice, coins());
        h.send(bob, ClientMessage::PickCard(card("temple")));
        h.send(alice, coins());
        h.send(bob, ClientMessage::BuildDistrict(card("market")));

        h.coordinator.connection_closed(bob, h.now);
        h.now += GRACE;
        h.coordinator.expire_grace(h.now);
        assert_eq!(h.players("s1"), vec!["alice"]);
        assert_eq!(
            h.coordinator.registry().presence(&Username::new("bob")),
            Presence::Removed
        );

        // the turn still passes to bob's seat while he is away
        h.send(alice, coins());
        assert_eq!(h.game("s1").current_player(), &Username::new("bob"));

        let bob2 = h.connect("bob");
        let fx = h.join(bob2, "s1", None);
        assert_eq!(fx.messages_for(bob2)[0], &ServerMessage::JoinedSession("s1".into()));
        assert_eq!(h.players("s1"), vec!["alice", "bob"]);

        let fx = h.send(bob2, ClientMessage::GetSessionState(SessionRef::new("s1")));
        let to_bob = fx.messages_for(bob2);
        assert!(to_bob.contains(&&ServerMessage::StartGamePhase(PhaseInfo { phase: 2 })));
        assert!(to_bob.contains(&&ServerMessage::NextPicker(NextPickerInfo {
            current_picker_id: Username::new("bob"),
            available_roles: None,
        })));
        let snapshot = to_bob
            .iter()
            .find_map(|m| match m {
                ServerMessage::CardsUpdated(players) => Some(players.clone()),
                _ => None,
            })
            .unwrap();
        let bob_view = snapshot
            .iter()
            .find(|p| p.id == Username::new("bob"))
            .unwrap();
        assert_eq!(bob_view.role.as_deref(), Some("Spy"));
        assert_eq!(bob_view.coins, 1);
        assert_eq!(bob_view.hand, vec!["temple".to_string()]);
        assert_eq!(bob_view.built, vec!["market".to_string()]);

        let fx = h.send(bob2, coins());
        assert_eq!(error_code(&fx, bob2), None);
        assert_eq!(h.game("s1").player(&Username::new("bob")).unwrap().coins, 3);
        assert_eq!(h.game("s1").current_player(), &Username::new("alice"));
    }
}
