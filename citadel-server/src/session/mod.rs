//! Sessions
//!
//! A session is a named lobby with a host, ordered membership, a ready set,
//! the host's seat→role map and, once started, an embedded [`Game`].
//!
//! - `directory`: create/list/remove/join/leave/kick
//! - `lobby`: readiness, draft configuration, game start

pub mod directory;
pub mod lobby;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::game::{Game, GameError, Username};

pub use directory::{JoinOutcome, LeaveOutcome, SessionDirectory};

/// Seat number → role name, as configured by the host.
pub type RoleMap = BTreeMap<u32, String>;

/// Seat map as clients send it: decimal seat numbers as object keys.
pub type SeatRoles = BTreeMap<String, String>;

/// Lobby policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyRules {
    /// Refuse `start_game` until every non-host member is ready.
    pub require_all_ready: bool,
    /// Capacity used when `create` gets no positive max.
    pub default_max_players: usize,
}

impl Default for LobbyRules {
    fn default() -> Self {
        Self {
            require_all_ready: false,
            default_max_players: crate::DEFAULT_MAX_PLAYERS,
        }
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Unknown session.
    #[error("Session {0} not found")]
    NotFound(String),

    /// Duplicate session name.
    #[error("Session {0} already exists")]
    AlreadyExists(String),

    /// Password set and not matched.
    #[error("Wrong password")]
    WrongPassword,

    /// Max players reached.
    #[error("Session is full ({0} players)")]
    Full(usize),

    /// Caller may not perform this operation.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Wrong phase, wrong turn, card not held, or similar.
    #[error("{0}")]
    FailedPrecondition(String),

    /// Empty or malformed required field.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<GameError> for SessionError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::InvalidCard => SessionError::InvalidArgument(err.to_string()),
            other => SessionError::FailedPrecondition(other.to_string()),
        }
    }
}

/// A named lobby/game room.
#[derive(Debug, Clone)]
pub struct Session {
    name: String,
    host: Username,
    password: Option<String>,
    max_players: usize,
    players: Vec<Username>,
    ready: BTreeSet<Username>,
    roles: RoleMap,
    game: Option<Game>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with the host as its only member.
    pub fn new(name: String, host: Username, password: Option<String>, max_players: usize) -> Self {
        Self {
            name,
            players: vec![host.clone()],
            host,
            password,
            max_players,
            ready: BTreeSet::new(),
            roles: RoleMap::new(),
            game: None,
            created_at: Utc::now(),
        }
    }

    /// Session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current host.
    pub fn host(&self) -> &Username {
        &self.host
    }

    /// Whether joining needs a password.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Capacity.
    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// Members in join order.
    pub fn players(&self) -> &[Username] {
        &self.players
    }

    /// Whether `name` is a member.
    pub fn is_member(&self, name: &Username) -> bool {
        self.players.contains(name)
    }

    /// Ready members, host excluded.
    pub fn ready_players(&self) -> &BTreeSet<Username> {
        &self.ready
    }

    /// Whether `name` counts as ready. The host always does.
    pub fn is_ready(&self, name: &Username) -> bool {
        *name == self.host || self.ready.contains(name)
    }

    /// Host-configured seat map.
    pub fn role_map(&self) -> &RoleMap {
        &self.roles
    }

    /// Embedded game, if started.
    pub fn game(&self) -> Option<&Game> {
        self.game.as_ref()
    }

    /// Mutable embedded game, if started.
    pub fn game_mut(&mut self) -> Option<&mut Game> {
        self.game.as_mut()
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn password_matches(&self, supplied: Option<&str>) -> bool {
        match &self.password {
            None => true,
            Some(expected) => supplied == Some(expected.as_str()),
        }
    }

    pub(crate) fn require_host(&self, requester: &Username, action: &str) -> Result<(), SessionError> {
        if *requester != self.host {
            return Err(SessionError::NotAuthorized(format!(
                "only the host can {action}"
            )));
        }
        Ok(())
    }

    pub(crate) fn add_member(&mut self, name: Username) {
        if !self.players.contains(&name) {
            self.players.push(name);
        }
    }

    /// Drop `name` from members and the ready set.
    ///
    /// Returns `Some(new_host)` when the host left and someone else inherits.
    pub(crate) fn remove_member(&mut self, name: &Username) -> Option<Username> {
        self.players.retain(|p| p != name);
        self.ready.remove(name);

        if *name == self.host {
            if let Some(next) = self.players.first() {
                self.host = next.clone();
                self.ready.remove(next);
                return Some(next.clone());
            }
        }
        None
    }
}
