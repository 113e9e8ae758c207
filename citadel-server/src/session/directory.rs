//! Session Directory
//!
//! Source of truth for which sessions exist and who sits in them. Pure data:
//! callers turn the outcomes into broadcasts.

use std::collections::BTreeMap;

use crate::game::Username;
use crate::session::{Session, SessionError};

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Identity was appended to the members.
    Joined,
    /// Identity was already a member; nothing changed.
    AlreadyMember,
}

/// Result of a successful leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Identity was not a member.
    NotMember,
    /// Identity left; members remain.
    Left {
        /// Set when the host left and the seat passed on.
        new_host: Option<Username>,
    },
    /// Identity was the last member and the session is gone.
    Destroyed,
}

/// All sessions, keyed by name.
#[derive(Debug)]
pub struct SessionDirectory {
    sessions: BTreeMap<String, Session>,
    default_max_players: usize,
}

impl SessionDirectory {
    /// Create an empty directory.
    pub fn new(default_max_players: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            default_max_players,
        }
    }

    /// Create a session with `host` as its only member.
    pub fn create(
        &mut self,
        name: &str,
        host: &Username,
        password: Option<&str>,
        max_players: Option<usize>,
    ) -> Result<&Session, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidArgument("session name is empty".into()));
        }
        if host.as_str().trim().is_empty() {
            return Err(SessionError::InvalidArgument("host is empty".into()));
        }
        if self.sessions.contains_key(name) {
            return Err(SessionError::AlreadyExists(name.to_string()));
        }

        let password = password
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let max_players = max_players
            .filter(|m| *m > 0)
            .unwrap_or(self.default_max_players);

        let session = Session::new(name.to_string(), host.clone(), password, max_players);
        let session = self.sessions.entry(name.to_string()).or_insert(session);
        Ok(&*session)
    }

    /// Snapshot of every session, ordered by name.
    pub fn list(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions exist.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Look up a session. Names are matched with surrounding whitespace
    /// stripped, the same way `create` stores them.
    pub fn get(&self, name: &str) -> Result<&Session, SessionError> {
        let name = name.trim();
        self.sessions
            .get(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))
    }

    /// Look up a session for mutation.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Session, SessionError> {
        let name = name.trim();
        self.sessions
            .get_mut(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))
    }

    /// Delete a session on the host's request. Returns the removed session so
    /// its members can be told.
    pub fn remove(&mut self, name: &str, requester: &Username) -> Result<Session, SessionError> {
        let name = name.trim();
        self.get(name)?.require_host(requester, "remove the session")?;
        self.sessions
            .remove(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))
    }

    /// Add `identity` to a session.
    ///
    /// Idempotent for existing members, who are not asked for the password
    /// again. While a game runs only identities
    /// holding a seat in it may come back.
    pub fn join(
        &mut self,
        name: &str,
        identity: &Username,
        password: Option<&str>,
    ) -> Result<JoinOutcome, SessionError> {
        let session = self.get_mut(name)?;

        if session.is_member(identity) {
            return Ok(JoinOutcome::AlreadyMember);
        }
        if !session.password_matches(password) {
            return Err(SessionError::WrongPassword);
        }
        if session.players().len() >= session.max_players() {
            return Err(SessionError::Full(session.max_players()));
        }
        if let Some(game) = session.game() {
            if !game.is_seated(identity) {
                return Err(SessionError::FailedPrecondition(
                    "game already in progress".into(),
                ));
            }
        }

        session.add_member(identity.clone());
        Ok(JoinOutcome::Joined)
    }

    /// Remove `identity` from a session, destroying it when it empties.
    pub fn leave(&mut self, name: &str, identity: &Username) -> Result<LeaveOutcome, SessionError> {
        let name = name.trim();
        let session = self.get_mut(name)?;
        if !session.is_member(identity) {
            return Ok(LeaveOutcome::NotMember);
        }

        let new_host = session.remove_member(identity);
        if session.players().is_empty() {
            self.sessions.remove(name);
            return Ok(LeaveOutcome::Destroyed);
        }
        Ok(LeaveOutcome::Left { new_host })
    }

    /// Host removes `target` from the session.
    pub fn kick(
        &mut self,
        name: &str,
        requester: &Username,
        target: &Username,
    ) -> Result<(), SessionError> {
        let name = name.trim();
        let session = self.get_mut(name)?;
        session.require_host(requester, "kick players")?;
        if target == requester {
            return Err(SessionError::FailedPrecondition(
                "the host cannot kick itself".into(),
            ));
        }
        if !session.is_member(target) {
            return Err(SessionError::NotFound(format!("{target} in {name}")));
        }

        session.remove_member(target);
        Ok(())
    }
}
