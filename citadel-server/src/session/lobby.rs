//! Lobby Controller
//!
//! Pre-game operations on a session: readiness, the host's role-seat map,
//! and the start of a game.

use std::collections::BTreeSet;

use crate::game::{Game, GameRules, Username};
use crate::session::{LobbyRules, RoleMap, SeatRoles, Session, SessionError};

impl Session {
    /// Flip `who`'s readiness. Returns whether anything changed; the host's
    /// readiness is implicit, so toggling it changes nothing.
    pub fn toggle_ready(&mut self, who: &Username) -> Result<bool, SessionError> {
        if !self.is_member(who) {
            return Err(SessionError::FailedPrecondition(format!(
                "{who} is not in session {}",
                self.name()
            )));
        }
        if *who == self.host {
            return Ok(false);
        }

        if !self.ready.remove(who) {
            self.ready.insert(who.clone());
        }
        Ok(true)
    }

    /// Store the seat→role map used to seed the next draft.
    ///
    /// Seat keys must be decimal numbers from 1. Player count is not checked
    /// here; `start_game` does that.
    pub fn set_draft_roles(&mut self, requester: &Username, roles: SeatRoles) -> Result<(), SessionError> {
        self.require_host(requester, "configure roles")?;

        let mut parsed = RoleMap::new();
        let mut seen = BTreeSet::new();
        for (key, role) in &roles {
            let seat: u32 = key
                .trim()
                .parse()
                .map_err(|_| SessionError::InvalidArgument(format!("seat {key:?} is not a number")))?;
            if seat == 0 {
                return Err(SessionError::InvalidArgument("seats are numbered from 1".into()));
            }
            let role = role.trim();
            if role.is_empty() {
                return Err(SessionError::InvalidArgument(format!("seat {seat} has no role")));
            }
            if !seen.insert(role) {
                return Err(SessionError::InvalidArgument(format!("role {role} appears twice")));
            }
            if parsed.insert(seat, role.to_string()).is_some() {
                return Err(SessionError::InvalidArgument(format!("seat {seat} appears twice")));
            }
        }

        self.roles = parsed;
        Ok(())
    }

    /// Draft pool for `players` seats: roles of seats 1..=players, unset
    /// seats skipped.
    pub fn draft_pool(&self, players: usize) -> Vec<String> {
        (1..=players as u32)
            .filter_map(|seat| self.roles.get(&seat).cloned())
            .collect()
    }

    /// Start a game with the current members as the turn order.
    pub fn start_game(
        &mut self,
        requester: &Username,
        rules: &GameRules,
        lobby: &LobbyRules,
        seed: u64,
    ) -> Result<&Game, SessionError> {
        self.require_host(requester, "start the game")?;
        if self.game.is_some() {
            return Err(SessionError::FailedPrecondition("game already started".into()));
        }
        if lobby.require_all_ready {
            if let Some(waiting) = self.players.iter().find(|p| !self.is_ready(p)) {
                return Err(SessionError::FailedPrecondition(format!(
                    "{waiting} is not ready"
                )));
            }
        }

        let order = self.players.clone();
        let pool = self.draft_pool(order.len());
        let game = Game::new(order, pool, rules.clone(), seed)?;
        Ok(&*self.game.insert(game))
    }
}
