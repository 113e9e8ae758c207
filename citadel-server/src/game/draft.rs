//! Role Draft
//!
//! Single pass over the turn order: each seat claims one role from the pool,
//! then the round moves to the action phase with the pointer back on seat 0.

use crate::game::events::GameEvent;
use crate::game::state::{Game, GamePhase, Username};
use crate::game::GameError;

impl Game {
    /// Claim `role` for `who`.
    ///
    /// Valid only in the draft, on `who`'s turn, for a role still in the pool.
    pub fn pick_role(&mut self, who: &Username, role: &str) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(who, GamePhase::RoleDraft)?;

        let Some(pos) = self.pool.iter().position(|r| r == role) else {
            return Err(GameError::RoleUnavailable(role.to_string()));
        };

        let role = self.pool.remove(pos);
        self.player_mut(who)?.role = Some(role.clone());

        let mut events = vec![GameEvent::RoleAssigned {
            player: who.clone(),
            role,
        }];

        if self.turn_index + 1 >= self.order.len() {
            self.phase = GamePhase::Action;
            self.turn_index = 0;
            self.actions_taken = 0;
            events.push(GameEvent::PhaseChanged {
                phase: GamePhase::Action,
            });
            events.push(GameEvent::TurnPassed {
                player: self.current_player().clone(),
            });
        } else {
            self.turn_index += 1;
            events.push(GameEvent::DraftAdvanced {
                picker: self.current_player().clone(),
                available_roles: self.pool.clone(),
            });
        }

        Ok(events)
    }

    /// Roles assigned so far.
    pub fn assigned_roles(&self) -> Vec<&str> {
        self.seats()
            .filter_map(|(_, state)| state.role.as_deref())
            .collect()
    }
}
