//! Game Logic Module
//!
//! Pure round state machines. Nothing here knows about connections.
//!
//! ## Module Structure
//!
//! - `state`: game, per-player state, rules
//! - `draft`: role draft state machine
//! - `action`: action-phase resolver
//! - `catalog`: district deck
//! - `events`: outcomes of accepted transitions

pub mod action;
pub mod catalog;
pub mod draft;
pub mod events;
pub mod state;

pub use catalog::{District, DistrictCategory, DISTRICTS};
pub use events::GameEvent;
pub use state::{Game, GamePhase, GameRules, PlayerState, Username};

/// Rejected game transition. State is untouched when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Move made in the wrong phase.
    #[error("Expected phase {expected:?}, game is in {actual:?}")]
    WrongPhase {
        /// Phase the move needs.
        expected: GamePhase,
        /// Phase the game is in.
        actual: GamePhase,
    },

    /// Move made out of turn.
    #[error("Not your turn, waiting for {current}")]
    NotYourTurn {
        /// Identity whose turn it is.
        current: Username,
    },

    /// Role not in the pool (taken or never offered).
    #[error("Role {0} is not available")]
    RoleUnavailable(String),

    /// District not held in hand.
    #[error("District {0} is not in hand")]
    CardNotInHand(String),

    /// Empty district id.
    #[error("District id must not be empty")]
    InvalidCard,

    /// Identity has no seat in this game.
    #[error("{0} has no seat in this game")]
    NotSeated(Username),

    /// A game needs at least one player.
    #[error("A game needs at least one player")]
    NoPlayers,

    /// Fewer draftable roles than players.
    #[error("{roles} roles configured for {players} players")]
    PoolTooSmall {
        /// Roles in the pool.
        roles: usize,
        /// Players in the turn order.
        players: usize,
    },
}
