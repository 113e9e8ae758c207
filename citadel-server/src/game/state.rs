//! Game State Definitions
//!
//! The in-round state embedded in a session once its host starts a game.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::rng::DeterministicRng;
use crate::game::GameError;

// =============================================================================
// USERNAME
// =============================================================================

/// Player identity. The username is the identity key everywhere.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Wrap a raw name without validation.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Trim and validate a client-supplied name. Empty names are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Borrow the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// RULES
// =============================================================================

/// Economic constants for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRules {
    /// Coins every player holds when the game starts.
    pub starting_coins: u32,
    /// Coins gained by `take_coins`.
    pub coins_per_take: u32,
    /// District cards offered by `request_cards`.
    pub cards_offered: usize,
    /// Flat price charged by `build_district`, regardless of catalog cost.
    pub build_cost: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            starting_coins: 2,
            coins_per_take: 2,
            cards_offered: 2,
            build_cost: 1,
        }
    }
}

// =============================================================================
// PHASE
// =============================================================================

/// Round phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Players claim roles from the pool in turn order.
    RoleDraft,
    /// Players take economic actions in turn order.
    Action,
}

impl GamePhase {
    /// Numeric phase as the game client expects it (1 = draft, 2 = action).
    pub fn number(self) -> u8 {
        match self {
            GamePhase::RoleDraft => 1,
            GamePhase::Action => 2,
        }
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// Per-player round state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Drafted role, `None` until the player picks.
    pub role: Option<String>,
    /// Coin balance, never negative.
    pub coins: u32,
    /// District ids held in hand (multiset).
    pub hand: Vec<String>,
    /// District ids built this round, in build order.
    pub built: Vec<String>,
    /// Cards most recently offered by `request_cards` and not yet resolved.
    pub pending_offer: Option<Vec<String>>,
}

// =============================================================================
// GAME
// =============================================================================

/// A running round.
///
/// `order` is fixed at creation and never changes length, so `turn_index`
/// is always a valid index into it.
#[derive(Clone, Debug)]
pub struct Game {
    pub(crate) order: Vec<Username>,
    pub(crate) phase: GamePhase,
    pub(crate) turn_index: usize,
    pub(crate) initial_pool: Vec<String>,
    pub(crate) pool: Vec<String>,
    pub(crate) players: BTreeMap<Username, PlayerState>,
    pub(crate) rules: GameRules,
    pub(crate) rng: DeterministicRng,
    /// Turn-advancing actions applied since the action phase began.
    pub(crate) actions_taken: u64,
}

impl Game {
    /// Create a game in the draft phase.
    ///
    /// Fails if `order` is empty or the pool cannot give every player a role.
    pub fn new(
        order: Vec<Username>,
        pool: Vec<String>,
        rules: GameRules,
        seed: u64,
    ) -> Result<Self, GameError> {
        if order.is_empty() {
            return Err(GameError::NoPlayers);
        }
        if pool.len() < order.len() {
            return Err(GameError::PoolTooSmall {
                roles: pool.len(),
                players: order.len(),
            });
        }

        let players = order
            .iter()
            .map(|name| {
                let state = PlayerState {
                    coins: rules.starting_coins,
                    ..Default::default()
                };
                (name.clone(), state)
            })
            .collect();

        Ok(Self {
            order,
            phase: GamePhase::RoleDraft,
            turn_index: 0,
            initial_pool: pool.clone(),
            pool,
            players,
            rules,
            rng: DeterministicRng::new(seed),
            actions_taken: 0,
        })
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Index of the seat whose turn it is.
    pub fn turn_index(&self) -> usize {
        self.turn_index
    }

    /// Turn order captured at start.
    pub fn order(&self) -> &[Username] {
        &self.order
    }

    /// Identity whose turn it is.
    pub fn current_player(&self) -> &Username {
        &self.order[self.turn_index]
    }

    /// Roles still unclaimed, in seat order.
    pub fn available_roles(&self) -> &[String] {
        &self.pool
    }

    /// Roles the draft started with.
    pub fn initial_roles(&self) -> &[String] {
        &self.initial_pool
    }

    /// State of one player.
    pub fn player(&self, name: &Username) -> Option<&PlayerState> {
        self.players.get(name)
    }

    /// Whether `name` holds a seat in this game.
    pub fn is_seated(&self, name: &Username) -> bool {
        self.players.contains_key(name)
    }

    /// Players in turn order with their state.
    pub fn seats(&self) -> impl Iterator<Item = (&Username, &PlayerState)> {
        self.order
            .iter()
            .filter_map(move |name| self.players.get(name).map(|state| (name, state)))
    }

    /// Turn-advancing actions applied in the action phase.
    pub fn actions_taken(&self) -> u64 {
        self.actions_taken
    }

    /// Rules this game was created with.
    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Check phase and turn ownership for a move by `who`.
    pub(crate) fn require_turn(&self, who: &Username, phase: GamePhase) -> Result<(), GameError> {
        if self.phase != phase {
            return Err(GameError::WrongPhase {
                expected: phase,
                actual: self.phase,
            });
        }
        if self.current_player() != who {
            return Err(GameError::NotYourTurn {
                current: self.current_player().clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn player_mut(&mut self, who: &Username) -> Result<&mut PlayerState, GameError> {
        self.players
            .get_mut(who)
            .ok_or_else(|| GameError::NotSeated(who.clone()))
    }
}
