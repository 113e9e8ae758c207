//! Game Events
//!
//! Emitted by the pure game transitions. The network layer turns them into
//! outbound messages; the game itself never talks to a connection.

use crate::game::state::{GamePhase, Username};

/// Observable outcome of one accepted game transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    /// A role left the pool and was assigned.
    RoleAssigned {
        /// Player who picked.
        player: Username,
        /// Role picked.
        role: String,
    },

    /// The draft moved to the next seat.
    DraftAdvanced {
        /// Identity that picks next.
        picker: Username,
        /// Roles still in the pool.
        available_roles: Vec<String>,
    },

    /// The round changed phase.
    PhaseChanged {
        /// New phase.
        phase: GamePhase,
    },

    /// The action-phase turn pointer moved.
    TurnPassed {
        /// Identity whose turn it is now.
        player: Username,
    },

    /// A player's coin balance changed.
    CoinsChanged {
        /// Player affected.
        player: Username,
        /// Balance after the change.
        coins: u32,
    },

    /// Cards were drawn for one player only.
    CardsOffered {
        /// Player the offer is for.
        player: Username,
        /// Offered district ids.
        cards: Vec<String>,
    },

    /// A district was added to a hand.
    CardTaken {
        /// Player affected.
        player: Username,
        /// District id taken.
        card: String,
    },

    /// A district moved from hand to built.
    DistrictBuilt {
        /// Player affected.
        player: Username,
        /// District id built.
        card: String,
    },
}
