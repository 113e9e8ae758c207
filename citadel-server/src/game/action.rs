//! Action Resolver
//!
//! In-round economic moves. Every move requires the action phase and the
//! caller's turn; a completed move passes the turn to the next seat,
//! wrapping around the fixed turn order.

use crate::game::catalog::district_ids;
use crate::game::events::GameEvent;
use crate::game::state::{Game, GamePhase, Username};
use crate::game::GameError;

impl Game {
    /// Gain `coins_per_take` coins and end the turn.
    pub fn take_coins(&mut self, who: &Username) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(who, GamePhase::Action)?;

        let gain = self.rules.coins_per_take;
        let player = self.player_mut(who)?;
        player.coins = player.coins.saturating_add(gain);
        let coins = player.coins;

        let mut events = vec![GameEvent::CoinsChanged {
            player: who.clone(),
            coins,
        }];
        events.push(self.advance_turn());
        Ok(events)
    }

    /// Draw district cards for `who` to choose from.
    ///
    /// Does not end the turn; the turn completes with `pick_card`.
    pub fn request_cards(&mut self, who: &Username) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(who, GamePhase::Action)?;

        let deck = district_ids();
        let cards = self
            .rng
            .sample_with_replacement(&deck, self.rules.cards_offered);
        self.player_mut(who)?.pending_offer = Some(cards.clone());

        Ok(vec![GameEvent::CardsOffered {
            player: who.clone(),
            cards,
        }])
    }

    /// Put `card` into `who`'s hand and end the turn.
    ///
    /// The card is not checked against the last offer.
    pub fn pick_card(&mut self, who: &Username, card: &str) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(who, GamePhase::Action)?;
        let card = card.trim();
        if card.is_empty() {
            return Err(GameError::InvalidCard);
        }

        let player = self.player_mut(who)?;
        player.hand.push(card.to_string());
        player.pending_offer = None;

        let mut events = vec![GameEvent::CardTaken {
            player: who.clone(),
            card: card.to_string(),
        }];
        events.push(self.advance_turn());
        Ok(events)
    }

    /// Move one copy of `card` from hand to built, pay the flat cost and end
    /// the turn.
    pub fn build_district(&mut self, who: &Username, card: &str) -> Result<Vec<GameEvent>, GameError> {
        self.require_turn(who, GamePhase::Action)?;

        let cost = self.rules.build_cost;
        let player = self.player_mut(who)?;
        let Some(pos) = player.hand.iter().position(|c| c == card) else {
            return Err(GameError::CardNotInHand(card.to_string()));
        };

        let built = player.hand.remove(pos);
        player.built.push(built.clone());
        player.coins = player.coins.saturating_sub(cost);
        let coins = player.coins;

        let mut events = vec![
            GameEvent::DistrictBuilt {
                player: who.clone(),
                card: built,
            },
            GameEvent::CoinsChanged {
                player: who.clone(),
                coins,
            },
        ];
        events.push(self.advance_turn());
        Ok(events)
    }

    fn advance_turn(&mut self) -> GameEvent {
        self.turn_index = (self.turn_index + 1) % self.order.len();
        self.actions_taken += 1;
        GameEvent::TurnPassed {
            player: self.current_player().clone(),
        }
    }
}
