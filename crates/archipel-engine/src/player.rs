//! Per-seat player state.
//!
//! A player owns a resource hand and three development-card piles: cards
//! bought this turn (`fresh`, unplayable until the turn ends), playable cards
//! (`ready`), and played cards (`spent`, kept so card counts stay zero-sum
//! and the army size can be derived). Victory points are always recomputed
//! from the board and these piles, never stored.

use crate::board::PlayerId;
use crate::ledger::{DevCard, Ledger, ResourceKind};
use serde::{Deserialize, Serialize};

/// Piece pool sizes at game start.
pub const STARTING_ROADS: u32 = 15;
pub const STARTING_SETTLEMENTS: u32 = 5;
pub const STARTING_CITIES: u32 = 4;

/// One seat's mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Seat index (0..N-1)
    pub seat: PlayerId,
    /// Display name, set when the actor claims the seat
    pub name: String,
    /// Whether an actor has claimed this seat
    pub joined: bool,
    /// Resource cards in hand
    pub hand: Ledger<ResourceKind>,
    /// Development cards bought this turn; cannot be played until next turn
    pub fresh: Ledger<DevCard>,
    /// Development cards available to play
    pub ready: Ledger<DevCard>,
    /// Development cards already played
    pub spent: Ledger<DevCard>,
    /// Road pieces remaining
    pub roads_left: u32,
    /// Settlement pieces remaining
    pub settlements_left: u32,
    /// City pieces remaining
    pub cities_left: u32,
    /// Whether this seat holds the longest-route award
    pub has_longest_route: bool,
    /// Whether this seat holds the largest-army award
    pub has_largest_army: bool,
}

impl Player {
    /// Create an unclaimed seat.
    pub fn new(seat: PlayerId) -> Self {
        Self {
            seat,
            name: String::new(),
            joined: false,
            hand: Ledger::new(),
            fresh: Ledger::new(),
            ready: Ledger::new(),
            spent: Ledger::new(),
            roads_left: STARTING_ROADS,
            settlements_left: STARTING_SETTLEMENTS,
            cities_left: STARTING_CITIES,
            has_longest_route: false,
            has_largest_army: false,
        }
    }

    /// Soldiers this player has played, the size of their army.
    pub fn army_size(&self) -> u32 {
        self.spent.count(DevCard::Soldier)
    }

    /// Victory-point cards held, counting unplayable ones too.
    pub fn point_cards(&self) -> u32 {
        self.fresh.count(DevCard::VictoryPoint) + self.ready.count(DevCard::VictoryPoint)
    }

    /// Victory points from awards and cards; building points are counted
    /// from the board.
    pub fn bonus_points(&self) -> u32 {
        let mut points = self.point_cards();
        if self.has_longest_route {
            points += 2;
        }
        if self.has_largest_army {
            points += 2;
        }
        points
    }

    /// Move this turn's purchases into the playable pile. Called when the
    /// player's turn ends.
    pub fn promote_fresh_cards(&mut self) {
        let fresh = self.fresh.clone();
        self.fresh
            .transfer_all(&mut self.ready, &fresh)
            .expect("a ledger always covers itself");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fresh_cards_become_ready_at_turn_end() {
        let mut player = Player::new(0);
        player.fresh.grant(DevCard::Soldier, 1);
        player.fresh.grant(DevCard::Monopoly, 1);
        assert_eq!(player.ready.total(), 0);

        player.promote_fresh_cards();

        assert!(player.fresh.is_empty());
        assert_eq!(player.ready.count(DevCard::Soldier), 1);
        assert_eq!(player.ready.count(DevCard::Monopoly), 1);
    }

    #[test]
    fn bonus_points_add_up() {
        let mut player = Player::new(2);
        assert_eq!(player.bonus_points(), 0);

        player.has_longest_route = true;
        assert_eq!(player.bonus_points(), 2);

        player.has_largest_army = true;
        assert_eq!(player.bonus_points(), 4);

        // A point card counts even while fresh.
        player.fresh.grant(DevCard::VictoryPoint, 1);
        player.ready.grant(DevCard::VictoryPoint, 1);
        assert_eq!(player.bonus_points(), 6);
    }

    #[test]
    fn army_size_tracks_spent_soldiers() {
        let mut player = Player::new(1);
        player.ready.grant(DevCard::Soldier, 2);
        assert_eq!(player.army_size(), 0);

        let mut spent = Ledger::new();
        player.ready.transfer(&mut spent, DevCard::Soldier, 1).unwrap();
        player.spent = spent;
        assert_eq!(player.army_size(), 1);
    }
}
