//! Turn-phase state machine.
//!
//! The phase is a closed tagged union and every legal transition is a named
//! method on [`TurnTracker`], so the set of successor states is enumerable
//! and testable. The cycle is:
//!
//! ```text
//! FirstRound -> SecondRound -> Rolling -> {Playing | Discarding} -> Robbing
//!     -> Playing -> Rolling -> ...
//! ```
//!
//! The two opening rounds visit the seats in order 0..N-1 and then N-1..0;
//! afterwards play proceeds clockwise from seat 0.

use crate::board::PlayerId;
use serde::{Deserialize, Serialize};

/// The current mode of the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    /// Opening placements, seats 0..N-1, one free settlement + road each
    FirstRound,
    /// Opening placements in reverse order; the second settlement pays out
    SecondRound,
    /// The active player must roll
    Rolling,
    /// A seven was rolled; the listed seats still owe half their hand
    Discarding { remaining: Vec<PlayerId> },
    /// The active player must place the robber
    Robbing,
    /// Free play: build, trade, buy and play cards, finish the turn
    Playing,
}

impl TurnPhase {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            TurnPhase::FirstRound => "first round",
            TurnPhase::SecondRound => "second round",
            TurnPhase::Rolling => "rolling",
            TurnPhase::Discarding { .. } => "discarding",
            TurnPhase::Robbing => "robbing",
            TurnPhase::Playing => "playing",
        }
    }
}

/// Tracks the phase and the active seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnTracker {
    phase: TurnPhase,
    active: PlayerId,
    seats: u8,
}

impl TurnTracker {
    /// A fresh tracker: first round, seat 0 to act.
    pub fn new(seats: u8) -> Self {
        Self {
            phase: TurnPhase::FirstRound,
            active: 0,
            seats,
        }
    }

    /// The current phase.
    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    /// The seat whose turn it is.
    pub fn active(&self) -> PlayerId {
        self.active
    }

    /// Number of seats in the game.
    pub fn seats(&self) -> u8 {
        self.seats
    }

    /// Whether the game is still in an opening round.
    pub fn in_opening(&self) -> bool {
        matches!(self.phase, TurnPhase::FirstRound | TurnPhase::SecondRound)
    }

    /// Advance after an opening settlement + road pair is complete.
    ///
    /// The first round walks forward; its last seat immediately places again
    /// as the second round walks backward; seat 0 ends the opening and rolls
    /// first.
    pub fn opening_pair_placed(&mut self) {
        match self.phase {
            TurnPhase::FirstRound => {
                if self.active + 1 == self.seats {
                    self.phase = TurnPhase::SecondRound;
                } else {
                    self.active += 1;
                }
            }
            TurnPhase::SecondRound => {
                if self.active == 0 {
                    self.phase = TurnPhase::Rolling;
                } else {
                    self.active -= 1;
                }
            }
            _ => unreachable!("opening placements only happen in the opening rounds"),
        }
    }

    /// Resolve a roll: a seven routes through discards or straight to the
    /// robber, anything else opens free play.
    pub fn roll_resolved(&mut self, rolled_seven: bool, must_discard: Vec<PlayerId>) {
        debug_assert_eq!(self.phase, TurnPhase::Rolling);
        self.phase = if !rolled_seven {
            TurnPhase::Playing
        } else if must_discard.is_empty() {
            TurnPhase::Robbing
        } else {
            TurnPhase::Discarding {
                remaining: must_discard,
            }
        };
    }

    /// Record one seat's completed discard. Once the list drains the robber
    /// phase begins.
    pub fn discard_done(&mut self, seat: PlayerId) {
        let TurnPhase::Discarding { remaining } = &mut self.phase else {
            unreachable!("discards only happen in the discarding phase");
        };
        remaining.retain(|p| *p != seat);
        if remaining.is_empty() {
            self.phase = TurnPhase::Robbing;
        }
    }

    /// The robber has been placed (theft or not); free play resumes.
    pub fn robber_resolved(&mut self) {
        debug_assert_eq!(self.phase, TurnPhase::Robbing);
        self.phase = TurnPhase::Playing;
    }

    /// End the active player's turn and hand the dice to the next seat.
    pub fn turn_finished(&mut self) {
        debug_assert_eq!(self.phase, TurnPhase::Playing);
        self.active = (self.active + 1) % self.seats;
        self.phase = TurnPhase::Rolling;
    }
}
