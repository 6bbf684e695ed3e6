//! The closed set of mutating commands.
//!
//! Every accepted mutation of a [`crate::game::GameState`] is one of these
//! variants. The set is closed and strongly typed so the replay log's schema
//! is statically checkable: a malformed entry fails to deserialize instead
//! of silently dispatching.
//!
//! Commands carry *resolved* randomness. The caller rolls the dice, draws
//! the card, and picks the stolen resource before building the command, so
//! applying a command is deterministic and replaying a recorded log
//! reproduces state exactly.

use crate::board::PlayerId;
use crate::hex::{EdgeCoord, HexCoord, VertexCoord};
use crate::ledger::{DevCard, Ledger, ResourceKind};
use serde::{Deserialize, Serialize};

/// A trade offer between seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    /// Seat making the offer
    pub from: PlayerId,
    /// Specific seat addressed, or None for an open offer
    pub to: Option<PlayerId>,
    /// Resources the offerer gives away
    pub give: Ledger<ResourceKind>,
    /// Resources the offerer wants back
    pub take: Ledger<ResourceKind>,
}

impl TradeOffer {
    /// An offer must move something in both directions.
    pub fn is_well_formed(&self) -> bool {
        !self.give.is_empty() && !self.take.is_empty() && self.to != Some(self.from)
    }
}

/// One mutating operation against a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    // ==================== Opening Rounds ====================
    /// Place a free settlement during the opening rounds
    PlaceOpeningSettlement { player: PlayerId, vertex: VertexCoord },
    /// Place the free road attached to the settlement just placed
    PlaceOpeningRoad { player: PlayerId, edge: EdgeCoord },

    // ==================== Dice ====================
    /// Roll the dice; the values are resolved by the caller
    Roll { player: PlayerId, dice: (u8, u8) },
    /// Give up half the hand after a seven
    Discard {
        player: PlayerId,
        hand: Ledger<ResourceKind>,
    },
    /// Place the robber and optionally rob an adjacent victim
    MoveRobber {
        player: PlayerId,
        hex: HexCoord,
        victim: Option<PlayerId>,
        /// The card drawn from the victim's hand, resolved by the caller
        loot: Option<ResourceKind>,
    },

    // ==================== Building ====================
    /// Build a road
    PlaceRoad { player: PlayerId, edge: EdgeCoord },
    /// Build a settlement
    PlaceSettlement { player: PlayerId, vertex: VertexCoord },
    /// Upgrade a settlement to a city
    UpgradeCity { player: PlayerId, vertex: VertexCoord },
    /// Buy a development card; the draw is resolved by the caller
    BuyDevCard { player: PlayerId, card: DevCard },

    // ==================== Development Cards ====================
    /// Play a soldier: relocate the robber and optionally rob
    PlaySoldier {
        player: PlayerId,
        hex: HexCoord,
        victim: Option<PlayerId>,
        loot: Option<ResourceKind>,
    },
    /// Play road building: two free roads, placed in order
    PlayRoadBuilding {
        player: PlayerId,
        first: EdgeCoord,
        second: EdgeCoord,
    },
    /// Play year of plenty: draw two bank cards
    PlayYearOfPlenty {
        player: PlayerId,
        first: ResourceKind,
        second: ResourceKind,
    },
    /// Play monopoly: collect every copy of one kind from every opponent
    PlayMonopoly { player: PlayerId, kind: ResourceKind },

    // ==================== Trading ====================
    /// Put a trade offer on the table
    OfferTrade { player: PlayerId, offer: TradeOffer },
    /// Accept the pending offer
    AcceptTrade { player: PlayerId },
    /// Decline or withdraw the pending offer
    DeclineTrade { player: PlayerId },
    /// Trade with the bank at the player's best port rate
    MaritimeTrade {
        player: PlayerId,
        give: ResourceKind,
        receive: ResourceKind,
    },

    // ==================== Turn Management ====================
    /// End the turn: bought cards become playable, the next seat rolls
    FinishTurn { player: PlayerId },

    // ==================== Chat ====================
    /// Append a chat line to the game log
    SendChat { player: PlayerId, message: String },
}

impl Command {
    /// The seat issuing this command.
    pub fn player(&self) -> PlayerId {
        match self {
            Command::PlaceOpeningSettlement { player, .. }
            | Command::PlaceOpeningRoad { player, .. }
            | Command::Roll { player, .. }
            | Command::Discard { player, .. }
            | Command::MoveRobber { player, .. }
            | Command::PlaceRoad { player, .. }
            | Command::PlaceSettlement { player, .. }
            | Command::UpgradeCity { player, .. }
            | Command::BuyDevCard { player, .. }
            | Command::PlaySoldier { player, .. }
            | Command::PlayRoadBuilding { player, .. }
            | Command::PlayYearOfPlenty { player, .. }
            | Command::PlayMonopoly { player, .. }
            | Command::OfferTrade { player, .. }
            | Command::AcceptTrade { player }
            | Command::DeclineTrade { player }
            | Command::MaritimeTrade { player, .. }
            | Command::FinishTurn { player }
            | Command::SendChat { player, .. } => *player,
        }
    }
}

/// One line of the append-only game log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Seat the line is about
    pub seat: PlayerId,
    /// Human-readable description
    pub text: String,
    /// Whether this is player chat rather than an engine event
    pub chat: bool,
}
