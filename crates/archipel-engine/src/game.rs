//! The game-state aggregate and every rule-checked mutation.
//!
//! [`GameState`] composes the board, the players, the bank and deck ledgers
//! and the turn tracker. Every mutating operation is a [`Command`] applied
//! through [`GameState::apply`], which follows one contract:
//!
//! 1. the paired `can_*` legality predicate runs first; on failure a
//!    [`RuleViolation`] is returned and **nothing** has changed,
//! 2. all resource and piece movements happen as one all-or-nothing step,
//! 3. a descriptive entry is appended to the game log,
//! 4. the version counter increments exactly once.
//!
//! Commands carry resolved randomness, so `apply` is deterministic: replaying
//! a recorded command sequence against a snapshot rebuilds the exact state.

use crate::board::{Board, BoundsError, ConstructionError, PlayerId, MIN_LONGEST_ROUTE};
use crate::command::{Command, LogEntry, TradeOffer};
use crate::hex::{EdgeCoord, HexCoord, VertexCoord};
use crate::ledger::{self, costs, DevCard, Ledger, ResourceKind, ResourceShortfall};
use crate::player::Player;
use crate::turn::{TurnPhase, TurnTracker};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Victory points needed to win.
pub const VICTORY_POINTS_TO_WIN: u32 = 10;

/// Largest-army award requires at least this many played soldiers.
pub const MIN_LARGEST_ARMY: u32 = 3;

/// A seven forces seats holding at least this many cards to discard half.
pub const DISCARD_THRESHOLD: u32 = 8;

/// A rejected action. Raised by the legality predicates before any state
/// change, so the failing command has no side effects.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RuleViolation {
    #[error("not this seat's turn")]
    NotYourTurn,

    #[error("action is not legal in the current phase")]
    WrongPhase,

    #[error("not every seat has been claimed yet")]
    NotReady,

    #[error("the game is already over")]
    GameOver,

    #[error("no such seat")]
    UnknownSeat,

    #[error("seat is already claimed")]
    SeatTaken,

    #[error("illegal placement")]
    IllegalPlacement,

    #[error(transparent)]
    OutOfBounds(#[from] BoundsError),

    #[error("no pieces of that kind remaining")]
    NoPiecesLeft,

    #[error(transparent)]
    Shortfall(#[from] ResourceShortfall),

    #[error("the development deck is empty")]
    DeckEmpty,

    #[error("no such card ready to play")]
    CardNotReady,

    #[error("a development card was already played this turn")]
    CardAlreadyPlayed,

    #[error("a trade offer is already pending")]
    TradeAlreadyPending,

    #[error("no trade offer is pending")]
    NoPendingTrade,

    #[error("this seat is not a party to the pending trade")]
    NotTradeParty,

    #[error("trade is malformed")]
    BadTrade,

    #[error("discard does not match the required amount")]
    BadDiscard,

    #[error("robber victim is not eligible")]
    BadVictim,

    #[error("command arguments are malformed")]
    MalformedCommand,
}

/// Complete authoritative state of one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    board: Board,
    players: Vec<Player>,
    bank: Ledger<ResourceKind>,
    deck: Ledger<DevCard>,
    turn: TurnTracker,
    pending_trade: Option<TradeOffer>,
    log: Vec<LogEntry>,
    version: u64,
    winner: Option<PlayerId>,
    last_roll: Option<u8>,
    /// The settlement just placed in an opening visit; its road must attach
    opening_anchor: Option<VertexCoord>,
    card_played_this_turn: bool,
}

impl GameState {
    /// Create a game with `seats` unclaimed seats on the given board.
    pub fn new(seats: u8, board: Board) -> Result<Self, ConstructionError> {
        if !(2..=4).contains(&seats) {
            return Err(ConstructionError::BadSeatCount(seats));
        }
        Ok(Self {
            board,
            players: (0..seats).map(Player::new).collect(),
            bank: ledger::bank(),
            deck: ledger::dev_deck(),
            turn: TurnTracker::new(seats),
            pending_trade: None,
            log: Vec::new(),
            version: 0,
            winner: None,
            last_roll: None,
            opening_anchor: None,
            card_played_this_turn: false,
        })
    }

    // ==================== Accessors ====================

    /// Version counter: incremented by every accepted mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// All seats.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// One seat, if it exists.
    pub fn player(&self, seat: PlayerId) -> Option<&Player> {
        self.players.get(seat as usize)
    }

    /// The bank's resource ledger.
    pub fn bank(&self) -> &Ledger<ResourceKind> {
        &self.bank
    }

    /// The development deck ledger.
    pub fn deck(&self) -> &Ledger<DevCard> {
        &self.deck
    }

    /// Phase and active seat.
    pub fn turn(&self) -> &TurnTracker {
        &self.turn
    }

    /// The single outstanding trade offer, if any.
    pub fn pending_trade(&self) -> Option<&TradeOffer> {
        self.pending_trade.as_ref()
    }

    /// The append-only event/chat log.
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// The winning seat, set once the victory threshold is crossed.
    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    /// The most recent dice total.
    pub fn last_roll(&self) -> Option<u8> {
        self.last_roll
    }

    /// Whether every seat has been claimed.
    pub fn is_ready(&self) -> bool {
        self.players.iter().all(|p| p.joined)
    }

    /// A seat's victory points, recomputed from the board and its piles.
    pub fn score(&self, seat: PlayerId) -> u32 {
        let building_points: u32 = self
            .board
            .municipalities()
            .filter(|(_, m)| m.owner() == seat)
            .map(|(_, m)| m.points())
            .sum();
        let bonus = self
            .player(seat)
            .map(|p| p.bonus_points())
            .unwrap_or_default();
        building_points + bonus
    }

    /// Seats that can be robbed at `hex`: adjacent to it, not the thief, and
    /// holding at least one card.
    pub fn eligible_victims(&self, thief: PlayerId, hex: &HexCoord) -> Vec<PlayerId> {
        self.board
            .players_adjacent_to(hex)
            .into_iter()
            .filter(|seat| {
                *seat != thief && self.player(*seat).is_some_and(|p| !p.hand.is_empty())
            })
            .collect()
    }

    // ==================== Seat Registration ====================

    /// Claim a seat for a named actor. Seats are claimed in order by the
    /// service; play cannot begin until all are taken.
    pub fn register_player(&mut self, seat: PlayerId, name: &str) -> Result<(), RuleViolation> {
        let player = self
            .players
            .get_mut(seat as usize)
            .ok_or(RuleViolation::UnknownSeat)?;
        if player.joined {
            return Err(RuleViolation::SeatTaken);
        }
        player.joined = true;
        player.name = name.to_string();
        let text = format!("{name} claimed seat {seat}");
        self.commit(seat, text, false);
        Ok(())
    }

    // ==================== Legality Predicates ====================

    /// Whether `player` may place a free opening settlement at `vertex`.
    pub fn can_place_opening_settlement(
        &self,
        player: PlayerId,
        vertex: &VertexCoord,
    ) -> Result<(), RuleViolation> {
        self.ensure_turn(player)?;
        if !self.turn.in_opening() {
            return Err(RuleViolation::WrongPhase);
        }
        if self.opening_anchor.is_some() {
            // The settlement of this visit is already down; a road is owed.
            return Err(RuleViolation::WrongPhase);
        }
        if self.players[player as usize].settlements_left == 0 {
            return Err(RuleViolation::NoPiecesLeft);
        }
        if !self.board.settlement_allowed(player, vertex, false)? {
            return Err(RuleViolation::IllegalPlacement);
        }
        Ok(())
    }

    /// Whether `player` may place the free road attached to the settlement
    /// just placed.
    pub fn can_place_opening_road(
        &self,
        player: PlayerId,
        edge: &EdgeCoord,
    ) -> Result<(), RuleViolation> {
        self.ensure_turn(player)?;
        if !self.turn.in_opening() {
            return Err(RuleViolation::WrongPhase);
        }
        let anchor = self.opening_anchor.ok_or(RuleViolation::WrongPhase)?;
        if self.players[player as usize].roads_left == 0 {
            return Err(RuleViolation::NoPiecesLeft);
        }
        if !edge.canonical().endpoints().contains(&anchor) {
            return Err(RuleViolation::IllegalPlacement);
        }
        if !self.board.road_allowed(player, edge)? {
            return Err(RuleViolation::IllegalPlacement);
        }
        Ok(())
    }

    /// Whether `player` may roll.
    pub fn can_roll(&self, player: PlayerId) -> Result<(), RuleViolation> {
        self.ensure_turn(player)?;
        if *self.turn.phase() != TurnPhase::Rolling {
            return Err(RuleViolation::WrongPhase);
        }
        Ok(())
    }

    /// Whether `player` may discard `hand` right now: the seat must be on
    /// the discard list and the hand must be exactly half its cards, rounded
    /// down.
    pub fn can_discard(
        &self,
        player: PlayerId,
        hand: &Ledger<ResourceKind>,
    ) -> Result<(), RuleViolation> {
        self.ensure_live_seat(player)?;
        let TurnPhase::Discarding { remaining } = self.turn.phase() else {
            return Err(RuleViolation::WrongPhase);
        };
        if !remaining.contains(&player) {
            return Err(RuleViolation::NotYourTurn);
        }
        let owned = &self.players[player as usize].hand;
        if hand.total() != owned.total() / 2 {
            return Err(RuleViolation::BadDiscard);
        }
        if let Some(shortfall) = owned.deficit(hand) {
            return Err(shortfall.into());
        }
        Ok(())
    }

    /// Whether `player` may move the robber to `hex` robbing `victim`.
    /// A victim must be chosen exactly when one is eligible.
    pub fn can_move_robber(
        &self,
        player: PlayerId,
        hex: &HexCoord,
        victim: Option<PlayerId>,
    ) -> Result<(), RuleViolation> {
        self.ensure_turn(player)?;
        if *self.turn.phase() != TurnPhase::Robbing {
            return Err(RuleViolation::WrongPhase);
        }
        self.check_robbery(player, hex, victim)
    }

    /// Whether `player` may build a road at `edge`.
    pub fn can_place_road(&self, player: PlayerId, edge: &EdgeCoord) -> Result<(), RuleViolation> {
        self.ensure_playing(player)?;
        let p = &self.players[player as usize];
        if p.roads_left == 0 {
            return Err(RuleViolation::NoPiecesLeft);
        }
        if !self.board.road_allowed(player, edge)? {
            return Err(RuleViolation::IllegalPlacement);
        }
        if let Some(shortfall) = p.hand.deficit(&costs::road()) {
            return Err(shortfall.into());
        }
        Ok(())
    }

    /// Whether `player` may build a settlement at `vertex`.
    pub fn can_place_settlement(
        &self,
        player: PlayerId,
        vertex: &VertexCoord,
    ) -> Result<(), RuleViolation> {
        self.ensure_playing(player)?;
        let p = &self.players[player as usize];
        if p.settlements_left == 0 {
            return Err(RuleViolation::NoPiecesLeft);
        }
        if !self.board.settlement_allowed(player, vertex, true)? {
            return Err(RuleViolation::IllegalPlacement);
        }
        if let Some(shortfall) = p.hand.deficit(&costs::settlement()) {
            return Err(shortfall.into());
        }
        Ok(())
    }

    /// Whether `player` may upgrade their settlement at `vertex` to a city.
    pub fn can_upgrade_city(
        &self,
        player: PlayerId,
        vertex: &VertexCoord,
    ) -> Result<(), RuleViolation> {
        self.ensure_playing(player)?;
        let p = &self.players[player as usize];
        if p.cities_left == 0 {
            return Err(RuleViolation::NoPiecesLeft);
        }
        if !self.board.city_allowed(player, vertex)? {
            return Err(RuleViolation::IllegalPlacement);
        }
        if let Some(shortfall) = p.hand.deficit(&costs::city()) {
            return Err(shortfall.into());
        }
        Ok(())
    }

    /// Whether `player` may buy a development card.
    pub fn can_buy_dev_card(&self, player: PlayerId) -> Result<(), RuleViolation> {
        self.ensure_playing(player)?;
        if self.deck.is_empty() {
            return Err(RuleViolation::DeckEmpty);
        }
        if let Some(shortfall) = self.players[player as usize].hand.deficit(&costs::dev_card()) {
            return Err(shortfall.into());
        }
        Ok(())
    }

    /// Whether `player` may play a soldier moving the robber to `hex`.
    pub fn can_play_soldier(
        &self,
        player: PlayerId,
        hex: &HexCoord,
        victim: Option<PlayerId>,
    ) -> Result<(), RuleViolation> {
        self.ensure_card_play(player, DevCard::Soldier)?;
        self.check_robbery(player, hex, victim)
    }

    /// Whether `player` may play road building over the two edges, placed in
    /// order.
    pub fn can_play_road_building(
        &self,
        player: PlayerId,
        first: &EdgeCoord,
        second: &EdgeCoord,
    ) -> Result<(), RuleViolation> {
        self.ensure_card_play(player, DevCard::RoadBuilding)?;
        if self.players[player as usize].roads_left < 2 {
            return Err(RuleViolation::NoPiecesLeft);
        }
        if !self.board.road_allowed(player, first)? {
            return Err(RuleViolation::IllegalPlacement);
        }
        // The second road may chain off the first; probe on a scratch board
        // so failure leaves no trace.
        let mut probe = self.board.clone();
        probe.place_road(*first, player);
        if !probe.road_allowed(player, second)? {
            return Err(RuleViolation::IllegalPlacement);
        }
        Ok(())
    }

    /// Whether `player` may play year of plenty for the two picks.
    pub fn can_play_year_of_plenty(
        &self,
        player: PlayerId,
        first: ResourceKind,
        second: ResourceKind,
    ) -> Result<(), RuleViolation> {
        self.ensure_card_play(player, DevCard::YearOfPlenty)?;
        let mut want = Ledger::new();
        want.grant(first, 1);
        want.grant(second, 1);
        if let Some(shortfall) = self.bank.deficit(&want) {
            return Err(shortfall.into());
        }
        Ok(())
    }

    /// Whether `player` may play monopoly.
    pub fn can_play_monopoly(&self, player: PlayerId) -> Result<(), RuleViolation> {
        self.ensure_card_play(player, DevCard::Monopoly)
    }

    /// Whether `player` may put `offer` on the table.
    pub fn can_offer_trade(
        &self,
        player: PlayerId,
        offer: &TradeOffer,
    ) -> Result<(), RuleViolation> {
        self.ensure_playing(player)?;
        if offer.from != player || !offer.is_well_formed() {
            return Err(RuleViolation::BadTrade);
        }
        if let Some(to) = offer.to {
            if self.player(to).is_none() {
                return Err(RuleViolation::UnknownSeat);
            }
        }
        if self.pending_trade.is_some() {
            return Err(RuleViolation::TradeAlreadyPending);
        }
        if let Some(shortfall) = self.players[player as usize].hand.deficit(&offer.give) {
            return Err(shortfall.into());
        }
        Ok(())
    }

    /// Whether `player` may accept the pending offer. Both hands are
    /// re-validated here: they may have changed since the offer was made.
    pub fn can_accept_trade(&self, player: PlayerId) -> Result<(), RuleViolation> {
        self.ensure_live_seat(player)?;
        let offer = self
            .pending_trade
            .as_ref()
            .ok_or(RuleViolation::NoPendingTrade)?;
        if player == offer.from {
            return Err(RuleViolation::NotTradeParty);
        }
        if matches!(offer.to, Some(to) if to != player) {
            return Err(RuleViolation::NotTradeParty);
        }
        if let Some(shortfall) = self.players[offer.from as usize].hand.deficit(&offer.give) {
            return Err(shortfall.into());
        }
        if let Some(shortfall) = self.players[player as usize].hand.deficit(&offer.take) {
            return Err(shortfall.into());
        }
        Ok(())
    }

    /// Whether `player` may decline or withdraw the pending offer.
    pub fn can_decline_trade(&self, player: PlayerId) -> Result<(), RuleViolation> {
        self.ensure_live_seat(player)?;
        let offer = self
            .pending_trade
            .as_ref()
            .ok_or(RuleViolation::NoPendingTrade)?;
        let party = player == offer.from || offer.to.is_none() || offer.to == Some(player);
        if !party {
            return Err(RuleViolation::NotTradeParty);
        }
        Ok(())
    }

    /// Whether `player` may trade `give` for `receive` with the bank at
    /// their best port rate.
    pub fn can_maritime_trade(
        &self,
        player: PlayerId,
        give: ResourceKind,
        receive: ResourceKind,
    ) -> Result<(), RuleViolation> {
        self.ensure_playing(player)?;
        if give == receive {
            return Err(RuleViolation::BadTrade);
        }
        let rate = self.board.port_rate(player, give);
        let mut owed = Ledger::new();
        owed.grant(give, rate);
        if let Some(shortfall) = self.players[player as usize].hand.deficit(&owed) {
            return Err(shortfall.into());
        }
        let mut want = Ledger::new();
        want.grant(receive, 1);
        if let Some(shortfall) = self.bank.deficit(&want) {
            return Err(shortfall.into());
        }
        Ok(())
    }

    /// Whether `player` may end their turn.
    pub fn can_finish_turn(&self, player: PlayerId) -> Result<(), RuleViolation> {
        self.ensure_playing(player)
    }

    // ==================== Command Application ====================

    /// Apply one command. On rejection the state is untouched; on success
    /// the version has advanced by exactly one.
    pub fn apply(&mut self, command: &Command) -> Result<(), RuleViolation> {
        match command {
            Command::PlaceOpeningSettlement { player, vertex } => {
                let (player, vertex) = (*player, vertex.canonical());
                self.can_place_opening_settlement(player, &vertex)?;
                self.board.place_settlement(vertex, player);
                self.players[player as usize].settlements_left -= 1;
                self.opening_anchor = Some(vertex);

                let mut text = format!("{} placed an opening settlement", self.name_of(player));
                // Only the second settlement pays out, and only from what the
                // bank can cover.
                if *self.turn.phase() == TurnPhase::SecondRound {
                    let mut granted: Vec<ResourceKind> = Vec::new();
                    for hex in vertex.touching_hexes() {
                        let Some(kind) = self.board.tile(&hex).and_then(|t| t.resource()) else {
                            continue;
                        };
                        if self.bank.count(kind) > 0 {
                            self.bank
                                .transfer(&mut self.players[player as usize].hand, kind, 1)
                                .expect("bank balance checked above");
                            granted.push(kind);
                        }
                    }
                    if !granted.is_empty() {
                        text = format!("{text}, collecting {} starting cards", granted.len());
                    }
                }
                self.commit(player, text, false);
            }

            Command::PlaceOpeningRoad { player, edge } => {
                let (player, edge) = (*player, edge.canonical());
                self.can_place_opening_road(player, &edge)?;
                self.board.place_road(edge, player);
                self.players[player as usize].roads_left -= 1;
                self.opening_anchor = None;
                self.turn.opening_pair_placed();
                self.recount_longest_route();
                let text = format!("{} placed an opening road", self.name_of(player));
                self.commit(player, text, false);
            }

            Command::Roll { player, dice } => {
                let player = *player;
                self.can_roll(player)?;
                if !(1..=6).contains(&dice.0) || !(1..=6).contains(&dice.1) {
                    return Err(RuleViolation::MalformedCommand);
                }
                let total = dice.0 + dice.1;
                self.last_roll = Some(total);

                let mut text = format!("{} rolled a {total}", self.name_of(player));
                if total == 7 {
                    let must_discard: Vec<PlayerId> = self
                        .players
                        .iter()
                        .filter(|p| p.hand.total() >= DISCARD_THRESHOLD)
                        .map(|p| p.seat)
                        .collect();
                    if !must_discard.is_empty() {
                        text = format!("{text}; {} seat(s) must discard", must_discard.len());
                    }
                    self.turn.roll_resolved(true, must_discard);
                } else {
                    let mut cards = 0;
                    for (seat, kind, due) in self.board.yield_for_roll(total) {
                        // The bank can run dry; grant what it still holds.
                        let granted = due.min(self.bank.count(kind));
                        if granted > 0 {
                            self.bank
                                .transfer(&mut self.players[seat as usize].hand, kind, granted)
                                .expect("bank balance checked above");
                            cards += granted;
                        }
                    }
                    if cards > 0 {
                        text = format!("{text}, producing {cards} cards");
                    }
                    self.turn.roll_resolved(false, Vec::new());
                }
                self.commit(player, text, false);
            }

            Command::Discard { player, hand } => {
                let player = *player;
                self.can_discard(player, hand)?;
                self.players[player as usize]
                    .hand
                    .transfer_all(&mut self.bank, hand)
                    .expect("discard hand verified by can_discard");
                self.turn.discard_done(player);
                let text = format!("{} discarded {} cards", self.name_of(player), hand.total());
                self.commit(player, text, false);
            }

            Command::MoveRobber {
                player,
                hex,
                victim,
                loot,
            } => {
                let player = *player;
                self.can_move_robber(player, hex, *victim)?;
                self.check_loot(*victim, *loot)?;
                self.resolve_robbery(player, *hex, *victim, *loot);
                self.turn.robber_resolved();
                let text = match victim {
                    Some(victim) => format!(
                        "{} moved the robber and robbed {}",
                        self.name_of(player),
                        self.name_of(*victim)
                    ),
                    None => format!("{} moved the robber", self.name_of(player)),
                };
                self.commit(player, text, false);
            }

            Command::PlaceRoad { player, edge } => {
                let (player, edge) = (*player, edge.canonical());
                self.can_place_road(player, &edge)?;
                self.players[player as usize]
                    .hand
                    .transfer_all(&mut self.bank, &costs::road())
                    .expect("cost verified by can_place_road");
                self.board.place_road(edge, player);
                self.players[player as usize].roads_left -= 1;
                self.recount_longest_route();
                let text = format!("{} built a road", self.name_of(player));
                self.commit(player, text, false);
            }

            Command::PlaceSettlement { player, vertex } => {
                let (player, vertex) = (*player, vertex.canonical());
                self.can_place_settlement(player, &vertex)?;
                self.players[player as usize]
                    .hand
                    .transfer_all(&mut self.bank, &costs::settlement())
                    .expect("cost verified by can_place_settlement");
                self.board.place_settlement(vertex, player);
                self.players[player as usize].settlements_left -= 1;
                // A new settlement can sever an opposing route.
                self.recount_longest_route();
                let text = format!("{} built a settlement", self.name_of(player));
                self.commit(player, text, false);
            }

            Command::UpgradeCity { player, vertex } => {
                let (player, vertex) = (*player, vertex.canonical());
                self.can_upgrade_city(player, &vertex)?;
                self.players[player as usize]
                    .hand
                    .transfer_all(&mut self.bank, &costs::city())
                    .expect("cost verified by can_upgrade_city");
                self.board.upgrade_city(vertex, player);
                let p = &mut self.players[player as usize];
                p.cities_left -= 1;
                // The settlement piece returns to the pool.
                p.settlements_left += 1;
                let text = format!("{} raised a city", self.name_of(player));
                self.commit(player, text, false);
            }

            Command::BuyDevCard { player, card } => {
                let (player, card) = (*player, *card);
                self.can_buy_dev_card(player)?;
                if self.deck.count(card) == 0 {
                    return Err(RuleViolation::MalformedCommand);
                }
                self.players[player as usize]
                    .hand
                    .transfer_all(&mut self.bank, &costs::dev_card())
                    .expect("cost verified by can_buy_dev_card");
                self.deck
                    .transfer(&mut self.players[player as usize].fresh, card, 1)
                    .expect("deck count checked above");
                let text = format!("{} bought a development card", self.name_of(player));
                self.commit(player, text, false);
            }

            Command::PlaySoldier {
                player,
                hex,
                victim,
                loot,
            } => {
                let player = *player;
                self.can_play_soldier(player, hex, *victim)?;
                self.check_loot(*victim, *loot)?;
                self.spend_card(player, DevCard::Soldier);
                self.resolve_robbery(player, *hex, *victim, *loot);
                self.recount_largest_army();
                let text = format!("{} marched a soldier", self.name_of(player));
                self.commit(player, text, false);
            }

            Command::PlayRoadBuilding {
                player,
                first,
                second,
            } => {
                let player = *player;
                self.can_play_road_building(player, first, second)?;
                self.spend_card(player, DevCard::RoadBuilding);
                self.board.place_road(first.canonical(), player);
                self.board.place_road(second.canonical(), player);
                self.players[player as usize].roads_left -= 2;
                self.recount_longest_route();
                let text = format!("{} played road building", self.name_of(player));
                self.commit(player, text, false);
            }

            Command::PlayYearOfPlenty {
                player,
                first,
                second,
            } => {
                let player = *player;
                self.can_play_year_of_plenty(player, *first, *second)?;
                self.spend_card(player, DevCard::YearOfPlenty);
                let mut want = Ledger::new();
                want.grant(*first, 1);
                want.grant(*second, 1);
                self.bank
                    .transfer_all(&mut self.players[player as usize].hand, &want)
                    .expect("bank balance verified by can_play_year_of_plenty");
                let text = format!("{} played year of plenty", self.name_of(player));
                self.commit(player, text, false);
            }

            Command::PlayMonopoly { player, kind } => {
                let (player, kind) = (*player, *kind);
                self.can_play_monopoly(player)?;
                self.spend_card(player, DevCard::Monopoly);
                let mut collected = 0;
                for seat in 0..self.players.len() as PlayerId {
                    if seat == player {
                        continue;
                    }
                    let n = self.players[seat as usize].hand.count(kind);
                    if n > 0 {
                        let (from, to) = self.pair_mut(seat, player);
                        from.hand
                            .transfer(&mut to.hand, kind, n)
                            .expect("count read above");
                        collected += n;
                    }
                }
                let text = format!(
                    "{} played monopoly, collecting {collected} cards",
                    self.name_of(player)
                );
                self.commit(player, text, false);
            }

            Command::OfferTrade { player, offer } => {
                let player = *player;
                self.can_offer_trade(player, offer)?;
                self.pending_trade = Some(offer.clone());
                let text = match offer.to {
                    Some(to) => format!(
                        "{} offered a trade to {}",
                        self.name_of(player),
                        self.name_of(to)
                    ),
                    None => format!("{} offered a trade to the table", self.name_of(player)),
                };
                self.commit(player, text, false);
            }

            Command::AcceptTrade { player } => {
                let player = *player;
                self.can_accept_trade(player)?;
                let offer = self
                    .pending_trade
                    .take()
                    .expect("pending trade verified by can_accept_trade");
                let (offerer, acceptor) = self.pair_mut(offer.from, player);
                offerer
                    .hand
                    .transfer_all(&mut acceptor.hand, &offer.give)
                    .expect("hands re-validated by can_accept_trade");
                acceptor
                    .hand
                    .transfer_all(&mut offerer.hand, &offer.take)
                    .expect("hands re-validated by can_accept_trade");
                let text = format!(
                    "{} accepted {}'s trade",
                    self.name_of(player),
                    self.name_of(offer.from)
                );
                self.commit(player, text, false);
            }

            Command::DeclineTrade { player } => {
                let player = *player;
                self.can_decline_trade(player)?;
                let offer = self
                    .pending_trade
                    .take()
                    .expect("pending trade verified by can_decline_trade");
                let text = if player == offer.from {
                    format!("{} withdrew their trade offer", self.name_of(player))
                } else {
                    format!("{} declined the trade offer", self.name_of(player))
                };
                self.commit(player, text, false);
            }

            Command::MaritimeTrade {
                player,
                give,
                receive,
            } => {
                let (player, give, receive) = (*player, *give, *receive);
                self.can_maritime_trade(player, give, receive)?;
                let rate = self.board.port_rate(player, give);
                self.players[player as usize]
                    .hand
                    .transfer(&mut self.bank, give, rate)
                    .expect("hand verified by can_maritime_trade");
                self.bank
                    .transfer(&mut self.players[player as usize].hand, receive, 1)
                    .expect("bank verified by can_maritime_trade");
                let text = format!("{} traded {rate}:1 with the bank", self.name_of(player));
                self.commit(player, text, false);
            }

            Command::FinishTurn { player } => {
                let player = *player;
                self.can_finish_turn(player)?;
                self.pending_trade = None;
                self.players[player as usize].promote_fresh_cards();
                self.card_played_this_turn = false;
                self.last_roll = None;
                self.turn.turn_finished();
                let text = format!("{} finished their turn", self.name_of(player));
                self.commit(player, text, false);
            }

            Command::SendChat { player, message } => {
                let player = *player;
                // Chat stays open before all seats join and after the game
                // ends; it only needs a real seat.
                if self.player(player).is_none() {
                    return Err(RuleViolation::UnknownSeat);
                }
                self.commit(player, message.clone(), true);
            }
        }
        Ok(())
    }

    // ==================== Guards ====================

    fn ensure_live_seat(&self, player: PlayerId) -> Result<(), RuleViolation> {
        if self.winner.is_some() {
            return Err(RuleViolation::GameOver);
        }
        if self.player(player).is_none() {
            return Err(RuleViolation::UnknownSeat);
        }
        if !self.is_ready() {
            return Err(RuleViolation::NotReady);
        }
        Ok(())
    }

    fn ensure_turn(&self, player: PlayerId) -> Result<(), RuleViolation> {
        self.ensure_live_seat(player)?;
        if self.turn.active() != player {
            return Err(RuleViolation::NotYourTurn);
        }
        Ok(())
    }

    fn ensure_playing(&self, player: PlayerId) -> Result<(), RuleViolation> {
        self.ensure_turn(player)?;
        if *self.turn.phase() != TurnPhase::Playing {
            return Err(RuleViolation::WrongPhase);
        }
        Ok(())
    }

    fn ensure_card_play(&self, player: PlayerId, card: DevCard) -> Result<(), RuleViolation> {
        self.ensure_playing(player)?;
        if self.card_played_this_turn {
            return Err(RuleViolation::CardAlreadyPlayed);
        }
        if self.players[player as usize].ready.count(card) == 0 {
            return Err(RuleViolation::CardNotReady);
        }
        Ok(())
    }

    /// Shared robbery legality: target hex valid, and a victim chosen
    /// exactly when one is eligible.
    fn check_robbery(
        &self,
        player: PlayerId,
        hex: &HexCoord,
        victim: Option<PlayerId>,
    ) -> Result<(), RuleViolation> {
        if !self.board.robber_target_allowed(hex)? {
            return Err(RuleViolation::IllegalPlacement);
        }
        let victims = self.eligible_victims(player, hex);
        match victim {
            Some(v) if !victims.contains(&v) => Err(RuleViolation::BadVictim),
            None if !victims.is_empty() => Err(RuleViolation::BadVictim),
            _ => Ok(()),
        }
    }

    /// Validate the resolved theft against the victim's actual hand. An
    /// eligible victim always has a card, so a victim without loot (or loot
    /// the victim does not hold) is a malformed record.
    fn check_loot(
        &self,
        victim: Option<PlayerId>,
        loot: Option<ResourceKind>,
    ) -> Result<(), RuleViolation> {
        match (victim, loot) {
            (None, None) => Ok(()),
            (Some(victim), Some(kind))
                if self.players[victim as usize].hand.count(kind) > 0 =>
            {
                Ok(())
            }
            _ => Err(RuleViolation::MalformedCommand),
        }
    }

    // ==================== Mutation Helpers ====================

    /// Relocate the robber and execute the already-validated theft.
    fn resolve_robbery(
        &mut self,
        player: PlayerId,
        hex: HexCoord,
        victim: Option<PlayerId>,
        loot: Option<ResourceKind>,
    ) {
        if let (Some(victim), Some(kind)) = (victim, loot) {
            let (from, to) = self.pair_mut(victim, player);
            from.hand
                .transfer(&mut to.hand, kind, 1)
                .expect("loot verified by check_loot");
        }
        self.board.move_robber(hex);
    }

    fn spend_card(&mut self, player: PlayerId, card: DevCard) {
        let p = &mut self.players[player as usize];
        p.ready
            .transfer(&mut p.spent, card, 1)
            .expect("readiness verified by ensure_card_play");
        self.card_played_this_turn = true;
    }

    fn pair_mut(&mut self, a: PlayerId, b: PlayerId) -> (&mut Player, &mut Player) {
        debug_assert_ne!(a, b);
        let (a, b) = (a as usize, b as usize);
        if a < b {
            let (left, right) = self.players.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.players.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    fn name_of(&self, seat: PlayerId) -> String {
        self.player(seat)
            .map(|p| p.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("seat {seat}"))
    }

    /// Recompute the longest-route award. The holder is cleared when nobody
    /// meets the minimum and changes only when strictly exceeded.
    fn recount_longest_route(&mut self) {
        let lengths: Vec<u32> = self
            .players
            .iter()
            .map(|p| self.board.longest_route(p.seat))
            .collect();
        let holder = self
            .players
            .iter()
            .find(|p| p.has_longest_route)
            .map(|p| p.seat);
        let new_holder = Self::award_holder(&lengths, holder, MIN_LONGEST_ROUTE);
        if new_holder != holder {
            for player in &mut self.players {
                player.has_longest_route = Some(player.seat) == new_holder;
            }
            let text = match new_holder {
                Some(seat) => format!(
                    "{} now holds the longest route ({} segments)",
                    self.name_of(seat),
                    lengths[seat as usize]
                ),
                None => "the longest route award is unclaimed".to_string(),
            };
            self.log.push(LogEntry {
                seat: new_holder.or(holder).unwrap_or_default(),
                text,
                chat: false,
            });
        }
    }

    /// Recompute the largest-army award with the same holder rules.
    fn recount_largest_army(&mut self) {
        let armies: Vec<u32> = self.players.iter().map(|p| p.army_size()).collect();
        let holder = self
            .players
            .iter()
            .find(|p| p.has_largest_army)
            .map(|p| p.seat);
        let new_holder = Self::award_holder(&armies, holder, MIN_LARGEST_ARMY);
        if new_holder != holder {
            for player in &mut self.players {
                player.has_largest_army = Some(player.seat) == new_holder;
            }
            let text = match new_holder {
                Some(seat) => format!(
                    "{} now commands the largest army ({} soldiers)",
                    self.name_of(seat),
                    armies[seat as usize]
                ),
                None => "the largest army award is unclaimed".to_string(),
            };
            self.log.push(LogEntry {
                seat: new_holder.or(holder).unwrap_or_default(),
                text,
                chat: false,
            });
        }
    }

    fn award_holder(scores: &[u32], holder: Option<PlayerId>, minimum: u32) -> Option<PlayerId> {
        let best = scores.iter().copied().max().unwrap_or(0);
        if best < minimum {
            return None;
        }
        if let Some(h) = holder {
            // Ties never dethrone the current holder.
            if scores[h as usize] == best {
                return Some(h);
            }
        }
        let bests: Vec<PlayerId> = scores
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == best)
            .map(|(i, _)| i as PlayerId)
            .collect();
        if bests.len() == 1 {
            Some(bests[0])
        } else {
            // Two challengers strictly past the holder but tied with each
            // other: nobody takes the award.
            None
        }
    }

    fn refresh_winner(&mut self) {
        if self.winner.is_some() {
            return;
        }
        let winner = (0..self.players.len() as PlayerId)
            .find(|seat| self.score(*seat) >= VICTORY_POINTS_TO_WIN);
        if let Some(seat) = winner {
            self.winner = Some(seat);
            self.log.push(LogEntry {
                seat,
                text: format!(
                    "{} wins with {} victory points",
                    self.name_of(seat),
                    self.score(seat)
                ),
                chat: false,
            });
        }
    }

    /// Close out an accepted mutation: log line, winner check, one version
    /// increment.
    fn commit(&mut self, seat: PlayerId, text: String, chat: bool) {
        self.log.push(LogEntry { seat, text, chat });
        self.refresh_winner();
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::flat_board;
    use crate::board::Municipality;
    use crate::hex::{EdgeDirection, VertexDirection};
    use pretty_assertions::assert_eq;

    fn ready_game(seats: u8) -> GameState {
        let mut game = GameState::new(seats, flat_board()).unwrap();
        for seat in 0..seats {
            game.register_player(seat, &format!("P{seat}")).unwrap();
        }
        game
    }

    fn complete_opening(game: &mut GameState) {
        while game.turn().in_opening() {
            let seat = game.turn().active();
            let vertex = game.board().settlement_spots(seat, false)[0];
            game.apply(&Command::PlaceOpeningSettlement {
                player: seat,
                vertex,
            })
            .unwrap();
            let edge = vertex
                .touching_edges()
                .into_iter()
                .find(|e| game.board().road_allowed(seat, e) == Ok(true))
                .unwrap();
            game.apply(&Command::PlaceOpeningRoad { player: seat, edge })
                .unwrap();
        }
    }

    /// Opening placements done and a 6 rolled: seat 0 in the playing phase.
    fn playing_game(seats: u8) -> GameState {
        let mut game = ready_game(seats);
        complete_opening(&mut game);
        game.apply(&Command::Roll {
            player: 0,
            dice: (2, 4),
        })
        .unwrap();
        assert_eq!(*game.turn().phase(), TurnPhase::Playing);
        game
    }

    fn resource_totals(game: &GameState) -> Vec<u32> {
        ResourceKind::ALL
            .iter()
            .map(|kind| {
                game.bank().count(*kind)
                    + game
                        .players()
                        .iter()
                        .map(|p| p.hand.count(*kind))
                        .sum::<u32>()
            })
            .collect()
    }

    #[test]
    fn seats_must_fill_before_play() {
        let mut game = GameState::new(3, flat_board()).unwrap();
        game.register_player(0, "Ada").unwrap();

        let vertex = VertexCoord::new(HexCoord::ORIGIN, VertexDirection::NorthWest);
        let err = game
            .apply(&Command::PlaceOpeningSettlement { player: 0, vertex })
            .unwrap_err();
        assert_eq!(err, RuleViolation::NotReady);

        assert_eq!(
            game.register_player(0, "Bea").unwrap_err(),
            RuleViolation::SeatTaken
        );

        game.register_player(1, "Bea").unwrap();
        game.register_player(2, "Col").unwrap();
        assert!(game.is_ready());
        assert_eq!(game.version(), 3, "each join is one mutation");
    }

    #[test]
    fn opening_rounds_pay_out_only_second_settlement() {
        let mut game = ready_game(3);
        let versions_before = game.version();

        // First round: nobody collects anything.
        for _ in 0..3 {
            let seat = game.turn().active();
            let vertex = game.board().settlement_spots(seat, false)[0];
            game.apply(&Command::PlaceOpeningSettlement {
                player: seat,
                vertex,
            })
            .unwrap();
            let edge = vertex
                .touching_edges()
                .into_iter()
                .find(|e| game.board().road_allowed(seat, e) == Ok(true))
                .unwrap();
            game.apply(&Command::PlaceOpeningRoad { player: seat, edge })
                .unwrap();
        }
        assert_eq!(*game.turn().phase(), TurnPhase::SecondRound);
        assert!(game.players().iter().all(|p| p.hand.is_empty()));

        complete_opening(&mut game);
        assert_eq!(*game.turn().phase(), TurnPhase::Rolling);
        assert_eq!(game.turn().active(), 0);

        // Every second settlement touches at least one producing tile on the
        // uniform board.
        for player in game.players() {
            assert!(player.hand.total() >= 1);
            assert!(player.hand.total() <= 3);
            assert_eq!(player.settlements_left, 3);
            assert_eq!(player.roads_left, 13);
        }
        assert_eq!(resource_totals(&game), vec![19; 5]);
        // Twelve placements, one version each.
        assert_eq!(game.version(), versions_before + 12);
    }

    #[test]
    fn opening_road_must_attach_to_fresh_settlement() {
        let mut game = ready_game(2);
        let vertex = game.board().settlement_spots(0, false)[0];

        // Road before settlement is out of order.
        let edge = vertex.touching_edges()[0];
        assert_eq!(
            game.apply(&Command::PlaceOpeningRoad { player: 0, edge }),
            Err(RuleViolation::WrongPhase)
        );

        game.apply(&Command::PlaceOpeningSettlement { player: 0, vertex })
            .unwrap();

        // A second settlement in the same visit is out of order too.
        let other = game.board().settlement_spots(0, false)[0];
        assert_eq!(
            game.apply(&Command::PlaceOpeningSettlement {
                player: 0,
                vertex: other
            }),
            Err(RuleViolation::WrongPhase)
        );

        // A road somewhere else on the board does not attach.
        let detached = EdgeCoord::new(HexCoord::new(2, 0), EdgeDirection::North);
        let err = game
            .apply(&Command::PlaceOpeningRoad {
                player: 0,
                edge: detached,
            })
            .unwrap_err();
        assert_eq!(err, RuleViolation::IllegalPlacement);
    }

    #[test]
    fn roll_distributes_and_opens_play() {
        let mut game = ready_game(2);
        complete_opening(&mut game);

        let before: Vec<u32> = game.players().iter().map(|p| p.hand.total()).collect();
        game.apply(&Command::Roll {
            player: 0,
            dice: (2, 3),
        })
        .unwrap();

        assert_eq!(*game.turn().phase(), TurnPhase::Playing);
        assert_eq!(game.last_roll(), Some(5));
        // Every municipality touches a 5-chit tile on the uniform board.
        for (player, total) in game.players().iter().zip(before) {
            assert!(player.hand.total() > total);
        }
        assert_eq!(resource_totals(&game), vec![19; 5]);
    }

    #[test]
    fn rolling_out_of_phase_or_turn_is_rejected() {
        let mut game = ready_game(2);
        complete_opening(&mut game);

        assert_eq!(
            game.apply(&Command::Roll {
                player: 1,
                dice: (1, 2)
            }),
            Err(RuleViolation::NotYourTurn)
        );
        assert_eq!(
            game.apply(&Command::Roll {
                player: 0,
                dice: (9, 1)
            }),
            Err(RuleViolation::MalformedCommand)
        );

        game.apply(&Command::Roll {
            player: 0,
            dice: (3, 3),
        })
        .unwrap();
        assert_eq!(
            game.apply(&Command::Roll {
                player: 0,
                dice: (3, 3)
            }),
            Err(RuleViolation::WrongPhase)
        );
    }

    #[test]
    fn seven_requires_discards_from_fat_hands() {
        let mut game = ready_game(2);
        complete_opening(&mut game);

        // Fill seat 1's hand to nine cards out of the bank so the per-kind
        // totals stay intact.
        let top_up = 9 - game.players[1].hand.total();
        game.bank
            .transfer(&mut game.players[1].hand, ResourceKind::Grain, top_up)
            .unwrap();
        game.apply(&Command::Roll {
            player: 0,
            dice: (3, 4),
        })
        .unwrap();
        assert_eq!(
            *game.turn().phase(),
            TurnPhase::Discarding { remaining: vec![1] }
        );

        // Wrong count is rejected without touching the hand.
        let short = Ledger::from_counts(&[(ResourceKind::Grain, 3)]);
        assert_eq!(
            game.apply(&Command::Discard {
                player: 1,
                hand: short
            }),
            Err(RuleViolation::BadDiscard)
        );
        assert_eq!(game.players[1].hand.total(), 9);

        // floor(9 / 2) = 4 cards go back to the bank.
        let owed = Ledger::from_counts(&[(ResourceKind::Grain, 4)]);
        game.apply(&Command::Discard {
            player: 1,
            hand: owed,
        })
        .unwrap();
        assert_eq!(game.players[1].hand.total(), 5);
        assert_eq!(*game.turn().phase(), TurnPhase::Robbing);
        assert_eq!(resource_totals(&game), vec![19; 5]);
    }

    #[test]
    fn seven_with_small_hands_skips_discarding() {
        let mut game = ready_game(2);
        complete_opening(&mut game);
        game.apply(&Command::Roll {
            player: 0,
            dice: (3, 4),
        })
        .unwrap();
        assert_eq!(*game.turn().phase(), TurnPhase::Robbing);
    }

    #[test]
    fn robbery_steals_one_resolved_card() {
        let mut game = ready_game(2);
        complete_opening(&mut game);
        game.apply(&Command::Roll {
            player: 0,
            dice: (3, 4),
        })
        .unwrap();

        // Find a hex adjacent to one of seat 1's municipalities.
        let (vertex, _) = game
            .board()
            .municipalities()
            .find(|(_, m)| m.owner() == 1)
            .map(|(v, m)| (*v, *m))
            .unwrap();
        let target = *vertex
            .touching_hexes()
            .iter()
            .find(|h| game.board().robber_target_allowed(h) == Ok(true))
            .unwrap();

        let loot = game.players[1].hand.iter().next().map(|(k, _)| k);
        assert!(loot.is_some(), "opening payout left seat 1 with cards");

        // Robbing without naming the eligible victim is rejected.
        assert_eq!(
            game.apply(&Command::MoveRobber {
                player: 0,
                hex: target,
                victim: None,
                loot: None
            }),
            Err(RuleViolation::BadVictim)
        );

        let thief_before = game.players[0].hand.total();
        let victim_before = game.players[1].hand.total();
        game.apply(&Command::MoveRobber {
            player: 0,
            hex: target,
            victim: Some(1),
            loot,
        })
        .unwrap();

        assert_eq!(game.board().robber(), target);
        assert_eq!(game.players[0].hand.total(), thief_before + 1);
        assert_eq!(game.players[1].hand.total(), victim_before - 1);
        assert_eq!(*game.turn().phase(), TurnPhase::Playing);
    }

    #[test]
    fn robbery_without_victims_still_relocates() {
        let mut game = ready_game(2);
        complete_opening(&mut game);
        game.apply(&Command::Roll {
            player: 0,
            dice: (3, 4),
        })
        .unwrap();

        // A hex with no adjacent municipalities at all.
        let target = *HexCoord::hexes_within_radius(2)
            .iter()
            .find(|h| {
                game.board().robber_target_allowed(h) == Ok(true)
                    && game.board().players_adjacent_to(h).is_empty()
            })
            .expect("uniform board leaves empty hexes");

        game.apply(&Command::MoveRobber {
            player: 0,
            hex: target,
            victim: None,
            loot: None,
        })
        .unwrap();
        assert_eq!(game.board().robber(), target);
        assert_eq!(*game.turn().phase(), TurnPhase::Playing);
    }

    #[test]
    fn building_costs_are_charged_and_verified() {
        let mut game = playing_game(2);
        game.players[0].hand = Ledger::new();

        let spot = game.board().road_spots(0)[0];
        let version = game.version();
        let err = game
            .apply(&Command::PlaceRoad {
                player: 0,
                edge: spot,
            })
            .unwrap_err();
        assert!(matches!(err, RuleViolation::Shortfall(_)));
        assert_eq!(game.version(), version, "rejections do not bump the version");

        game.players[0].hand = costs::road();
        game.apply(&Command::PlaceRoad {
            player: 0,
            edge: spot,
        })
        .unwrap();
        assert!(game.players[0].hand.is_empty());
        assert_eq!(game.players[0].roads_left, 12);
        assert_eq!(game.board().road(&spot).unwrap().owner, 0);
        assert_eq!(game.version(), version + 1);
    }

    #[test]
    fn settlement_requires_distance_and_connection() {
        let mut game = playing_game(2);
        game.players[0].hand = costs::settlement();

        // Directly beside an existing municipality: distance rule.
        let (occupied, _) = game
            .board()
            .municipalities()
            .find(|(_, m)| m.owner() == 0)
            .map(|(v, m)| (*v, *m))
            .unwrap();
        let beside = occupied
            .adjacent_vertices()
            .into_iter()
            .find(|v| game.board().all_vertices().contains(v))
            .unwrap();
        assert_eq!(
            game.apply(&Command::PlaceSettlement {
                player: 0,
                vertex: beside
            }),
            Err(RuleViolation::IllegalPlacement)
        );

        // Far from any road: connectivity.
        let unconnected = game
            .board()
            .settlement_spots(0, false)
            .into_iter()
            .find(|v| !game.board().settlement_spots(0, true).contains(v))
            .unwrap();
        assert_eq!(
            game.apply(&Command::PlaceSettlement {
                player: 0,
                vertex: unconnected
            }),
            Err(RuleViolation::IllegalPlacement)
        );
    }

    #[test]
    fn city_upgrade_returns_settlement_piece() {
        let mut game = playing_game(2);
        game.players[0].hand = costs::city();

        let spot = game.board().city_spots(0)[0];
        let settlements_before = game.players[0].settlements_left;
        game.apply(&Command::UpgradeCity {
            player: 0,
            vertex: spot,
        })
        .unwrap();

        assert_eq!(
            game.board().municipality(&spot),
            Some(Municipality::City(0))
        );
        assert_eq!(game.players[0].cities_left, 3);
        assert_eq!(game.players[0].settlements_left, settlements_before + 1);
        assert_eq!(game.score(0), 3, "two settlements and a city");
    }

    #[test]
    fn bought_cards_ripen_at_turn_end() {
        let mut game = playing_game(2);
        game.players[0].hand = costs::dev_card();

        game.apply(&Command::BuyDevCard {
            player: 0,
            card: DevCard::Soldier,
        })
        .unwrap();
        assert_eq!(game.deck().count(DevCard::Soldier), 13);
        assert_eq!(game.players[0].fresh.count(DevCard::Soldier), 1);

        // Fresh cards cannot be played this turn.
        let target = HexCoord::new(2, 0);
        assert_eq!(
            game.apply(&Command::PlaySoldier {
                player: 0,
                hex: target,
                victim: None,
                loot: None
            }),
            Err(RuleViolation::CardNotReady)
        );

        game.apply(&Command::FinishTurn { player: 0 }).unwrap();
        assert_eq!(game.players[0].ready.count(DevCard::Soldier), 1);
        assert!(game.players[0].fresh.is_empty());
    }

    #[test]
    fn one_card_per_turn() {
        let mut game = playing_game(2);
        game.players[0].ready.grant(DevCard::YearOfPlenty, 2);

        game.apply(&Command::PlayYearOfPlenty {
            player: 0,
            first: ResourceKind::Ore,
            second: ResourceKind::Ore,
        })
        .unwrap();
        assert_eq!(game.players[0].hand.count(ResourceKind::Ore), 2);

        assert_eq!(
            game.apply(&Command::PlayYearOfPlenty {
                player: 0,
                first: ResourceKind::Wool,
                second: ResourceKind::Grain,
            }),
            Err(RuleViolation::CardAlreadyPlayed)
        );
    }

    #[test]
    fn road_building_places_a_chain() {
        let mut game = playing_game(2);
        game.players[0].ready.grant(DevCard::RoadBuilding, 1);

        // Chain the second road off the first.
        let first = game.board().road_spots(0)[0];
        let mut probe = game.board().clone();
        probe.place_road(first, 0);
        let second = *probe
            .road_spots(0)
            .iter()
            .find(|e| game.board().road(e).is_none() && **e != first)
            .unwrap();

        let roads_before = game.players[0].roads_left;
        game.apply(&Command::PlayRoadBuilding {
            player: 0,
            first,
            second,
        })
        .unwrap();
        assert_eq!(game.players[0].roads_left, roads_before - 2);
        assert!(game.board().road(&first).is_some());
        assert!(game.board().road(&second).is_some());
        assert!(game.players[0].hand.is_empty(), "road building is free");
    }

    #[test]
    fn monopoly_collects_every_copy() {
        let mut game = playing_game(3);
        game.players[0].ready.grant(DevCard::Monopoly, 1);
        game.players[1].hand = Ledger::from_counts(&[(ResourceKind::Wool, 3)]);
        game.players[2].hand =
            Ledger::from_counts(&[(ResourceKind::Wool, 1), (ResourceKind::Ore, 2)]);
        let mine_before = game.players[0].hand.count(ResourceKind::Wool);

        game.apply(&Command::PlayMonopoly {
            player: 0,
            kind: ResourceKind::Wool,
        })
        .unwrap();

        assert_eq!(
            game.players[0].hand.count(ResourceKind::Wool),
            mine_before + 4
        );
        assert_eq!(game.players[1].hand.count(ResourceKind::Wool), 0);
        assert_eq!(game.players[2].hand.count(ResourceKind::Wool), 0);
        assert_eq!(game.players[2].hand.count(ResourceKind::Ore), 2);
    }

    #[test]
    fn trade_lifecycle_enforces_single_offer_and_revalidation() {
        let mut game = playing_game(2);
        game.players[0].hand = Ledger::from_counts(&[(ResourceKind::Brick, 1)]);
        game.players[1].hand = Ledger::from_counts(&[(ResourceKind::Wool, 1)]);

        let offer = TradeOffer {
            from: 0,
            to: None,
            give: Ledger::from_counts(&[(ResourceKind::Brick, 1)]),
            take: Ledger::from_counts(&[(ResourceKind::Wool, 1)]),
        };
        game.apply(&Command::OfferTrade {
            player: 0,
            offer: offer.clone(),
        })
        .unwrap();

        // Only one offer may be outstanding.
        assert_eq!(
            game.apply(&Command::OfferTrade {
                player: 0,
                offer: offer.clone()
            }),
            Err(RuleViolation::TradeAlreadyPending)
        );

        // The acceptor's hand changed since the offer: re-validation fails
        // atomically.
        game.players[1].hand = Ledger::new();
        let err = game.apply(&Command::AcceptTrade { player: 1 }).unwrap_err();
        assert!(matches!(err, RuleViolation::Shortfall(_)));
        assert_eq!(game.players[0].hand.count(ResourceKind::Brick), 1);
        assert!(game.pending_trade().is_some());

        // Restock and complete the swap.
        game.players[1].hand = Ledger::from_counts(&[(ResourceKind::Wool, 1)]);
        game.apply(&Command::AcceptTrade { player: 1 }).unwrap();
        assert!(game.pending_trade().is_none());
        assert_eq!(game.players[0].hand.count(ResourceKind::Wool), 1);
        assert_eq!(game.players[1].hand.count(ResourceKind::Brick), 1);

        // Declining clears the table too.
        game.players[0].hand = Ledger::from_counts(&[(ResourceKind::Wool, 1)]);
        let offer = TradeOffer {
            from: 0,
            to: Some(1),
            give: Ledger::from_counts(&[(ResourceKind::Wool, 1)]),
            take: Ledger::from_counts(&[(ResourceKind::Brick, 1)]),
        };
        game.apply(&Command::OfferTrade { player: 0, offer }).unwrap();
        game.apply(&Command::DeclineTrade { player: 1 }).unwrap();
        assert!(game.pending_trade().is_none());
    }

    #[test]
    fn maritime_trade_uses_fallback_rate() {
        let mut game = playing_game(2);
        // The uniform board has no ports, so the rate is 4:1. Top the hand
        // up out of the bank to keep the per-kind totals intact.
        let top_up = 4 - game.players[0].hand.count(ResourceKind::Grain);
        game.bank
            .transfer(&mut game.players[0].hand, ResourceKind::Grain, top_up)
            .unwrap();

        game.apply(&Command::MaritimeTrade {
            player: 0,
            give: ResourceKind::Grain,
            receive: ResourceKind::Ore,
        })
        .unwrap();
        assert_eq!(game.players[0].hand.count(ResourceKind::Grain), 0);
        assert_eq!(game.players[0].hand.count(ResourceKind::Ore), 1);
        assert_eq!(resource_totals(&game), vec![19; 5]);
    }

    #[test]
    fn finishing_turn_resets_per_turn_state() {
        let mut game = playing_game(2);
        game.players[0].ready.grant(DevCard::Monopoly, 1);
        game.apply(&Command::PlayMonopoly {
            player: 0,
            kind: ResourceKind::Ore,
        })
        .unwrap();

        game.apply(&Command::FinishTurn { player: 0 }).unwrap();
        assert_eq!(game.turn().active(), 1);
        assert_eq!(*game.turn().phase(), TurnPhase::Rolling);
        assert_eq!(game.last_roll(), None);

        // The next seat may play a card again.
        game.apply(&Command::Roll {
            player: 1,
            dice: (2, 4),
        })
        .unwrap();
        game.players[1].ready.grant(DevCard::Monopoly, 1);
        game.apply(&Command::PlayMonopoly {
            player: 1,
            kind: ResourceKind::Ore,
        })
        .unwrap();
    }

    #[test]
    fn longest_route_award_needs_four_segments() {
        let mut game = ready_game(2);

        // Scripted opening with known geometry: seat 0 anchors a westward
        // chain at the desert's northwest corner.
        let v0 = VertexCoord::new(HexCoord::ORIGIN, VertexDirection::NorthWest);
        let e1 = EdgeCoord::new(HexCoord::ORIGIN, EdgeDirection::North);
        game.apply(&Command::PlaceOpeningSettlement { player: 0, vertex: v0 })
            .unwrap();
        game.apply(&Command::PlaceOpeningRoad { player: 0, edge: e1 })
            .unwrap();

        let v1 = VertexCoord::new(HexCoord::new(-2, 0), VertexDirection::NorthEast);
        game.apply(&Command::PlaceOpeningSettlement { player: 1, vertex: v1 })
            .unwrap();
        game.apply(&Command::PlaceOpeningRoad {
            player: 1,
            edge: EdgeCoord::new(HexCoord::new(-2, 0), EdgeDirection::North),
        })
        .unwrap();
        let v2 = VertexCoord::new(HexCoord::new(-2, 1), VertexDirection::NorthWest);
        game.apply(&Command::PlaceOpeningSettlement { player: 1, vertex: v2 })
            .unwrap();
        game.apply(&Command::PlaceOpeningRoad {
            player: 1,
            edge: EdgeCoord::new(HexCoord::new(-2, 1), EdgeDirection::North),
        })
        .unwrap();
        let v3 = VertexCoord::new(HexCoord::new(1, -2), VertexDirection::NorthEast);
        game.apply(&Command::PlaceOpeningSettlement { player: 0, vertex: v3 })
            .unwrap();
        game.apply(&Command::PlaceOpeningRoad {
            player: 0,
            edge: EdgeCoord::new(HexCoord::new(1, -2), EdgeDirection::North),
        })
        .unwrap();

        game.apply(&Command::Roll {
            player: 0,
            dice: (2, 4),
        })
        .unwrap();

        // Extend e1 eastward to a chain of four.
        let extensions = [
            EdgeCoord::new(HexCoord::ORIGIN, EdgeDirection::NorthEast),
            EdgeCoord::new(HexCoord::new(1, 0), EdgeDirection::North),
            EdgeCoord::new(HexCoord::new(1, 0), EdgeDirection::NorthEast),
        ];
        for (i, edge) in extensions.iter().enumerate() {
            game.players[0].hand = costs::road();
            game.apply(&Command::PlaceRoad { player: 0, edge: *edge })
                .unwrap();
            let length = game.board().longest_route(0);
            assert_eq!(length, i as u32 + 2);
            assert_eq!(
                game.players[0].has_longest_route,
                length >= MIN_LONGEST_ROUTE,
                "award tracks the four-segment minimum"
            );
        }
        assert_eq!(game.score(0), 4, "two settlements plus the route award");
    }

    #[test]
    fn largest_army_award_needs_three_soldiers() {
        let mut game = playing_game(2);
        game.players[0].ready.grant(DevCard::Soldier, 3);

        let targets = [HexCoord::new(2, 0), HexCoord::new(1, 1), HexCoord::new(2, 0)];
        for (i, hex) in targets.iter().enumerate() {
            game.apply(&Command::PlaySoldier {
                player: 0,
                hex: *hex,
                victim: None,
                loot: None,
            })
            .unwrap();
            assert_eq!(game.players[0].army_size(), i as u32 + 1);

            if i < 2 {
                assert!(!game.players[0].has_largest_army);
                // Cycle a full round so the next soldier is playable.
                game.apply(&Command::FinishTurn { player: 0 }).unwrap();
                game.apply(&Command::Roll {
                    player: 1,
                    dice: (2, 4),
                })
                .unwrap();
                game.apply(&Command::FinishTurn { player: 1 }).unwrap();
                game.apply(&Command::Roll {
                    player: 0,
                    dice: (2, 4),
                })
                .unwrap();
            }
        }
        assert!(game.players[0].has_largest_army);
        assert_eq!(game.players[0].bonus_points(), 2);
    }

    #[test]
    fn winner_locks_the_game_except_chat() {
        let mut game = playing_game(2);

        // Hoist seat 0 to the threshold: the next accepted mutation detects
        // the win.
        game.players[0].ready.grant(DevCard::VictoryPoint, 8);
        assert!(game.winner().is_none());
        game.apply(&Command::FinishTurn { player: 0 }).unwrap();

        assert_eq!(game.winner(), Some(0));
        assert_eq!(
            game.apply(&Command::Roll {
                player: 1,
                dice: (2, 4)
            }),
            Err(RuleViolation::GameOver)
        );

        // Chat still flows.
        game.apply(&Command::SendChat {
            player: 1,
            message: "good game".into(),
        })
        .unwrap();
        let last = game.log().last().unwrap();
        assert!(last.chat);
        assert_eq!(last.text, "good game");
    }

    #[test]
    fn log_grows_and_versions_count_mutations() {
        let mut game = ready_game(2);
        let version = game.version();
        let log_len = game.log().len();

        game.apply(&Command::SendChat {
            player: 0,
            message: "hello".into(),
        })
        .unwrap();
        assert_eq!(game.version(), version + 1);
        assert_eq!(game.log().len(), log_len + 1);

        let bad = game.apply(&Command::FinishTurn { player: 0 });
        assert!(bad.is_err());
        assert_eq!(game.version(), version + 1, "rejections leave no trace");
        assert_eq!(game.log().len(), log_len + 1);
    }
}
