//! Synchronized public gateway to the rule engine.
//!
//! [`GameHub`] owns every live game. Each game's session sits behind its own
//! async mutex inside a [`DashMap`], so concurrently arriving actions
//! against one game serialize while different games proceed independently.
//! Every mutating operation resolves the actor to a seat through the
//! session's own roster (no process-global lookup), resolves randomness,
//! applies the command, and journals it inside the same critical section -
//! the journal's order must equal apply order. Snapshot serialization and
//! the response happen after the lock is released.
//!
//! Every `do` operation has a side-effect-free `can` twin returning the
//! typed failure an attempt would produce.

use crate::config::ServiceConfig;
use crate::journal::Journal;
use crate::protocol::{ActorId, GameId, SeatAssignment, Snapshot};
use crate::store::{CommandRecord, GameStore, PersistenceFailure};
use archipel_engine::{
    Board, Command, ConstructionError, EdgeCoord, GameState, HexCoord, Ledger, PlayerId,
    ResourceKind, RuleViolation, TradeOffer, VertexCoord,
};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// A failed facade operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown game {0}")]
    UnknownGame(GameId),

    #[error("actor is not seated in this game")]
    UnknownActor,

    #[error("every seat is already taken")]
    SeatsFull,

    #[error("rejected: {0}")]
    Rejected(#[from] RuleViolation),

    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),

    #[error("game setup failed: {0}")]
    Construction(#[from] ConstructionError),
}

/// One live game: state, roster, randomness and its journal.
struct GameSession {
    state: GameState,
    roster: HashMap<ActorId, PlayerId>,
    seats: Vec<SeatAssignment>,
    rng: StdRng,
    journal: Journal,
}

impl GameSession {
    fn seat_of(&self, actor: ActorId) -> Result<PlayerId, ServiceError> {
        self.roster
            .get(&actor)
            .copied()
            .ok_or(ServiceError::UnknownActor)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.state.version(),
            seats: self.seats.clone(),
            state: self.state.clone(),
        }
    }
}

/// The authoritative server's front door.
pub struct GameHub {
    store: Arc<dyn GameStore>,
    config: ServiceConfig,
    sessions: DashMap<GameId, Arc<Mutex<GameSession>>>,
}

impl GameHub {
    pub fn new(store: Arc<dyn GameStore>, config: ServiceConfig) -> Self {
        Self {
            store,
            config,
            sessions: DashMap::new(),
        }
    }

    // ==================== Lifecycle ====================

    /// Create a game with `seats` open seats on a freshly generated board.
    /// The initial snapshot is persisted before the id is announced.
    pub async fn create_game(&self, seats: u8) -> Result<(GameId, Snapshot), ServiceError> {
        let game = GameId::random();
        let board = Board::standard_with_rng(&mut rand::thread_rng());
        let state = GameState::new(seats, board)?;
        let mut session = GameSession {
            state,
            roster: HashMap::new(),
            seats: Vec::new(),
            rng: StdRng::from_entropy(),
            journal: Journal::new(self.store.clone(), game, self.config.compact_after),
        };
        let snapshot = session.snapshot();
        session.journal.checkpoint(&snapshot).await?;
        self.sessions.insert(game, Arc::new(Mutex::new(session)));
        info!(%game, seats, "created game");
        Ok((game, snapshot))
    }

    /// Seat an actor. Joining is idempotent for an already-seated actor.
    /// Joins are made durable by a fresh checkpoint rather than a journal
    /// entry, so recovery always knows the roster.
    pub async fn join_game(
        &self,
        game: GameId,
        actor: ActorId,
        name: &str,
    ) -> Result<(PlayerId, Snapshot), ServiceError> {
        let session = self.session(game)?;
        let mut session = session.lock().await;
        if let Some(seat) = session.roster.get(&actor) {
            return Ok((*seat, session.snapshot()));
        }
        let seat = session.roster.len() as PlayerId;
        if seat as usize >= session.state.players().len() {
            return Err(ServiceError::SeatsFull);
        }
        session.state.register_player(seat, name)?;
        session.roster.insert(actor, seat);
        session.seats.push(SeatAssignment {
            actor,
            seat,
            name: name.to_string(),
        });
        let snapshot = session.snapshot();
        session.journal.checkpoint(&snapshot).await?;
        info!(%game, %actor, seat, "actor joined");
        Ok((seat, snapshot))
    }

    /// Games currently live in memory.
    pub fn games(&self) -> Vec<GameId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Games the store knows about, live or not.
    pub async fn stored_games(&self) -> Result<Vec<GameId>, ServiceError> {
        Ok(self.store.list_known_games().await?)
    }

    /// Rebuild a game from its snapshot plus logged commands and make it
    /// live. Replay is deterministic; the rebuilt state must reach exactly
    /// the version of the last logged command.
    pub async fn recover_game(&self, game: GameId) -> Result<Snapshot, ServiceError> {
        let snapshot = self
            .store
            .get_snapshot(game)
            .await?
            .ok_or(ServiceError::UnknownGame(game))?;
        let mut state = snapshot.state.clone();
        for record in self.store.list_commands(game).await? {
            if record.version <= state.version() {
                // Already folded into the snapshot.
                continue;
            }
            state.apply(&record.command).map_err(|violation| {
                PersistenceFailure::new(format!(
                    "journal replay rejected a logged command: {violation}"
                ))
            })?;
            if state.version() != record.version {
                return Err(ServiceError::Persistence(PersistenceFailure::new(
                    format!(
                        "replay version drift: reached {}, log says {}",
                        state.version(),
                        record.version
                    ),
                )));
            }
        }

        let roster = snapshot
            .seats
            .iter()
            .map(|assignment| (assignment.actor, assignment.seat))
            .collect();
        let session = GameSession {
            state,
            roster,
            seats: snapshot.seats,
            rng: StdRng::from_entropy(),
            journal: Journal::new(self.store.clone(), game, self.config.compact_after),
        };
        let snapshot = session.snapshot();
        self.sessions.insert(game, Arc::new(Mutex::new(session)));
        info!(%game, version = snapshot.version, "recovered game");
        Ok(snapshot)
    }

    // ==================== Synchronization ====================

    /// The current snapshot.
    pub async fn snapshot(&self, game: GameId) -> Result<Snapshot, ServiceError> {
        let session = self.session(game)?;
        let session = session.lock().await;
        Ok(session.snapshot())
    }

    /// State newer than `since`, or `None` when the observer is current.
    /// Whole-object, last-writer-wins: there is exactly one writer.
    pub async fn poll_newer(
        &self,
        game: GameId,
        since: u64,
    ) -> Result<Option<Snapshot>, ServiceError> {
        let session = self.session(game)?;
        let session = session.lock().await;
        if session.state.version() > since {
            Ok(Some(session.snapshot()))
        } else {
            Ok(None)
        }
    }

    // ==================== Mutating Operations ====================

    /// Place a free opening settlement.
    pub async fn place_opening_settlement(
        &self,
        game: GameId,
        actor: ActorId,
        vertex: VertexCoord,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::PlaceOpeningSettlement {
                player: seat,
                vertex,
            })
        })
        .await
    }

    /// Place the free opening road attached to the settlement just placed.
    pub async fn place_opening_road(
        &self,
        game: GameId,
        actor: ActorId,
        edge: EdgeCoord,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::PlaceOpeningRoad { player: seat, edge })
        })
        .await
    }

    /// Roll the dice.
    pub async fn roll_dice(&self, game: GameId, actor: ActorId) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, |_, seat, rng| {
            Ok(Command::Roll {
                player: seat,
                dice: (rng.gen_range(1..=6), rng.gen_range(1..=6)),
            })
        })
        .await
    }

    /// Discard half the hand after a seven.
    pub async fn discard(
        &self,
        game: GameId,
        actor: ActorId,
        hand: Ledger<ResourceKind>,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::Discard { player: seat, hand })
        })
        .await
    }

    /// Move the robber, robbing `victim` if one is named. The stolen card
    /// is drawn uniformly at random from the victim's hand here, so the
    /// logged command replays deterministically.
    pub async fn move_robber(
        &self,
        game: GameId,
        actor: ActorId,
        hex: HexCoord,
        victim: Option<PlayerId>,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |state, seat, rng| {
            let loot = resolve_loot(state, victim, rng);
            Ok(Command::MoveRobber {
                player: seat,
                hex,
                victim,
                loot,
            })
        })
        .await
    }

    /// Build a road.
    pub async fn place_road(
        &self,
        game: GameId,
        actor: ActorId,
        edge: EdgeCoord,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::PlaceRoad { player: seat, edge })
        })
        .await
    }

    /// Build a settlement.
    pub async fn place_settlement(
        &self,
        game: GameId,
        actor: ActorId,
        vertex: VertexCoord,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::PlaceSettlement {
                player: seat,
                vertex,
            })
        })
        .await
    }

    /// Upgrade a settlement to a city.
    pub async fn upgrade_city(
        &self,
        game: GameId,
        actor: ActorId,
        vertex: VertexCoord,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::UpgradeCity {
                player: seat,
                vertex,
            })
        })
        .await
    }

    /// Buy a development card; the draw happens here, weighted by what is
    /// left in the deck.
    pub async fn buy_dev_card(
        &self,
        game: GameId,
        actor: ActorId,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, |state, seat, rng| {
            let card = state
                .deck()
                .sample(rng)
                .ok_or(ServiceError::Rejected(RuleViolation::DeckEmpty))?;
            Ok(Command::BuyDevCard { player: seat, card })
        })
        .await
    }

    /// Play a soldier card.
    pub async fn play_soldier(
        &self,
        game: GameId,
        actor: ActorId,
        hex: HexCoord,
        victim: Option<PlayerId>,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |state, seat, rng| {
            let loot = resolve_loot(state, victim, rng);
            Ok(Command::PlaySoldier {
                player: seat,
                hex,
                victim,
                loot,
            })
        })
        .await
    }

    /// Play road building over two edges, placed in order.
    pub async fn play_road_building(
        &self,
        game: GameId,
        actor: ActorId,
        first: EdgeCoord,
        second: EdgeCoord,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::PlayRoadBuilding {
                player: seat,
                first,
                second,
            })
        })
        .await
    }

    /// Play year of plenty for two bank cards.
    pub async fn play_year_of_plenty(
        &self,
        game: GameId,
        actor: ActorId,
        first: ResourceKind,
        second: ResourceKind,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::PlayYearOfPlenty {
                player: seat,
                first,
                second,
            })
        })
        .await
    }

    /// Play monopoly on one resource kind.
    pub async fn play_monopoly(
        &self,
        game: GameId,
        actor: ActorId,
        kind: ResourceKind,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::PlayMonopoly { player: seat, kind })
        })
        .await
    }

    /// Put a trade offer on the table.
    pub async fn offer_trade(
        &self,
        game: GameId,
        actor: ActorId,
        to: Option<PlayerId>,
        give: Ledger<ResourceKind>,
        take: Ledger<ResourceKind>,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::OfferTrade {
                player: seat,
                offer: TradeOffer {
                    from: seat,
                    to,
                    give,
                    take,
                },
            })
        })
        .await
    }

    /// Accept the pending trade offer.
    pub async fn accept_trade(
        &self,
        game: GameId,
        actor: ActorId,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, |_, seat, _| {
            Ok(Command::AcceptTrade { player: seat })
        })
        .await
    }

    /// Decline or withdraw the pending trade offer.
    pub async fn decline_trade(
        &self,
        game: GameId,
        actor: ActorId,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, |_, seat, _| {
            Ok(Command::DeclineTrade { player: seat })
        })
        .await
    }

    /// Trade with the bank at the actor's best port rate.
    pub async fn maritime_trade(
        &self,
        game: GameId,
        actor: ActorId,
        give: ResourceKind,
        receive: ResourceKind,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::MaritimeTrade {
                player: seat,
                give,
                receive,
            })
        })
        .await
    }

    /// End the actor's turn.
    pub async fn finish_turn(
        &self,
        game: GameId,
        actor: ActorId,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, |_, seat, _| {
            Ok(Command::FinishTurn { player: seat })
        })
        .await
    }

    /// Append a chat line.
    pub async fn send_chat(
        &self,
        game: GameId,
        actor: ActorId,
        message: String,
    ) -> Result<Snapshot, ServiceError> {
        self.submit(game, actor, move |_, seat, _| {
            Ok(Command::SendChat {
                player: seat,
                message,
            })
        })
        .await
    }

    // ==================== Legality Queries ====================

    /// Whether the actor could place an opening settlement at `vertex`.
    pub async fn can_place_opening_settlement(
        &self,
        game: GameId,
        actor: ActorId,
        vertex: VertexCoord,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_place_opening_settlement(seat, &vertex)
        })
        .await
    }

    /// Whether the actor could place an opening road at `edge`.
    pub async fn can_place_opening_road(
        &self,
        game: GameId,
        actor: ActorId,
        edge: EdgeCoord,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_place_opening_road(seat, &edge)
        })
        .await
    }

    /// Whether the actor could roll now.
    pub async fn can_roll(&self, game: GameId, actor: ActorId) -> Result<(), ServiceError> {
        self.query(game, actor, |state, seat| state.can_roll(seat)).await
    }

    /// Whether the actor could discard `hand` now.
    pub async fn can_discard(
        &self,
        game: GameId,
        actor: ActorId,
        hand: Ledger<ResourceKind>,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_discard(seat, &hand)
        })
        .await
    }

    /// Whether the actor could move the robber to `hex` robbing `victim`.
    pub async fn can_move_robber(
        &self,
        game: GameId,
        actor: ActorId,
        hex: HexCoord,
        victim: Option<PlayerId>,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_move_robber(seat, &hex, victim)
        })
        .await
    }

    /// Whether the actor could build a road at `edge`.
    pub async fn can_place_road(
        &self,
        game: GameId,
        actor: ActorId,
        edge: EdgeCoord,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_place_road(seat, &edge)
        })
        .await
    }

    /// Whether the actor could build a settlement at `vertex`.
    pub async fn can_place_settlement(
        &self,
        game: GameId,
        actor: ActorId,
        vertex: VertexCoord,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_place_settlement(seat, &vertex)
        })
        .await
    }

    /// Whether the actor could upgrade their settlement at `vertex`.
    pub async fn can_upgrade_city(
        &self,
        game: GameId,
        actor: ActorId,
        vertex: VertexCoord,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_upgrade_city(seat, &vertex)
        })
        .await
    }

    /// Whether the actor could buy a development card.
    pub async fn can_buy_dev_card(&self, game: GameId, actor: ActorId) -> Result<(), ServiceError> {
        self.query(game, actor, |state, seat| state.can_buy_dev_card(seat))
            .await
    }

    /// Whether the actor could play a soldier to `hex`.
    pub async fn can_play_soldier(
        &self,
        game: GameId,
        actor: ActorId,
        hex: HexCoord,
        victim: Option<PlayerId>,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_play_soldier(seat, &hex, victim)
        })
        .await
    }

    /// Whether the actor could play road building over the two edges.
    pub async fn can_play_road_building(
        &self,
        game: GameId,
        actor: ActorId,
        first: EdgeCoord,
        second: EdgeCoord,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_play_road_building(seat, &first, &second)
        })
        .await
    }

    /// Whether the actor could play year of plenty for the two picks.
    pub async fn can_play_year_of_plenty(
        &self,
        game: GameId,
        actor: ActorId,
        first: ResourceKind,
        second: ResourceKind,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_play_year_of_plenty(seat, first, second)
        })
        .await
    }

    /// Whether the actor could play monopoly.
    pub async fn can_play_monopoly(
        &self,
        game: GameId,
        actor: ActorId,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, |state, seat| state.can_play_monopoly(seat))
            .await
    }

    /// Whether the actor could put this offer on the table.
    pub async fn can_offer_trade(
        &self,
        game: GameId,
        actor: ActorId,
        to: Option<PlayerId>,
        give: Ledger<ResourceKind>,
        take: Ledger<ResourceKind>,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            let offer = TradeOffer {
                from: seat,
                to,
                give,
                take,
            };
            state.can_offer_trade(seat, &offer)
        })
        .await
    }

    /// Whether the actor could accept the pending offer.
    pub async fn can_accept_trade(
        &self,
        game: GameId,
        actor: ActorId,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, |state, seat| state.can_accept_trade(seat))
            .await
    }

    /// Whether the actor could decline the pending offer.
    pub async fn can_decline_trade(
        &self,
        game: GameId,
        actor: ActorId,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, |state, seat| state.can_decline_trade(seat))
            .await
    }

    /// Whether the actor could make this maritime trade.
    pub async fn can_maritime_trade(
        &self,
        game: GameId,
        actor: ActorId,
        give: ResourceKind,
        receive: ResourceKind,
    ) -> Result<(), ServiceError> {
        self.query(game, actor, move |state, seat| {
            state.can_maritime_trade(seat, give, receive)
        })
        .await
    }

    /// Whether the actor could end their turn.
    pub async fn can_finish_turn(&self, game: GameId, actor: ActorId) -> Result<(), ServiceError> {
        self.query(game, actor, |state, seat| state.can_finish_turn(seat))
            .await
    }

    // ==================== Internals ====================

    fn session(&self, game: GameId) -> Result<Arc<Mutex<GameSession>>, ServiceError> {
        self.sessions
            .get(&game)
            .map(|entry| entry.value().clone())
            .ok_or(ServiceError::UnknownGame(game))
    }

    /// Run one mutating operation under the game's lock: resolve the seat,
    /// build the resolved command, apply it, journal it, maybe compact.
    async fn submit<F>(
        &self,
        game: GameId,
        actor: ActorId,
        build: F,
    ) -> Result<Snapshot, ServiceError>
    where
        F: FnOnce(&GameState, PlayerId, &mut StdRng) -> Result<Command, ServiceError>,
    {
        let session = self.session(game)?;
        let mut session = session.lock().await;
        let seat = session.seat_of(actor)?;

        let command = {
            let GameSession { state, rng, .. } = &mut *session;
            build(state, seat, rng)?
        };
        if let Err(violation) = session.state.apply(&command) {
            warn!(%game, seat, %violation, "rejected command");
            return Err(ServiceError::Rejected(violation));
        }

        // Journal inside the critical section so append order equals apply
        // order. A failed append leaves the command accepted in memory and
        // queued for retry; it is reported loudly, never dropped.
        let record = CommandRecord {
            version: session.state.version(),
            command,
        };
        let durable = {
            let GameSession { journal, .. } = &mut *session;
            journal.record(record).await
        };
        if let Err(failure) = durable {
            error!(%game, %failure, "accepted command is not yet durable");
        }

        let snapshot = session.snapshot();
        // Compaction failures are already logged by the journal; they must
        // not fail the player's action.
        let _ = session.journal.maybe_compact(&snapshot).await;
        Ok(snapshot)
    }

    /// Run one side-effect-free legality query under the game's lock.
    async fn query<F>(&self, game: GameId, actor: ActorId, check: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&GameState, PlayerId) -> Result<(), RuleViolation>,
    {
        let session = self.session(game)?;
        let session = session.lock().await;
        let seat = session.seat_of(actor)?;
        check(&session.state, seat).map_err(ServiceError::Rejected)
    }
}

/// Draw the resolved theft for a robbery command: one card, uniformly at
/// random, from the victim's current hand.
fn resolve_loot(
    state: &GameState,
    victim: Option<PlayerId>,
    rng: &mut StdRng,
) -> Option<ResourceKind> {
    victim
        .and_then(|seat| state.player(seat))
        .and_then(|player| player.hand.sample(rng))
}
