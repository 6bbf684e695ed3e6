//! Shared types of the synchronization protocol.
//!
//! State leaves the service only as a [`Snapshot`]: the whole game tagged
//! with its version. There is exactly one writer per game, so observers
//! synchronize by whole-object replacement; no merge logic exists anywhere.

use archipel_engine::{GameState, PlayerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one game; the unit of persistence and locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(pub Uuid);

impl GameId {
    /// A fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque, stable reference to an actor, supplied by the identity layer.
/// The service never validates credentials; it only compares these for
/// turn and ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    /// A fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Binding of an actor to a seat, established at join time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatAssignment {
    pub actor: ActorId,
    pub seat: PlayerId,
    pub name: String,
}

/// A full serialized copy of game state tagged with its version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Equal to `state.version()`; duplicated so observers can compare
    /// without touching the state
    pub version: u64,
    /// Who sits where
    pub seats: Vec<SeatAssignment>,
    /// The complete game state
    pub state: GameState,
}
