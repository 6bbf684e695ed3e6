//! Persistence abstraction for snapshots and command logs.
//!
//! The service depends only on [`GameStore`]: one full snapshot per game
//! plus one append-only, strictly ordered command log per game. The log is
//! only ever appended to or cleared in full, never edited. Three
//! interchangeable backends implement it: flat files, in-memory maps, and
//! (behind the `sql` feature) SQLite.

use crate::protocol::{GameId, Snapshot};
use archipel_engine::Command;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod file;
pub mod memory;
#[cfg(feature = "sql")]
pub mod sql;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "sql")]
pub use sql::SqlStore;

/// A failed store operation. Recoverable, but must be logged loudly; the
/// caller decides whether to retry or to hold back dependent work (a failed
/// snapshot write blocks the corresponding log clear).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("persistence failure: {reason}")]
pub struct PersistenceFailure {
    pub reason: String,
}

impl PersistenceFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// One accepted mutation as stored in the log: the command plus the version
/// its application produced. The version makes replay idempotent - records
/// at or below a snapshot's version are already part of that snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub version: u64,
    pub command: Command,
}

/// The persistence interface the service depends on.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Append one record to the game's command log.
    async fn append_command(
        &self,
        game: GameId,
        record: &CommandRecord,
    ) -> Result<(), PersistenceFailure>;

    /// Drop the game's entire command log.
    async fn clear_commands(&self, game: GameId) -> Result<(), PersistenceFailure>;

    /// The game's command log in append order.
    async fn list_commands(&self, game: GameId) -> Result<Vec<CommandRecord>, PersistenceFailure>;

    /// Replace the game's full snapshot.
    async fn put_snapshot(&self, game: GameId, snapshot: &Snapshot)
        -> Result<(), PersistenceFailure>;

    /// The game's current snapshot, if one was ever written.
    async fn get_snapshot(&self, game: GameId) -> Result<Option<Snapshot>, PersistenceFailure>;

    /// Every game id the store knows about.
    async fn list_known_games(&self) -> Result<Vec<GameId>, PersistenceFailure>;
}
