//! In-memory store backend.
//!
//! Useful for tests and for ephemeral games that do not need to survive a
//! restart. Semantics match the durable backends exactly.

use super::{CommandRecord, GameStore, PersistenceFailure};
use crate::protocol::{GameId, Snapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct StoredGame {
    snapshot: Option<Snapshot>,
    commands: Vec<CommandRecord>,
}

/// A [`GameStore`] held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    games: Mutex<HashMap<GameId, StoredGame>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn append_command(
        &self,
        game: GameId,
        record: &CommandRecord,
    ) -> Result<(), PersistenceFailure> {
        let mut games = self.games.lock().expect("store mutex poisoned");
        games
            .entry(game)
            .or_default()
            .commands
            .push(record.clone());
        Ok(())
    }

    async fn clear_commands(&self, game: GameId) -> Result<(), PersistenceFailure> {
        let mut games = self.games.lock().expect("store mutex poisoned");
        if let Some(stored) = games.get_mut(&game) {
            stored.commands.clear();
        }
        Ok(())
    }

    async fn list_commands(&self, game: GameId) -> Result<Vec<CommandRecord>, PersistenceFailure> {
        let games = self.games.lock().expect("store mutex poisoned");
        Ok(games
            .get(&game)
            .map(|stored| stored.commands.clone())
            .unwrap_or_default())
    }

    async fn put_snapshot(
        &self,
        game: GameId,
        snapshot: &Snapshot,
    ) -> Result<(), PersistenceFailure> {
        let mut games = self.games.lock().expect("store mutex poisoned");
        games.entry(game).or_default().snapshot = Some(snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(&self, game: GameId) -> Result<Option<Snapshot>, PersistenceFailure> {
        let games = self.games.lock().expect("store mutex poisoned");
        Ok(games.get(&game).and_then(|stored| stored.snapshot.clone()))
    }

    async fn list_known_games(&self) -> Result<Vec<GameId>, PersistenceFailure> {
        let games = self.games.lock().expect("store mutex poisoned");
        Ok(games.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archipel_engine::{Board, Command, GameState};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn snapshot() -> Snapshot {
        let mut rng = StdRng::seed_from_u64(5);
        let state = GameState::new(2, Board::standard_with_rng(&mut rng)).unwrap();
        Snapshot {
            version: state.version(),
            seats: Vec::new(),
            state,
        }
    }

    #[tokio::test]
    async fn commands_append_in_order_and_clear_in_full() {
        let store = MemoryStore::new();
        let game = GameId::random();

        for version in 1..=3 {
            store
                .append_command(
                    game,
                    &CommandRecord {
                        version,
                        command: Command::FinishTurn { player: 0 },
                    },
                )
                .await
                .unwrap();
        }

        let listed = store.list_commands(game).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].version < w[1].version));

        store.clear_commands(game).await.unwrap();
        assert!(store.list_commands(game).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshots_replace_and_list() {
        let store = MemoryStore::new();
        let game = GameId::random();
        assert_eq!(store.get_snapshot(game).await.unwrap(), None);

        let snap = snapshot();
        store.put_snapshot(game, &snap).await.unwrap();
        assert_eq!(store.get_snapshot(game).await.unwrap(), Some(snap));
        assert_eq!(store.list_known_games().await.unwrap(), vec![game]);
    }
}
