//! Flat-file store backend.
//!
//! Layout: one directory per game id under the store root, holding
//! `snapshot.json` and `commands.jsonl` (one JSON record per line, appended
//! only). Snapshots are written to a temp file, fsynced and renamed into
//! place, so a half-written snapshot never replaces a good one.

use super::{CommandRecord, GameStore, PersistenceFailure};
use crate::protocol::{GameId, Snapshot};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const SNAPSHOT_FILE: &str = "snapshot.json";
const COMMANDS_FILE: &str = "commands.jsonl";

/// A [`GameStore`] over a directory tree.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceFailure> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| PersistenceFailure::new(format!("create store root: {e}")))?;
        Ok(Self { root })
    }

    fn game_dir(&self, game: GameId) -> PathBuf {
        self.root.join(game.to_string())
    }

    async fn ensure_game_dir(&self, game: GameId) -> Result<PathBuf, PersistenceFailure> {
        let dir = self.game_dir(game);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PersistenceFailure::new(format!("create game dir: {e}")))?;
        Ok(dir)
    }

    async fn read_optional(path: &Path) -> Result<Option<String>, PersistenceFailure> {
        match fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceFailure::new(format!(
                "read {}: {e}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl GameStore for FileStore {
    async fn append_command(
        &self,
        game: GameId,
        record: &CommandRecord,
    ) -> Result<(), PersistenceFailure> {
        let dir = self.ensure_game_dir(game).await?;
        let line = serde_json::to_string(record)
            .map_err(|e| PersistenceFailure::new(format!("encode command: {e}")))?;

        let mut file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(dir.join(COMMANDS_FILE))
            .await
            .map_err(|e| PersistenceFailure::new(format!("open command log: {e}")))?;
        file.write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| PersistenceFailure::new(format!("append command: {e}")))?;
        // The append only counts as durable once it reaches the disk.
        file.sync_data()
            .await
            .map_err(|e| PersistenceFailure::new(format!("sync command log: {e}")))?;
        Ok(())
    }

    async fn clear_commands(&self, game: GameId) -> Result<(), PersistenceFailure> {
        let path = self.game_dir(game).join(COMMANDS_FILE);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceFailure::new(format!("clear command log: {e}"))),
        }
    }

    async fn list_commands(&self, game: GameId) -> Result<Vec<CommandRecord>, PersistenceFailure> {
        let path = self.game_dir(game).join(COMMANDS_FILE);
        let Some(text) = Self::read_optional(&path).await? else {
            return Ok(Vec::new());
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| PersistenceFailure::new(format!("decode command log: {e}")))
            })
            .collect()
    }

    async fn put_snapshot(
        &self,
        game: GameId,
        snapshot: &Snapshot,
    ) -> Result<(), PersistenceFailure> {
        let dir = self.ensure_game_dir(game).await?;
        let body = serde_json::to_vec(snapshot)
            .map_err(|e| PersistenceFailure::new(format!("encode snapshot: {e}")))?;

        // Write-sync-rename: the snapshot must be fully on disk before it
        // takes the canonical name, because the caller clears the command
        // log on our Ok.
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| PersistenceFailure::new(format!("create snapshot: {e}")))?;
        file.write_all(&body)
            .await
            .map_err(|e| PersistenceFailure::new(format!("write snapshot: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| PersistenceFailure::new(format!("sync snapshot: {e}")))?;
        drop(file);
        fs::rename(&tmp, dir.join(SNAPSHOT_FILE))
            .await
            .map_err(|e| PersistenceFailure::new(format!("publish snapshot: {e}")))?;
        Ok(())
    }

    async fn get_snapshot(&self, game: GameId) -> Result<Option<Snapshot>, PersistenceFailure> {
        let path = self.game_dir(game).join(SNAPSHOT_FILE);
        match Self::read_optional(&path).await? {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| PersistenceFailure::new(format!("decode snapshot: {e}"))),
        }
    }

    async fn list_known_games(&self) -> Result<Vec<GameId>, PersistenceFailure> {
        let mut games = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| PersistenceFailure::new(format!("read store root: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceFailure::new(format!("read store root: {e}")))?
        {
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(id) = Uuid::parse_str(name) {
                    games.push(GameId(id));
                }
            }
        }
        Ok(games)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archipel_engine::{Board, Command, GameState};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn snapshot(version_seed: u64) -> Snapshot {
        let mut rng = StdRng::seed_from_u64(version_seed);
        let state = GameState::new(2, Board::standard_with_rng(&mut rng)).unwrap();
        Snapshot {
            version: state.version(),
            seats: Vec::new(),
            state,
        }
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let game = GameId::random();

        assert_eq!(store.get_snapshot(game).await.unwrap(), None);
        let snap = snapshot(1);
        store.put_snapshot(game, &snap).await.unwrap();
        assert_eq!(store.get_snapshot(game).await.unwrap(), Some(snap.clone()));

        // Replacement, not accumulation.
        let replacement = snapshot(2);
        store.put_snapshot(game, &replacement).await.unwrap();
        assert_eq!(
            store.get_snapshot(game).await.unwrap(),
            Some(replacement)
        );
    }

    #[tokio::test]
    async fn command_log_appends_lists_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let game = GameId::random();

        assert!(store.list_commands(game).await.unwrap().is_empty());
        for version in 1..=4 {
            store
                .append_command(
                    game,
                    &CommandRecord {
                        version,
                        command: Command::SendChat {
                            player: 0,
                            message: format!("line {version}"),
                        },
                    },
                )
                .await
                .unwrap();
        }

        let listed = store.list_commands(game).await.unwrap();
        assert_eq!(listed.len(), 4);
        assert_eq!(listed[0].version, 1);
        assert_eq!(listed[3].version, 4);

        store.clear_commands(game).await.unwrap();
        assert!(store.list_commands(game).await.unwrap().is_empty());
        // Clearing an already-empty log is fine.
        store.clear_commands(game).await.unwrap();
    }

    #[tokio::test]
    async fn lists_only_game_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let game = GameId::random();
        store.put_snapshot(game, &snapshot(3)).await.unwrap();
        std::fs::write(dir.path().join("stray.txt"), b"not a game").unwrap();

        assert_eq!(store.list_known_games().await.unwrap(), vec![game]);
    }
}
