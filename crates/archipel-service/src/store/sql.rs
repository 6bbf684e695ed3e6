//! SQLite store backend via sqlx.
//!
//! This module is only available when the `sql` feature is enabled. The
//! schema is two tables: one row per game snapshot and one row per logged
//! command, ordered by the version the command produced.

use super::{CommandRecord, GameStore, PersistenceFailure};
use crate::protocol::{GameId, Snapshot};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;

/// A [`GameStore`] over a SQLite database.
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Connect and run the idempotent migrations.
    ///
    /// `url` is a sqlx SQLite URL, e.g. `sqlite::memory:` or
    /// `sqlite:/var/lib/archipel/games.db?mode=rwc`.
    pub async fn connect(url: &str) -> Result<Self, PersistenceFailure> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| PersistenceFailure::new(format!("connect {url}: {e}")))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), PersistenceFailure> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS game_snapshots (
                game    TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                body    TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceFailure::new(format!("migrate snapshots: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS game_commands (
                game    TEXT NOT NULL,
                version INTEGER NOT NULL,
                body    TEXT NOT NULL,
                PRIMARY KEY (game, version)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceFailure::new(format!("migrate commands: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl GameStore for SqlStore {
    async fn append_command(
        &self,
        game: GameId,
        record: &CommandRecord,
    ) -> Result<(), PersistenceFailure> {
        let body = serde_json::to_string(&record.command)
            .map_err(|e| PersistenceFailure::new(format!("encode command: {e}")))?;
        sqlx::query("INSERT INTO game_commands (game, version, body) VALUES (?1, ?2, ?3)")
            .bind(game.to_string())
            .bind(record.version as i64)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceFailure::new(format!("append command: {e}")))?;
        Ok(())
    }

    async fn clear_commands(&self, game: GameId) -> Result<(), PersistenceFailure> {
        sqlx::query("DELETE FROM game_commands WHERE game = ?1")
            .bind(game.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceFailure::new(format!("clear command log: {e}")))?;
        Ok(())
    }

    async fn list_commands(&self, game: GameId) -> Result<Vec<CommandRecord>, PersistenceFailure> {
        let rows = sqlx::query(
            "SELECT version, body FROM game_commands WHERE game = ?1 ORDER BY version ASC",
        )
        .bind(game.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceFailure::new(format!("list commands: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| PersistenceFailure::new(format!("read version: {e}")))?;
                let body: String = row
                    .try_get("body")
                    .map_err(|e| PersistenceFailure::new(format!("read body: {e}")))?;
                let command = serde_json::from_str(&body)
                    .map_err(|e| PersistenceFailure::new(format!("decode command: {e}")))?;
                Ok(CommandRecord {
                    version: version as u64,
                    command,
                })
            })
            .collect()
    }

    async fn put_snapshot(
        &self,
        game: GameId,
        snapshot: &Snapshot,
    ) -> Result<(), PersistenceFailure> {
        let body = serde_json::to_string(snapshot)
            .map_err(|e| PersistenceFailure::new(format!("encode snapshot: {e}")))?;
        sqlx::query(
            "INSERT INTO game_snapshots (game, version, body) VALUES (?1, ?2, ?3)
             ON CONFLICT (game) DO UPDATE SET version = excluded.version, body = excluded.body",
        )
        .bind(game.to_string())
        .bind(snapshot.version as i64)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceFailure::new(format!("put snapshot: {e}")))?;
        Ok(())
    }

    async fn get_snapshot(&self, game: GameId) -> Result<Option<Snapshot>, PersistenceFailure> {
        let row = sqlx::query("SELECT body FROM game_snapshots WHERE game = ?1")
            .bind(game.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceFailure::new(format!("get snapshot: {e}")))?;
        match row {
            None => Ok(None),
            Some(row) => {
                let body: String = row
                    .try_get("body")
                    .map_err(|e| PersistenceFailure::new(format!("read body: {e}")))?;
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| PersistenceFailure::new(format!("decode snapshot: {e}")))
            }
        }
    }

    async fn list_known_games(&self) -> Result<Vec<GameId>, PersistenceFailure> {
        let rows = sqlx::query("SELECT game FROM game_snapshots")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PersistenceFailure::new(format!("list games: {e}")))?;
        rows.into_iter()
            .map(|row| {
                let id: String = row
                    .try_get("game")
                    .map_err(|e| PersistenceFailure::new(format!("read game id: {e}")))?;
                Uuid::parse_str(&id)
                    .map(GameId)
                    .map_err(|e| PersistenceFailure::new(format!("parse game id: {e}")))
            })
            .collect()
    }
}
