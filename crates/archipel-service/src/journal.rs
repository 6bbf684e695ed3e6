//! Per-game command journal with snapshot compaction.
//!
//! Every accepted command is recorded here in apply order. After
//! `compact_after` appended records the journal persists the current state
//! as a full snapshot and clears the log - and only in that order: the log
//! is never cleared before the replacement snapshot write has returned Ok.
//!
//! A failed append leaves the record queued; it is retried before any later
//! record so the on-disk order always equals apply order. A record is never
//! dropped.

use crate::protocol::{GameId, Snapshot};
use crate::store::{CommandRecord, GameStore, PersistenceFailure};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{error, warn};

/// Orders and persists one game's accepted commands.
pub struct Journal {
    store: Arc<dyn GameStore>,
    game: GameId,
    compact_after: usize,
    pending: VecDeque<CommandRecord>,
    appended_since_snapshot: usize,
}

impl Journal {
    pub fn new(store: Arc<dyn GameStore>, game: GameId, compact_after: usize) -> Self {
        Self {
            store,
            game,
            compact_after: compact_after.max(1),
            pending: VecDeque::new(),
            appended_since_snapshot: 0,
        }
    }

    /// Records not yet confirmed by the store.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queue a record and try to flush everything queued. On failure the
    /// record is kept for retry and the error is reported; the command is
    /// accepted but not yet durable.
    pub async fn record(&mut self, record: CommandRecord) -> Result<(), PersistenceFailure> {
        self.pending.push_back(record);
        self.flush().await
    }

    /// Push queued records to the store in order, stopping at the first
    /// failure.
    pub async fn flush(&mut self) -> Result<(), PersistenceFailure> {
        while let Some(front) = self.pending.front() {
            match self.store.append_command(self.game, front).await {
                Ok(()) => {
                    self.pending.pop_front();
                    self.appended_since_snapshot += 1;
                }
                Err(failure) => {
                    error!(
                        game = %self.game,
                        queued = self.pending.len(),
                        %failure,
                        "command append failed; record retained for retry"
                    );
                    return Err(failure);
                }
            }
        }
        Ok(())
    }

    /// Compact if enough records have accumulated. Requires an empty retry
    /// queue so the snapshot covers everything the log holds.
    pub async fn maybe_compact(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceFailure> {
        if !self.pending.is_empty() {
            self.flush().await?;
        }
        if self.appended_since_snapshot < self.compact_after {
            return Ok(());
        }
        self.checkpoint(snapshot).await
    }

    /// Persist `snapshot` and, only once that write is confirmed, clear the
    /// command log.
    pub async fn checkpoint(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceFailure> {
        if let Err(failure) = self.store.put_snapshot(self.game, snapshot).await {
            error!(
                game = %self.game,
                version = snapshot.version,
                %failure,
                "snapshot write failed; command log retained"
            );
            return Err(failure);
        }
        if let Err(failure) = self.store.clear_commands(self.game).await {
            // The snapshot is durable, so stale log entries are harmless:
            // replay skips records at or below the snapshot version.
            warn!(
                game = %self.game,
                %failure,
                "log clear failed after snapshot; stale records remain"
            );
        }
        self.appended_since_snapshot = 0;
        Ok(())
    }
}
