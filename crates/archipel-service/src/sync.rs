//! Cooperative snapshot polling for observers.
//!
//! A [`SnapshotPoller`] asks its hub for "state newer than the version I
//! last saw" on a fixed interval. A no-op answer costs nothing; a newer
//! snapshot atomically replaces the cached one and fans out to every
//! registered listener. A poller never exposes a version older than one it
//! already delivered, and [`SnapshotPoller::stop`] only returns once the
//! polling task has terminated - no listener is invoked after it returns.

use crate::facade::GameHub;
use crate::protocol::{GameId, Snapshot};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

/// Receives every snapshot the poller accepts, in version order.
pub trait SnapshotListener: Send + Sync {
    fn snapshot_changed(&self, snapshot: &Snapshot);
}

/// A fixed-interval observer of one game.
pub struct SnapshotPoller {
    latest: Arc<RwLock<Option<Snapshot>>>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SnapshotPoller {
    /// Start polling `game` every `every`, fanning accepted snapshots out
    /// to `listeners`.
    pub fn spawn(
        hub: Arc<GameHub>,
        game: GameId,
        every: Duration,
        listeners: Vec<Arc<dyn SnapshotListener>>,
    ) -> Self {
        let latest = Arc::new(RwLock::new(None));
        let cache = Arc::clone(&latest);
        let (stop, mut stopped) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut seen: Option<u64> = None;

            loop {
                tokio::select! {
                    // Fires on stop() and if the handle is dropped.
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        let fetched = match seen {
                            None => hub.snapshot(game).await.map(Some),
                            Some(version) => hub.poll_newer(game, version).await,
                        };
                        match fetched {
                            Ok(Some(snapshot)) => {
                                if seen.is_some_and(|version| snapshot.version <= version) {
                                    continue;
                                }
                                seen = Some(snapshot.version);
                                *cache.write().expect("poller cache poisoned") =
                                    Some(snapshot.clone());
                                for listener in &listeners {
                                    listener.snapshot_changed(&snapshot);
                                }
                            }
                            Ok(None) => {}
                            Err(error) => {
                                warn!(%game, %error, "snapshot poll failed");
                            }
                        }
                    }
                }
            }
        });

        Self { latest, stop, task }
    }

    /// The most recent snapshot this poller has accepted.
    pub fn latest(&self) -> Option<Snapshot> {
        self.latest.read().expect("poller cache poisoned").clone()
    }

    /// Stop polling. Waits for the task to exit, so once this returns no
    /// further listener notification can be delivered.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}
