//! Service configuration and tracing setup.

use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tunables for the service, env-overridable.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Root directory for the flat-file store
    pub data_dir: PathBuf,
    /// Commands accumulated before the journal compacts into a snapshot
    pub compact_after: usize,
    /// Default observer polling interval
    pub poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("archipel-data"),
            compact_after: 64,
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl ServiceConfig {
    /// Read `ARCHIPEL_DATA_DIR`, `ARCHIPEL_COMPACT_AFTER` and
    /// `ARCHIPEL_POLL_MS`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("ARCHIPEL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_after: std::env::var("ARCHIPEL_COMPACT_AFTER")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.compact_after),
            poll_interval: std::env::var("ARCHIPEL_POLL_MS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        }
    }
}

/// Initialize tracing with an env-filter layer. Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
