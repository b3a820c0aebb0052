//! Keeps the prefix tree in step with the key-store and with peers.
//!
//! The [`SyncCoordinator`] owns the single-writer path into the tree: key
//! insert/delete notifications, full rebuilds, and the keys fetched from peers
//! after each reconciliation cycle all go through its mutation gate.

pub mod config;
pub mod errors;
pub mod fetcher;
pub mod keystore;
pub mod metrics;
pub mod operator;
pub mod sync;

pub use config::SyncConfig;
pub use errors::{CoordinatorError, RebuildFailure};
pub use fetcher::{HttpKeyFetcher, KeyFetcher};
pub use keystore::{BlacklistEntry, EmbeddedKeyStore, KeyRecord, KeyStore};
pub use metrics::SyncMetrics;
pub use sync::{
    ApplyStats, CycleReport, PeerCycleReport, PeerOutcome, PeerSyncState, SyncCoordinator,
    SyncHandle,
};
