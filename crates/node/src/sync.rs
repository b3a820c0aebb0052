//! Reconciliation scheduling and application of its results.

mod tracking;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, StreamExt};
use keysync_primitives::{KeyIdentifier, PeerDescriptor};
use keysync_ptree::{PrefixTreeStore, TreeError};
use keysync_recon::{GossipTransport, ReconDiff, ReconciliationEngine, SessionOutcome};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use self::tracking::PeerSyncState;
use crate::config::SyncConfig;
use crate::errors::{CoordinatorError, RebuildFailure};
use crate::fetcher::KeyFetcher;
use crate::keystore::{KeyRecord, KeyStore};
use crate::metrics::SyncMetrics;

/// What applying one peer's differences did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub fetched: usize,
    pub inserted: usize,
    pub skipped_blacklisted: usize,
    /// Records whose fingerprint does not hash to a requested identifier.
    pub skipped_mismatched: usize,
    /// Identifiers only held locally; the peer pulls these on its own cycle.
    pub to_send: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerOutcome {
    Synced(ApplyStats),
    /// Every attempt failed with a transport error or timed out.
    Unreachable(String),
    /// The peer misbehaved or refused; not retried this cycle.
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct PeerCycleReport {
    pub peer: PeerDescriptor,
    pub attempts: u32,
    pub outcome: PeerOutcome,
}

#[derive(Clone, Debug)]
pub struct CycleReport {
    pub peers: Vec<PeerCycleReport>,
    pub took: Duration,
}

impl CycleReport {
    #[must_use]
    pub fn synced(&self) -> usize {
        self.count(|outcome| matches!(outcome, PeerOutcome::Synced(_)))
    }

    #[must_use]
    pub fn unreachable(&self) -> usize {
        self.count(|outcome| matches!(outcome, PeerOutcome::Unreachable(_)))
    }

    fn count(&self, pred: impl Fn(&PeerOutcome) -> bool) -> usize {
        self.peers.iter().filter(|report| pred(&report.outcome)).count()
    }
}

/// Requests reconciliation ahead of the schedule of a started coordinator.
#[derive(Clone, Debug)]
pub struct SyncHandle {
    triggers: mpsc::Sender<Option<PeerDescriptor>>,
}

impl SyncHandle {
    /// Queues a full cycle, or a session against `peer` only.
    ///
    /// Returns `false` if the coordinator stopped or is already saturated with
    /// requests.
    pub fn trigger(&self, peer: Option<PeerDescriptor>) -> bool {
        self.triggers.try_send(peer).is_ok()
    }
}

/// Drives reconciliation with the configured peers and owns every mutation of
/// the prefix tree.
pub struct SyncCoordinator {
    config: SyncConfig,
    tree: Arc<PrefixTreeStore>,
    keys: Arc<dyn KeyStore>,
    fetcher: Arc<dyn KeyFetcher>,
    engine: ReconciliationEngine,
    peers: RwLock<Vec<PeerDescriptor>>,
    states: Mutex<HashMap<PeerDescriptor, PeerSyncState>>,
    /// Serializes tree mutations against each other and against rebuilds.
    gate: AsyncMutex<()>,
    metrics: SyncMetrics,
}

impl core::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("config", &self.config)
            .field("tree", &self.tree)
            .field("peers", &*self.peers.read())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(
        config: SyncConfig,
        tree: Arc<PrefixTreeStore>,
        keys: Arc<dyn KeyStore>,
        fetcher: Arc<dyn KeyFetcher>,
        transport: Arc<dyn GossipTransport>,
        peers: Vec<PeerDescriptor>,
        metrics: SyncMetrics,
    ) -> Self {
        metrics.set_tree_elements(tree.len());

        Self {
            engine: ReconciliationEngine::new(transport, config.session()),
            config,
            tree,
            keys,
            fetcher,
            peers: RwLock::new(peers),
            states: Mutex::default(),
            gate: AsyncMutex::new(()),
            metrics,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn tree(&self) -> &Arc<PrefixTreeStore> {
        &self.tree
    }

    pub(crate) fn keys(&self) -> &dyn KeyStore {
        &*self.keys
    }

    /// Runs `op` against the key-store on the blocking pool.
    pub(crate) async fn with_keys<T, F>(&self, op: F) -> Result<T, CoordinatorError>
    where
        F: FnOnce(&dyn KeyStore) -> eyre::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let keys = Arc::clone(&self.keys);

        blocking(move || op(&*keys).map_err(CoordinatorError::key_store)).await
    }

    pub(crate) const fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    pub(crate) async fn lock_mutations(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    #[must_use]
    pub fn peers(&self) -> Vec<PeerDescriptor> {
        self.peers.read().clone()
    }

    /// Replaces the peer list; takes effect from the next cycle.
    pub fn reload_peers(&self, peers: Vec<PeerDescriptor>) {
        info!(count = peers.len(), "Reloaded reconciliation peers");

        let mut states = self.states.lock();
        states.retain(|peer, _| peers.contains(peer));

        *self.peers.write() = peers;
    }

    #[must_use]
    pub fn peer_state(&self, peer: &PeerDescriptor) -> Option<PeerSyncState> {
        self.states.lock().get(peer).cloned()
    }

    /// Records a key added to the key-store.
    pub async fn notify_insert(&self, id: KeyIdentifier) -> Result<bool, CoordinatorError> {
        let _gate = self.gate.lock().await;

        let tree = Arc::clone(&self.tree);
        let inserted = blocking(move || Ok(tree.insert(id)?)).await?;
        self.metrics.set_tree_elements(self.tree.len());

        Ok(inserted)
    }

    /// Records a key removed from the key-store.
    pub async fn notify_delete(&self, id: KeyIdentifier) -> Result<bool, CoordinatorError> {
        let _gate = self.gate.lock().await;

        let tree = Arc::clone(&self.tree);
        let removed = blocking(move || Ok(tree.remove(&id)?)).await?;
        self.metrics.set_tree_elements(self.tree.len());

        Ok(removed)
    }

    /// Rebuilds the tree from the key-store's active identifiers.
    ///
    /// Mutations wait until the rebuild finishes. Past the rebuild timeout, or
    /// once the returned future is dropped, the build is cancelled and the
    /// current tree stays live. Enumeration of the key-store is not
    /// interruptible and is waited for.
    pub async fn rebuild(&self) -> Result<u64, CoordinatorError> {
        let _gate = self.gate.lock().await;

        let timeout = self.config.rebuild_timeout;
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let mut build = task::spawn_blocking({
            let keys = Arc::clone(&self.keys);
            let tree = Arc::clone(&self.tree);
            let cancel = cancel.clone();

            move || {
                let ids = keys
                    .enumerate_active_key_identifiers()
                    .map_err(|err| RebuildFailure::Enumerate(err.into()))?;

                tree.rebuild_with_cancel(ids, &cancel)
                    .map_err(RebuildFailure::Tree)
            }
        });

        let joined = match time::timeout(timeout, &mut build).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(?timeout, "Prefix tree rebuild timed out, cancelling");

                cancel.cancel();

                match build.await {
                    Ok(Err(RebuildFailure::Tree(TreeError::Cancelled))) => {
                        Ok(Err(RebuildFailure::TimedOut(timeout)))
                    }
                    joined => joined,
                }
            }
        };

        let result = joined.unwrap_or(Err(RebuildFailure::Panicked));

        self.metrics.record_rebuild(result.is_ok());
        self.metrics.set_tree_elements(self.tree.len());

        result.map_err(|err| {
            error!(error = %describe(&err), "Prefix tree rebuild failed, keeping the current tree");
            CoordinatorError::RebuildFailed(err)
        })
    }

    /// Runs the scheduler until `shutdown` fires.
    ///
    /// A cycle runs every [`SyncConfig::interval`], and whenever the returned
    /// handle asks for one. Shutdown cancels the sessions in flight.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> (SyncHandle, JoinHandle<()>) {
        let (triggers, rx) = mpsc::channel(16);

        let task = tokio::spawn(self.run(rx, shutdown));

        (SyncHandle { triggers }, task)
    }

    async fn run(
        self: Arc<Self>,
        mut triggers: mpsc::Receiver<Option<PeerDescriptor>>,
        shutdown: CancellationToken,
    ) {
        let mut next_cycle = time::interval(self.config.interval);
        next_cycle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval = ?self.config.interval,
            peers = self.peers.read().len(),
            "Sync coordinator started"
        );

        loop {
            let target = tokio::select! {
                () = shutdown.cancelled() => break,
                _ = next_cycle.tick() => None,
                Some(peer) = triggers.recv() => peer,
            };

            let work = async {
                if let Some(peer) = target {
                    let _report = self.sync_peer(peer).await;
                } else {
                    let _report = self.run_cycle().await;
                }
            };

            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("Cancelled reconciliation in flight");
                    break;
                }
                () = work => {}
            }
        }

        info!("Sync coordinator stopped");
    }

    /// Reconciles with every configured peer, at most
    /// [`SyncConfig::max_concurrent`] at a time.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Instant::now();

        let peers = self.peers();

        let reports = stream::iter(peers)
            .map(|peer| self.sync_peer(peer))
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect::<Vec<_>>()
            .await;

        let report = CycleReport {
            peers: reports,
            took: started_at.elapsed(),
        };

        info!(
            peers = report.peers.len(),
            synced = report.synced(),
            unreachable = report.unreachable(),
            took = ?report.took,
            "Reconciliation cycle finished"
        );

        report
    }

    /// Reconciles with `peer`, retrying transport failures with backoff.
    pub async fn sync_peer(&self, peer: PeerDescriptor) -> PeerCycleReport {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.config.backoff(attempt - 1);

                debug!(%peer, attempt, ?delay, "Retrying reconciliation");

                time::sleep(delay).await;
            }

            self.states
                .lock()
                .entry(peer.clone())
                .or_default()
                .on_attempt();

            let snapshot = self.tree.snapshot_root();
            let session = self.engine.reconcile(&peer, &snapshot).await;

            self.metrics.record_session(&session);

            let diff = match session.outcome {
                SessionOutcome::Done(diff) => diff,
                SessionOutcome::Failed(err) if !err.is_retryable() => {
                    return self.finish(peer, attempt + 1, PeerOutcome::Failed(describe(&err)));
                }
                SessionOutcome::Failed(err) => {
                    last_error = describe(&err);
                    continue;
                }
                SessionOutcome::TimedOut => {
                    last_error = "session timed out".to_owned();
                    continue;
                }
            };

            match self.apply(&peer, diff).await {
                Ok(stats) => return self.finish(peer, attempt + 1, PeerOutcome::Synced(stats)),
                Err(err @ CoordinatorError::Fetch { .. }) => last_error = describe(&err),
                Err(err) => {
                    return self.finish(peer, attempt + 1, PeerOutcome::Failed(describe(&err)));
                }
            }
        }

        self.finish(peer, max_attempts, PeerOutcome::Unreachable(last_error))
    }

    fn finish(&self, peer: PeerDescriptor, attempts: u32, outcome: PeerOutcome) -> PeerCycleReport {
        {
            let mut states = self.states.lock();
            let state = states.entry(peer.clone()).or_default();

            match &outcome {
                PeerOutcome::Synced(_) => state.on_success(),
                PeerOutcome::Unreachable(error) => state.on_failure(error.clone(), true),
                PeerOutcome::Failed(error) => state.on_failure(error.clone(), false),
            }
        }

        match &outcome {
            PeerOutcome::Synced(stats) => {
                self.metrics.record_apply(stats);

                debug!(
                    %peer,
                    attempts,
                    fetched = stats.fetched,
                    inserted = stats.inserted,
                    to_send = stats.to_send,
                    "Synced with peer"
                );
            }
            PeerOutcome::Unreachable(error) => {
                self.metrics.record_unreachable();

                warn!(%peer, attempts, %error, "Peer unreachable for this cycle");
            }
            PeerOutcome::Failed(error) => {
                warn!(%peer, %error, "Reconciliation with peer failed");
            }
        }

        PeerCycleReport {
            peer,
            attempts,
            outcome,
        }
    }

    /// Fetches the keys only `peer` holds and adds them to the key-store and
    /// the tree.
    ///
    /// Nothing is stored unless every batch arrives, so a session that fails
    /// mid-fetch leaves no trace for its retry.
    async fn apply(
        &self,
        peer: &PeerDescriptor,
        diff: ReconDiff,
    ) -> Result<ApplyStats, CoordinatorError> {
        let mut stats = ApplyStats {
            to_send: diff.to_send.len(),
            ..ApplyStats::default()
        };

        let wanted = diff.to_fetch.into_iter().collect::<Vec<_>>();
        let mut records = Vec::with_capacity(wanted.len());

        for batch in wanted.chunks(self.config.fetch_batch_size.max(1)) {
            let fetched = self.fetcher.fetch(peer, batch).await.map_err(|err| {
                CoordinatorError::Fetch {
                    peer: peer.to_string(),
                    source: err.into(),
                }
            })?;

            stats.fetched += fetched.len();

            for record in fetched {
                if batch.binary_search(&record.id()).is_err() {
                    debug!(%peer, fingerprint = %record.fingerprint, "Skipping unrequested key");
                    stats.skipped_mismatched += 1;
                    continue;
                }

                records.push(record);
            }
        }

        let _gate = self.gate.lock().await;

        let stats = self.store_fetched(peer, records, stats).await?;

        self.metrics.set_tree_elements(self.tree.len());

        Ok(stats)
    }

    /// Adds `records` to the key-store and the tree, skipping blacklisted
    /// ones. The caller holds the mutation gate.
    async fn store_fetched(
        &self,
        peer: &PeerDescriptor,
        records: Vec<KeyRecord>,
        mut stats: ApplyStats,
    ) -> Result<ApplyStats, CoordinatorError> {
        let keys = Arc::clone(&self.keys);
        let tree = Arc::clone(&self.tree);
        let peer = peer.clone();

        blocking(move || {
            for record in records {
                let id = record.id();

                if keys
                    .is_blacklisted(&record.fingerprint)
                    .map_err(CoordinatorError::key_store)?
                {
                    debug!(%peer, fingerprint = %record.fingerprint, "Skipping blacklisted key");
                    stats.skipped_blacklisted += 1;
                    continue;
                }

                if keys.insert_key(record).map_err(CoordinatorError::key_store)? {
                    stats.inserted += 1;
                }

                let _new = tree.insert(id)?;
            }

            Ok(stats)
        })
        .await
    }
}

/// Runs key-store and tree I/O on the blocking pool.
pub(crate) async fn blocking<T, F>(op: F) -> Result<T, CoordinatorError>
where
    F: FnOnce() -> Result<T, CoordinatorError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(op)
        .await
        .map_err(|err| CoordinatorError::KeyStore(err.into()))?
}

/// An error with its chain of causes, for logs and reports.
pub(crate) fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}
