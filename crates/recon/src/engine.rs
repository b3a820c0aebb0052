//! Initiator side of a reconciliation session.

#[cfg(test)]
#[path = "tests/engine.rs"]
mod tests;

use core::fmt;
use core::mem;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use keysync_primitives::{KeyIdentifier, PeerDescriptor, Prefix};
use keysync_ptree::TreeSnapshot;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::messages::{ErrorCode, Message, NodeSummary, MAX_ELEMENTS_PER_RESPONSE};
use crate::transport::{GossipTransport, TransportError};

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_PENDING: usize = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Wall-clock budget of a whole session.
    pub session_timeout: Duration,
    /// Upper bound on a single request/response exchange.
    pub call_timeout: Duration,
    /// Upper bound on prefixes queued for comparison.
    pub max_pending: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Start,
    ComparingRoot,
    Descending,
    Collecting,
    Done,
    Failed,
    TimedOut,
}

/// Identifiers each side holds that the other does not.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconDiff {
    /// Held by the peer only.
    pub to_fetch: BTreeSet<KeyIdentifier>,
    /// Held locally only.
    pub to_send: BTreeSet<KeyIdentifier>,
}

impl ReconDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_fetch.is_empty() && self.to_send.is_empty()
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReconError {
    #[error("transport error")]
    Transport(#[from] TransportError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("peer answered {prefix} with error: {code}")]
    Remote { prefix: Prefix, code: ErrorCode },

    #[error("more than {0} prefixes pending comparison")]
    TooManyPending(usize),
}

impl ReconError {
    /// Whether running the session again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[derive(Debug)]
pub enum SessionOutcome {
    Done(ReconDiff),
    Failed(ReconError),
    TimedOut,
}

impl SessionOutcome {
    #[must_use]
    pub const fn state(&self) -> SessionState {
        match self {
            Self::Done(_) => SessionState::Done,
            Self::Failed(_) => SessionState::Failed,
            Self::TimedOut => SessionState::TimedOut,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub nodes_compared: u64,
    pub nodes_pruned: u64,
    pub requests_sent: u64,
    pub elements_received: u64,
}

#[derive(Debug)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    /// The last non-terminal state the session entered.
    pub reached: SessionState,
    pub stats: SessionStats,
    pub took: Duration,
}

/// Runs reconciliation sessions against peers over a [`GossipTransport`].
///
/// Sessions only read the snapshot they are given. Applying the resulting
/// [`ReconDiff`] is up to the caller.
pub struct ReconciliationEngine {
    transport: Arc<dyn GossipTransport>,
    config: SessionConfig,
}

impl fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    pub fn new(transport: Arc<dyn GossipTransport>, config: SessionConfig) -> Self {
        Self { transport, config }
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn reconcile(&self, peer: &PeerDescriptor, snapshot: &TreeSnapshot) -> SessionReport {
        let started_at = Instant::now();
        let deadline = started_at + self.config.session_timeout;

        let mut session = Session {
            transport: &*self.transport,
            peer,
            snapshot,
            config: &self.config,
            deadline,
            state: SessionState::Start,
            pending: vec![],
            diff: ReconDiff::default(),
            stats: SessionStats::default(),
        };

        let result = time::timeout_at(deadline, session.run()).await;

        let outcome = match result {
            Ok(Ok(diff)) => SessionOutcome::Done(diff),
            Ok(Err(Interrupt::Failed(err))) => SessionOutcome::Failed(err),
            Ok(Err(Interrupt::Deadline)) | Err(_) => SessionOutcome::TimedOut,
        };

        let report = SessionReport {
            reached: session.state,
            stats: session.stats,
            took: started_at.elapsed(),
            outcome,
        };

        match &report.outcome {
            SessionOutcome::Done(diff) => info!(
                %peer,
                to_fetch = diff.to_fetch.len(),
                to_send = diff.to_send.len(),
                requests = report.stats.requests_sent,
                took = ?report.took,
                "Reconciliation finished"
            ),
            SessionOutcome::Failed(err) => warn!(
                %peer,
                state = ?report.reached,
                error = %err,
                "Reconciliation failed"
            ),
            SessionOutcome::TimedOut => warn!(
                %peer,
                state = ?report.reached,
                took = ?report.took,
                "Reconciliation timed out"
            ),
        }

        // one connection per session, the peer may close it while idle
        self.transport.disconnect(peer).await;

        report
    }
}

enum Interrupt {
    Failed(ReconError),
    Deadline,
}

impl From<ReconError> for Interrupt {
    fn from(err: ReconError) -> Self {
        Self::Failed(err)
    }
}

fn violation(reason: impl Into<String>) -> Interrupt {
    Interrupt::Failed(ReconError::ProtocolViolation(reason.into()))
}

struct Session<'a> {
    transport: &'a dyn GossipTransport,
    peer: &'a PeerDescriptor,
    snapshot: &'a TreeSnapshot,
    config: &'a SessionConfig,
    deadline: Instant,
    state: SessionState,
    pending: Vec<Prefix>,
    diff: ReconDiff,
    stats: SessionStats,
}

impl Session<'_> {
    async fn run(&mut self) -> Result<ReconDiff, Interrupt> {
        self.state = SessionState::ComparingRoot;
        self.compare(Prefix::ROOT).await?;

        self.state = SessionState::Descending;
        while let Some(prefix) = self.pending.pop() {
            self.compare(prefix).await?;
        }

        self.state = SessionState::Collecting;

        debug!(
            peer = %self.peer,
            compared = self.stats.nodes_compared,
            pruned = self.stats.nodes_pruned,
            "Collected differences"
        );

        Ok(mem::take(&mut self.diff))
    }

    async fn compare(&mut self, prefix: Prefix) -> Result<(), Interrupt> {
        let remote = self.request_node(prefix).await?;
        let local = self.snapshot.view(&prefix);

        self.stats.nodes_compared += 1;

        if local.matches(remote.num_elements, &remote.svalues) {
            self.stats.nodes_pruned += 1;
            return Ok(());
        }

        if remote.num_elements == 0 {
            self.diff.to_send.extend(self.snapshot.elements_under(&prefix));
            return Ok(());
        }

        let listable = remote.num_elements <= MAX_ELEMENTS_PER_RESPONSE as u64;

        if remote.is_leaf || (local.is_leaf && listable) {
            return self.compare_elements(prefix, remote.num_elements).await;
        }

        let params = self.snapshot.params();
        let quantum = params.bit_quantum();

        for (index, remote_hash) in remote.child_hashes.iter().enumerate() {
            let child = prefix.child(index, quantum);

            let local_hash = match local.child_hashes.get(index) {
                Some(hash) => *hash,
                None => self.snapshot.digest_of(&child),
            };

            if local_hash == *remote_hash {
                self.stats.nodes_pruned += 1;
                continue;
            }

            if remote_hash == params.empty_digest() {
                self.diff.to_send.extend(self.snapshot.elements_under(&child));
                continue;
            }

            if self.pending.len() >= self.config.max_pending {
                return Err(ReconError::TooManyPending(self.config.max_pending).into());
            }

            self.pending.push(child);
        }

        Ok(())
    }

    async fn compare_elements(&mut self, prefix: Prefix, expected: u64) -> Result<(), Interrupt> {
        let remote = self.request_elements(prefix).await?;

        if remote.len() as u64 != expected {
            return Err(violation(format!(
                "{prefix} listed {} elements, digest announced {expected}",
                remote.len()
            )));
        }

        let local = self.snapshot.elements_under(&prefix);

        self.diff
            .to_fetch
            .extend(remote.difference(&local).copied());
        self.diff.to_send.extend(local.difference(&remote).copied());

        Ok(())
    }

    async fn request_node(&mut self, prefix: Prefix) -> Result<NodeSummary, Interrupt> {
        let Message::NodeDigest(summary) = self.call(Message::RequestNode { prefix }).await? else {
            return Err(violation(format!("expected NodeDigest for {prefix}")));
        };

        self.validate_summary(&prefix, &summary)?;

        Ok(summary)
    }

    fn validate_summary(&self, prefix: &Prefix, summary: &NodeSummary) -> Result<(), Interrupt> {
        let params = self.snapshot.params();

        if summary.prefix != *prefix {
            return Err(violation(format!(
                "requested {prefix}, got digest for {}",
                summary.prefix
            )));
        }

        if summary.svalues.len() != params.num_samples() || !summary.svalues.is_reduced() {
            return Err(violation(format!("invalid svalues for {prefix}")));
        }

        if summary.is_leaf {
            if !summary.child_hashes.is_empty() {
                return Err(violation(format!("leaf {prefix} carries child hashes")));
            }
        } else {
            if summary.child_hashes.len() != params.fanout() {
                return Err(violation(format!(
                    "{prefix} carries {} child hashes, expected {}",
                    summary.child_hashes.len(),
                    params.fanout()
                )));
            }

            if params.depth_of(prefix) >= params.max_depth() {
                return Err(violation(format!("internal node {prefix} below maximum depth")));
            }
        }

        Ok(())
    }

    async fn request_elements(
        &mut self,
        prefix: Prefix,
    ) -> Result<BTreeSet<KeyIdentifier>, Interrupt> {
        let response = self.call(Message::RequestElements { prefix }).await?;

        let Message::ElementList {
            prefix: echoed,
            elements,
        } = response
        else {
            return Err(violation(format!("expected ElementList for {prefix}")));
        };

        if echoed != prefix {
            return Err(violation(format!(
                "requested elements of {prefix}, got {echoed}"
            )));
        }

        if elements.len() > MAX_ELEMENTS_PER_RESPONSE {
            return Err(violation(format!(
                "{prefix} listed {} elements",
                elements.len()
            )));
        }

        self.stats.elements_received += elements.len() as u64;

        let count = elements.len();
        let mut set = BTreeSet::new();

        for id in elements {
            if !prefix.contains(&id) {
                return Err(violation(format!("{id} does not lie under {prefix}")));
            }
            let _new = set.insert(id);
        }

        if set.len() != count {
            return Err(violation(format!("{prefix} listed duplicate elements")));
        }

        Ok(set)
    }

    async fn call(&mut self, request: Message) -> Result<Message, Interrupt> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());

        if remaining.is_zero() {
            return Err(Interrupt::Deadline);
        }

        let timeout = remaining.min(self.config.call_timeout);

        self.stats.requests_sent += 1;

        match self.transport.send(self.peer, request, timeout).await {
            Ok(Message::Error { prefix, code }) => {
                Err(ReconError::Remote { prefix, code }.into())
            }
            Ok(response) => Ok(response),
            Err(TransportError::Timeout(_)) if Instant::now() >= self.deadline => {
                Err(Interrupt::Deadline)
            }
            Err(err) if err.is_malformed() => Err(violation(format!("malformed response: {err}"))),
            Err(err) => Err(ReconError::Transport(err).into()),
        }
    }
}
