//! Prometheus metrics of the reconciliation cycle.
//!
//! - `keysync_sessions_total{outcome}`: sessions by terminal state
//! - `keysync_session_duration_seconds{outcome}`: session duration
//! - `keysync_session_requests_total`: reconciliation requests sent
//! - `keysync_keys_fetched_total`, `keysync_keys_inserted_total`
//! - `keysync_keys_skipped_total{reason}`: fetched keys not applied
//! - `keysync_peers_unreachable_total`
//! - `keysync_rebuilds_total{outcome}`
//! - `keysync_tree_elements`: identifiers in the prefix tree

use std::sync::atomic::AtomicU64;

use keysync_recon::{SessionReport, SessionState};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::sync::ApplyStats;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReasonLabels {
    reason: &'static str,
}

/// Metric handles; clones share the underlying values.
#[derive(Clone, Debug)]
pub struct SyncMetrics {
    sessions: Family<OutcomeLabels, Counter>,
    session_duration_seconds: Family<OutcomeLabels, Histogram>,
    requests_sent: Counter<u64, AtomicU64>,
    keys_fetched: Counter<u64, AtomicU64>,
    keys_inserted: Counter<u64, AtomicU64>,
    keys_skipped: Family<ReasonLabels, Counter>,
    peers_unreachable: Counter<u64, AtomicU64>,
    rebuilds: Family<OutcomeLabels, Counter>,
    tree_elements: Gauge,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self {
            sessions: Family::default(),
            session_duration_seconds: Family::new_with_constructor(|| {
                // 10ms to ~160s
                Histogram::new(exponential_buckets(0.01, 2.0, 15))
            }),
            requests_sent: Counter::default(),
            keys_fetched: Counter::default(),
            keys_inserted: Counter::default(),
            keys_skipped: Family::default(),
            peers_unreachable: Counter::default(),
            rebuilds: Family::default(),
            tree_elements: Gauge::default(),
        }
    }
}

impl SyncMetrics {
    /// Creates the metrics and registers them under the `keysync` prefix.
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();

        let registry = registry.sub_registry_with_prefix("keysync");

        registry.register(
            "sessions",
            "Reconciliation sessions by outcome",
            metrics.sessions.clone(),
        );
        registry.register(
            "session_duration_seconds",
            "Duration of reconciliation sessions in seconds",
            metrics.session_duration_seconds.clone(),
        );
        registry.register(
            "session_requests",
            "Reconciliation requests sent to peers",
            metrics.requests_sent.clone(),
        );
        registry.register(
            "keys_fetched",
            "Keys fetched from peers",
            metrics.keys_fetched.clone(),
        );
        registry.register(
            "keys_inserted",
            "Fetched keys added to the key store",
            metrics.keys_inserted.clone(),
        );
        registry.register(
            "keys_skipped",
            "Fetched keys that were not applied",
            metrics.keys_skipped.clone(),
        );
        registry.register(
            "peers_unreachable",
            "Peers that exhausted their attempts in a cycle",
            metrics.peers_unreachable.clone(),
        );
        registry.register(
            "rebuilds",
            "Prefix tree rebuilds by outcome",
            metrics.rebuilds.clone(),
        );
        registry.register(
            "tree_elements",
            "Identifiers held by the prefix tree",
            metrics.tree_elements.clone(),
        );

        metrics
    }

    pub(crate) fn record_session(&self, report: &SessionReport) {
        let outcome = match report.outcome.state() {
            SessionState::Done => "done",
            SessionState::TimedOut => "timed_out",
            _ => "failed",
        };

        let labels = OutcomeLabels { outcome };

        let _previous = self.sessions.get_or_create(&labels).inc();
        self.session_duration_seconds
            .get_or_create(&labels)
            .observe(report.took.as_secs_f64());
        let _previous = self.requests_sent.inc_by(report.stats.requests_sent);
    }

    pub(crate) fn record_apply(&self, stats: &ApplyStats) {
        let _previous = self.keys_fetched.inc_by(stats.fetched as u64);
        let _previous = self.keys_inserted.inc_by(stats.inserted as u64);

        for (reason, count) in [
            ("blacklisted", stats.skipped_blacklisted),
            ("mismatched", stats.skipped_mismatched),
        ] {
            let _previous = self
                .keys_skipped
                .get_or_create(&ReasonLabels { reason })
                .inc_by(count as u64);
        }
    }

    pub(crate) fn record_unreachable(&self) {
        let _previous = self.peers_unreachable.inc();
    }

    pub(crate) fn record_rebuild(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };

        let _previous = self.rebuilds.get_or_create(&OutcomeLabels { outcome }).inc();
    }

    pub(crate) fn set_tree_elements(&self, count: u64) {
        let _previous = self
            .tree_elements
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}
