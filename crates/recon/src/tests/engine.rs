use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keysync_primitives::identifier::IDENTIFIER_LEN;
use keysync_ptree::node::NodeDigest;
use keysync_ptree::{PrefixTreeStore, SValues, TreeParams};
use keysync_store::Store;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::memory::InProcessTransport;

fn params() -> TreeParams {
    TreeParams::new(2, 4, 8, vec![5, 6, 7]).unwrap()
}

fn id(byte: u8) -> KeyIdentifier {
    KeyIdentifier::from_bytes([byte; IDENTIFIER_LEN])
}

fn ids(seed: u64, count: usize) -> Vec<KeyIdentifier> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..count)
        .map(|_| KeyIdentifier::from_bytes(rng.gen()))
        .collect()
}

fn tree_store(ids: &[KeyIdentifier]) -> Arc<PrefixTreeStore> {
    let store = PrefixTreeStore::open(Store::in_memory(), params()).unwrap();

    for id in ids {
        let _new = store.insert(*id).unwrap();
    }

    Arc::new(store)
}

fn peer() -> PeerDescriptor {
    PeerDescriptor::new("peer.example", 11371, 11370)
}

/// An engine whose peer serves `remote`.
fn engine_against(remote: &[KeyIdentifier], config: SessionConfig) -> ReconciliationEngine {
    let transport = InProcessTransport::new();
    transport.register(&peer(), tree_store(remote));

    ReconciliationEngine::new(Arc::new(transport), config)
}

fn expect_done(report: SessionReport) -> ReconDiff {
    match report.outcome {
        SessionOutcome::Done(diff) => diff,
        outcome => panic!("session did not complete: {outcome:?}"),
    }
}

#[tokio::test]
async fn test_symmetric_difference_of_small_sets() {
    let local = tree_store(&[id(1), id(2), id(3)]);
    let engine = engine_against(&[id(2), id(3), id(4)], SessionConfig::default());

    let report = engine.reconcile(&peer(), &local.snapshot_root()).await;

    assert_eq!(report.reached, SessionState::Collecting);
    assert_eq!(report.outcome.state(), SessionState::Done);

    let diff = expect_done(report);
    assert_eq!(diff.to_fetch, BTreeSet::from([id(4)]));
    assert_eq!(diff.to_send, BTreeSet::from([id(1)]));
}

#[tokio::test]
async fn test_identical_trees_are_pruned_at_the_root() {
    let ids = ids(1, 300);
    let local = tree_store(&ids);
    let engine = engine_against(&ids, SessionConfig::default());

    let report = engine.reconcile(&peer(), &local.snapshot_root()).await;

    assert_eq!(report.stats.requests_sent, 1);
    assert_eq!(report.stats.nodes_pruned, 1);
    assert!(expect_done(report).is_empty());
}

#[tokio::test]
async fn test_random_sets_reconcile_exactly() {
    let common = ids(2, 800);
    let local_only = ids(3, 37);
    let remote_only = ids(4, 23);

    let local_ids = common.iter().chain(&local_only).copied().collect::<Vec<_>>();
    let remote_ids = common.iter().chain(&remote_only).copied().collect::<Vec<_>>();

    let local = tree_store(&local_ids);
    let engine = engine_against(&remote_ids, SessionConfig::default());

    let report = engine.reconcile(&peer(), &local.snapshot_root()).await;

    assert!(report.stats.nodes_pruned > 0);
    assert!(report.stats.elements_received < 800);

    let diff = expect_done(report);
    assert_eq!(diff.to_send, local_only.into_iter().collect());
    assert_eq!(diff.to_fetch, remote_only.into_iter().collect());
}

#[tokio::test]
async fn test_empty_sides() {
    let ids = ids(5, 120);

    let local = tree_store(&ids);
    let engine = engine_against(&[], SessionConfig::default());

    let report = engine.reconcile(&peer(), &local.snapshot_root()).await;
    assert_eq!(report.stats.requests_sent, 1);

    let diff = expect_done(report);
    assert_eq!(diff.to_send, ids.iter().copied().collect());
    assert!(diff.to_fetch.is_empty());

    let local = tree_store(&[]);
    let engine = engine_against(&ids, SessionConfig::default());

    let diff = expect_done(engine.reconcile(&peer(), &local.snapshot_root()).await);
    assert_eq!(diff.to_fetch, ids.iter().copied().collect());
    assert!(diff.to_send.is_empty());
}

#[tokio::test]
async fn test_unknown_peer_fails_retryably() {
    let local = tree_store(&[id(1)]);
    let engine = ReconciliationEngine::new(
        Arc::new(InProcessTransport::new()),
        SessionConfig::default(),
    );

    let report = engine.reconcile(&peer(), &local.snapshot_root()).await;

    assert_eq!(report.reached, SessionState::ComparingRoot);

    let SessionOutcome::Failed(err) = report.outcome else {
        panic!("expected a failure, got {:?}", report.outcome);
    };
    assert!(matches!(
        err,
        ReconError::Transport(TransportError::UnknownPeer(_))
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_pending_stack_is_bounded() {
    let local = tree_store(&ids(6, 200));
    let config = SessionConfig {
        max_pending: 1,
        ..SessionConfig::default()
    };
    let engine = engine_against(&ids(7, 200), config);

    let report = engine.reconcile(&peer(), &local.snapshot_root()).await;

    assert!(matches!(
        report.outcome,
        SessionOutcome::Failed(ReconError::TooManyPending(1))
    ));
}

struct ScriptedTransport {
    responses: Mutex<VecDeque<Message>>,
    disconnected: AtomicBool,
}

impl ScriptedTransport {
    fn with(responses: impl IntoIterator<Item = Message>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            disconnected: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl GossipTransport for ScriptedTransport {
    async fn send(
        &self,
        _peer: &PeerDescriptor,
        _message: Message,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        let next = self.responses.lock().pop_front();

        match next {
            Some(response) => Ok(response),
            None => {
                time::sleep(timeout).await;
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    async fn disconnect(&self, _peer: &PeerDescriptor) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

fn summary(num_elements: u64, child_hashes: Vec<NodeDigest>, is_leaf: bool) -> Message {
    Message::NodeDigest(NodeSummary {
        prefix: Prefix::ROOT,
        num_elements,
        svalues: SValues::from_vec(vec![1, 2, 3]),
        child_hashes,
        is_leaf,
    })
}

async fn run_scripted(responses: Vec<Message>) -> (SessionReport, Arc<ScriptedTransport>) {
    let transport = ScriptedTransport::with(responses);
    let engine = ReconciliationEngine::new(transport.clone(), SessionConfig::default());

    let local = tree_store(&[id(1), id(2)]);
    let report = engine.reconcile(&peer(), &local.snapshot_root()).await;

    (report, transport)
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_times_out_without_touching_the_tree() {
    let transport = ScriptedTransport::with([]);
    let config = SessionConfig {
        session_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    };
    let engine = ReconciliationEngine::new(transport.clone(), config);

    let local = tree_store(&[id(1), id(2)]);
    let before = local.snapshot_root();

    let report = engine.reconcile(&peer(), &local.snapshot_root()).await;

    assert!(matches!(report.outcome, SessionOutcome::TimedOut));
    assert_eq!(report.reached, SessionState::ComparingRoot);
    assert!(report.took >= Duration::from_secs(5));
    assert!(transport.disconnected.load(Ordering::SeqCst));

    assert_eq!(*local.snapshot_root(), *before);
}

#[tokio::test]
async fn test_completed_session_releases_its_connection() {
    let (report, transport) = run_scripted(vec![
        summary(2, vec![], true),
        Message::ElementList {
            prefix: Prefix::ROOT,
            elements: vec![id(1), id(2)],
        },
    ])
    .await;

    assert!(matches!(report.outcome, SessionOutcome::Done(_)), "{:?}", report.outcome);
    assert!(transport.disconnected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_malformed_digests_are_protocol_violations() {
    let cases = [
        // wrong number of child hashes
        summary(10, vec![[0; 32]; 3], false),
        // leaf with child hashes
        summary(10, vec![[0; 32]; 4], true),
        // wrong svalue count
        Message::NodeDigest(NodeSummary {
            prefix: Prefix::ROOT,
            num_elements: 1,
            svalues: SValues::from_vec(vec![1]),
            child_hashes: vec![],
            is_leaf: true,
        }),
        // not a digest at all
        Message::ElementList {
            prefix: Prefix::ROOT,
            elements: vec![],
        },
    ];

    for response in cases {
        let (report, transport) = run_scripted(vec![response]).await;

        assert!(
            matches!(
                report.outcome,
                SessionOutcome::Failed(ReconError::ProtocolViolation(_))
            ),
            "{:?}",
            report.outcome
        );
        assert!(transport.disconnected.load(Ordering::SeqCst));
    }
}

#[tokio::test]
async fn test_element_lists_must_match_the_digest() {
    let outside = Prefix::of(&id(0xff), 2);

    // announces 3 elements, lists 1
    let (report, _) = run_scripted(vec![
        summary(3, vec![], true),
        Message::ElementList {
            prefix: Prefix::ROOT,
            elements: vec![id(9)],
        },
    ])
    .await;
    assert!(matches!(
        report.outcome,
        SessionOutcome::Failed(ReconError::ProtocolViolation(_))
    ));

    // elements outside the requested prefix
    let transport = ScriptedTransport::with([
        Message::NodeDigest(NodeSummary {
            prefix: Prefix::ROOT,
            num_elements: 200,
            svalues: SValues::from_vec(vec![1, 2, 3]),
            child_hashes: vec![[1; 32]; 4],
            is_leaf: false,
        }),
        Message::NodeDigest(NodeSummary {
            prefix: outside,
            num_elements: 1,
            svalues: SValues::from_vec(vec![1, 2, 3]),
            child_hashes: vec![],
            is_leaf: true,
        }),
        Message::ElementList {
            prefix: outside,
            elements: vec![id(0)],
        },
    ]);
    let engine = ReconciliationEngine::new(transport, SessionConfig::default());
    let local = tree_store(&ids(8, 50));

    let report = engine.reconcile(&peer(), &local.snapshot_root()).await;
    assert_eq!(report.reached, SessionState::Descending);
    assert!(matches!(
        report.outcome,
        SessionOutcome::Failed(ReconError::ProtocolViolation(_))
    ));
}

#[tokio::test]
async fn test_remote_errors_are_not_retryable() {
    let (report, _) = run_scripted(vec![Message::Error {
        prefix: Prefix::ROOT,
        code: ErrorCode::Busy,
    }])
    .await;

    let SessionOutcome::Failed(err) = report.outcome else {
        panic!("expected a failure");
    };
    assert!(matches!(
        err,
        ReconError::Remote {
            code: ErrorCode::Busy,
            ..
        }
    ));
    assert!(!err.is_retryable());
}
