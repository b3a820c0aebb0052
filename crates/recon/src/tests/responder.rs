use std::collections::BTreeSet;
use std::sync::Arc;

use keysync_primitives::identifier::IDENTIFIER_LEN;
use keysync_primitives::KeyIdentifier;
use keysync_ptree::PrefixTree;
use keysync_store::Store;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;

fn params() -> TreeParams {
    TreeParams::new(2, 4, 8, vec![5, 6, 7]).unwrap()
}

fn ids(seed: u64, count: usize) -> Vec<KeyIdentifier> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..count)
        .map(|_| KeyIdentifier::from_bytes(rng.gen()))
        .collect()
}

fn snapshot(ids: &[KeyIdentifier]) -> TreeSnapshot {
    let tree = PrefixTree::build(Arc::new(params()), ids.iter().copied(), None).unwrap();

    TreeSnapshot::from_tree(tree)
}

#[test]
fn test_root_request_returns_the_root_summary() {
    let ids = ids(1, 40);
    let snapshot = snapshot(&ids);

    let response = respond(
        &snapshot,
        &Message::RequestNode {
            prefix: Prefix::ROOT,
        },
    );

    let Message::NodeDigest(summary) = response else {
        panic!("expected a digest, got {response:?}");
    };

    assert_eq!(summary, NodeSummary::from(snapshot.view(&Prefix::ROOT)));
    assert_eq!(summary.num_elements, 40);
    assert!(!summary.is_leaf);
    assert_eq!(summary.child_hashes.len(), 4);
}

#[test]
fn test_elements_are_listed_per_prefix() {
    let ids = ids(2, 60);
    let snapshot = snapshot(&ids);

    let prefix = Prefix::of(&ids[0], 4);

    let response = respond(&snapshot, &Message::RequestElements { prefix });

    let Message::ElementList {
        prefix: echoed,
        elements,
    } = response
    else {
        panic!("expected an element list, got {response:?}");
    };

    let expected = ids
        .iter()
        .filter(|id| prefix.contains(id))
        .copied()
        .collect::<BTreeSet<_>>();

    assert_eq!(echoed, prefix);
    assert_eq!(elements.into_iter().collect::<BTreeSet<_>>(), expected);
}

#[test]
fn test_unaddressable_prefixes_are_malformed() {
    let snapshot = snapshot(&ids(3, 10));
    let id = KeyIdentifier::from_bytes([0xff; IDENTIFIER_LEN]);

    for prefix in [Prefix::of(&id, 3), Prefix::of(&id, 18)] {
        assert_eq!(
            respond(&snapshot, &Message::RequestNode { prefix }),
            Message::Error {
                prefix,
                code: ErrorCode::Malformed,
            }
        );
        assert_eq!(
            respond(&snapshot, &Message::RequestElements { prefix }),
            Message::Error {
                prefix,
                code: ErrorCode::Malformed,
            }
        );
    }
}

#[test]
fn test_responses_are_not_answered() {
    let snapshot = snapshot(&ids(4, 10));

    let request = Message::ElementList {
        prefix: Prefix::ROOT,
        elements: vec![],
    };

    assert_eq!(
        respond(&snapshot, &request),
        Message::Error {
            prefix: Prefix::ROOT,
            code: ErrorCode::Unsupported,
        }
    );
}

#[test]
fn test_oversized_listing_is_refused() {
    let snapshot = snapshot(&ids(5, MAX_ELEMENTS_PER_RESPONSE + 1));

    assert_eq!(
        respond(
            &snapshot,
            &Message::RequestElements {
                prefix: Prefix::ROOT,
            }
        ),
        Message::Error {
            prefix: Prefix::ROOT,
            code: ErrorCode::Busy,
        }
    );
}

#[test]
fn test_responder_pins_a_snapshot_per_session() {
    let store = Arc::new(PrefixTreeStore::open(Store::in_memory(), params()).unwrap());

    let before = ids(6, 3);
    for id in &before {
        assert!(store.insert(*id).unwrap());
    }

    let mut responder = Responder::new(Arc::clone(&store));

    let root = Message::RequestNode {
        prefix: Prefix::ROOT,
    };
    let listing = Message::RequestElements {
        prefix: Prefix::ROOT,
    };

    let Message::NodeDigest(first) = responder.handle(&root) else {
        panic!("expected a digest");
    };
    assert_eq!(first.num_elements, 3);

    let late = KeyIdentifier::from_bytes([0xab; IDENTIFIER_LEN]);
    assert!(store.insert(late).unwrap());

    let Message::ElementList { elements, .. } = responder.handle(&listing) else {
        panic!("expected an element list");
    };
    assert_eq!(elements.len(), 3);
    assert!(!elements.contains(&late));

    let Message::NodeDigest(second) = responder.handle(&root) else {
        panic!("expected a digest");
    };
    assert_eq!(second.num_elements, 4);
}
