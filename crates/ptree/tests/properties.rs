use std::collections::BTreeSet;
use std::sync::Arc;

use keysync_primitives::{KeyIdentifier, Prefix};
use keysync_ptree::{PrefixTree, SValues, TreeParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn small_params() -> Arc<TreeParams> {
    Arc::new(TreeParams::new(2, 4, 6, vec![101, 103, 107, 109]).unwrap())
}

fn random_id(rng: &mut StdRng) -> KeyIdentifier {
    KeyIdentifier::from_bytes(rng.gen())
}

#[test]
fn incremental_maintenance_matches_full_build() {
    let params = small_params();
    let mut rng = StdRng::seed_from_u64(0x6b65_7973);

    let mut tree = PrefixTree::new(Arc::clone(&params));
    let mut members = BTreeSet::new();
    let mut pool = Vec::new();

    for step in 0..2_000 {
        let remove = !pool.is_empty() && rng.gen_bool(0.4);

        if remove {
            let id = pool.swap_remove(rng.gen_range(0..pool.len()));
            let changed = tree.remove(&id).is_some();
            assert_eq!(changed, members.remove(&id), "step {step}");
        } else {
            let id = random_id(&mut rng);
            pool.push(id);
            assert!(tree.insert(id).is_some(), "step {step}");
            assert!(members.insert(id));
        }

        if step % 250 == 0 {
            let rebuilt = PrefixTree::build(Arc::clone(&params), members.iter().copied(), None)
                .unwrap();
            assert_eq!(tree, rebuilt, "step {step}");
        }
    }

    let expected = SValues::of_elements(&members, params.sample_points());

    assert_eq!(tree.len(), members.len() as u64);
    assert_eq!(*tree.root().svalues(), expected);
    assert_eq!(tree.elements_under(&Prefix::ROOT), members);
    assert_eq!(
        tree,
        PrefixTree::build(params, members.iter().copied(), None).unwrap()
    );
}

#[test]
fn insert_then_remove_restores_shape() {
    let params = small_params();
    let mut rng = StdRng::seed_from_u64(42);

    let ids = (0..300).map(|_| random_id(&mut rng)).collect::<Vec<_>>();
    let mut tree = PrefixTree::build(params, ids, None).unwrap();

    for _ in 0..100 {
        let before = tree.clone();
        let id = random_id(&mut rng);

        assert!(tree.insert(id).is_some());
        assert_ne!(tree.root_digest(), before.root_digest());

        assert!(tree.remove(&id).is_some());
        assert_eq!(tree, before);
    }
}

#[test]
fn duplicate_insert_does_not_double_count() {
    let params = small_params();
    let mut rng = StdRng::seed_from_u64(7);

    let ids = (0..50).map(|_| random_id(&mut rng)).collect::<Vec<_>>();
    let mut tree = PrefixTree::build(params, ids.iter().copied(), None).unwrap();
    let digest = tree.root_digest();

    for id in &ids {
        assert!(tree.insert(*id).is_none());
    }

    assert!(tree.remove(&random_id(&mut rng)).is_none());
    assert_eq!(tree.root_digest(), digest);
    assert_eq!(tree.len(), 50);
}

#[test]
fn empty_build_yields_empty_root() {
    let params = small_params();

    let tree = PrefixTree::build(Arc::clone(&params), [], None).unwrap();

    assert!(tree.is_empty());
    assert_eq!(tree.node_count(), 1);
    assert_eq!(*tree.root().svalues(), params.empty_svalues());
    assert_eq!(tree.root_digest(), *params.empty_digest());
}

#[test]
fn views_agree_across_shapes() {
    // The same set seen through a split tree and a single leaf summarises
    // identically under every prefix.
    let split = small_params();
    let flat = Arc::new(TreeParams::new(2, 10_000, 6, split.sample_points().to_vec()).unwrap());

    let mut rng = StdRng::seed_from_u64(99);
    let ids = (0..200).map(|_| random_id(&mut rng)).collect::<Vec<_>>();

    let split_tree = PrefixTree::build(split, ids.iter().copied(), None).unwrap();
    let flat_tree = PrefixTree::build(flat, ids.iter().copied(), None).unwrap();

    assert!(!split_tree.root().is_leaf());
    assert!(flat_tree.root().is_leaf());

    let mut prefixes = vec![Prefix::ROOT];
    for _ in 0..3 {
        prefixes = prefixes
            .iter()
            .flat_map(|prefix| (0..4).map(move |index| prefix.child(index, 2)))
            .collect();

        for prefix in &prefixes {
            let left = split_tree.view(prefix);
            let right = flat_tree.view(prefix);

            assert_eq!(left.num_elements, right.num_elements, "{prefix}");
            assert_eq!(left.svalues, right.svalues, "{prefix}");
            assert_eq!(split_tree.digest_of(prefix), flat_tree.digest_of(prefix));
            assert_eq!(
                split_tree.elements_under(prefix),
                flat_tree.elements_under(prefix)
            );
        }
    }
}
