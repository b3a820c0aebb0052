#[cfg(test)]
#[path = "tests/tree.rs"]
mod tests;

use std::collections::hash_map::HashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use keysync_primitives::{KeyIdentifier, Prefix};
use tokio_util::sync::CancellationToken;

use crate::config::TreeParams;
use crate::errors::TreeError;
use crate::node::{NodeDigest, NodeView, PrefixNode};

/// An arena of prefix-tree nodes keyed by their prefix.
///
/// The root is always present, as an empty leaf if need be. Non-root nodes only
/// exist for non-empty subtrees, and a node is internal exactly when
/// [`TreeParams::should_split`] says so for its element count, so the arena is a
/// pure function of the element set.
///
/// Cloning is shallow: nodes are shared until rewritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixTree {
    params: Arc<TreeParams>,
    nodes: HashMap<Prefix, Arc<PrefixNode>>,
}

/// Nodes written or dropped by a single mutation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeDelta {
    upserted: BTreeSet<Prefix>,
    removed: BTreeSet<Prefix>,
}

impl TreeDelta {
    fn upsert(&mut self, prefix: Prefix) {
        let _ignored = self.removed.remove(&prefix);
        let _ignored = self.upserted.insert(prefix);
    }

    fn remove(&mut self, prefix: Prefix) {
        let _ignored = self.upserted.remove(&prefix);
        let _ignored = self.removed.insert(prefix);
    }

    #[must_use]
    pub const fn upserted(&self) -> &BTreeSet<Prefix> {
        &self.upserted
    }

    #[must_use]
    pub const fn removed(&self) -> &BTreeSet<Prefix> {
        &self.removed
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.removed.is_empty()
    }
}

impl PrefixTree {
    #[must_use]
    pub fn new(params: Arc<TreeParams>) -> Self {
        let root = PrefixNode::leaf(Prefix::ROOT, BTreeSet::new(), &params);

        Self {
            params,
            nodes: HashMap::from([(Prefix::ROOT, Arc::new(root))]),
        }
    }

    /// Builds the tree holding exactly `ids`.
    pub fn build(
        params: Arc<TreeParams>,
        ids: impl IntoIterator<Item = KeyIdentifier>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Self, TreeError> {
        let elements = ids.into_iter().collect::<BTreeSet<_>>();

        let mut tree = Self {
            params,
            nodes: HashMap::new(),
        };

        let _root = tree.build_subtree(Prefix::ROOT, elements, cancel, &mut TreeDelta::default());

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(TreeError::Cancelled);
        }

        Ok(tree)
    }

    /// Reassembles a tree from persisted nodes.
    pub fn from_nodes(
        params: Arc<TreeParams>,
        nodes: impl IntoIterator<Item = PrefixNode>,
    ) -> Result<Self, TreeError> {
        let nodes = nodes
            .into_iter()
            .map(|node| (*node.prefix(), Arc::new(node)))
            .collect::<HashMap<_, _>>();

        let tree = Self { params, nodes };

        let Some(root) = tree.nodes.get(&Prefix::ROOT) else {
            return Err(TreeError::Corrupted("missing root node".to_owned()));
        };

        let quantum = tree.params.bit_quantum();

        for prefix in tree.nodes.keys() {
            if prefix.len() % quantum != 0 {
                return Err(TreeError::Corrupted(format!(
                    "node {prefix} is not aligned to the bit quantum"
                )));
            }

            if let Some(parent) = prefix.parent(quantum) {
                if tree.nodes.get(&parent).map_or(true, |node| node.is_leaf()) {
                    return Err(TreeError::Corrupted(format!(
                        "node {prefix} has no internal parent"
                    )));
                }
            }
        }

        let reachable = tree.subtree(Prefix::ROOT).len();
        if reachable != tree.nodes.len() {
            return Err(TreeError::Corrupted(format!(
                "{} of {} nodes are unreachable from the root",
                tree.nodes.len() - reachable,
                tree.nodes.len()
            )));
        }

        if root.num_elements() != tree.leaf_total() {
            return Err(TreeError::Corrupted(
                "root count disagrees with the leaves".to_owned(),
            ));
        }

        Ok(tree)
    }

    #[must_use]
    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    #[must_use]
    pub fn root(&self) -> &PrefixNode {
        // The root is inserted on construction and never removed.
        &self.nodes[&Prefix::ROOT]
    }

    #[must_use]
    pub fn root_digest(&self) -> NodeDigest {
        self.root().digest()
    }

    /// Number of identifiers in the tree.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.root().num_elements()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn node(&self, prefix: &Prefix) -> Option<&Arc<PrefixNode>> {
        self.nodes.get(prefix)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<PrefixNode>> {
        self.nodes.values()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn contains(&self, id: &KeyIdentifier) -> bool {
        self.path_to(id)
            .last()
            .and_then(|prefix| self.nodes.get(prefix))
            .and_then(|node| node.elements())
            .is_some_and(|elements| elements.contains(id))
    }

    /// Adds `id`, returning the changed nodes, or `None` if it was already present.
    pub fn insert(&mut self, id: KeyIdentifier) -> Option<TreeDelta> {
        let path = self.path_to(&id);
        let (&target, ancestors) = path.split_last()?;

        let mut elements = self
            .nodes
            .get(&target)
            .and_then(|node| node.elements())
            .cloned()
            .unwrap_or_default();

        if !elements.insert(id) {
            return None;
        }

        let mut delta = TreeDelta::default();

        self.replace_subtree(target, elements, &mut delta);
        self.refresh(ancestors, &mut delta);

        Some(delta)
    }

    /// Removes `id`, returning the changed nodes, or `None` if it was absent.
    pub fn remove(&mut self, id: &KeyIdentifier) -> Option<TreeDelta> {
        let path = self.path_to(id);
        let leaf = self.nodes.get(path.last()?)?;

        if !leaf.elements()?.contains(id) {
            return None;
        }

        // The highest node that stops qualifying as internal collapses, taking
        // everything below it along.
        let collapse_at = path
            .iter()
            .position(|prefix| {
                self.nodes.get(prefix).is_some_and(|node| {
                    !node.is_leaf()
                        && !self.params.should_split(prefix, node.num_elements() - 1)
                })
            })
            .unwrap_or(path.len() - 1);

        let target = path[collapse_at];

        let mut elements = self.elements_under(&target);
        let _removed = elements.remove(id);

        let mut delta = TreeDelta::default();

        self.replace_subtree(target, elements, &mut delta);
        self.refresh(&path[..collapse_at], &mut delta);

        Some(delta)
    }

    /// Summary of the subtree under `prefix`, whether or not a node exists there.
    #[must_use]
    pub fn view(&self, prefix: &Prefix) -> NodeView {
        if let Some(node) = self.nodes.get(prefix) {
            return node.view();
        }

        let elements = self.elements_under(prefix);

        if elements.is_empty() {
            return NodeView::empty(*prefix, &self.params);
        }

        NodeView::of_elements(*prefix, elements.iter(), &self.params)
    }

    /// Digest of the subtree under `prefix`.
    #[must_use]
    pub fn digest_of(&self, prefix: &Prefix) -> NodeDigest {
        match self.nodes.get(prefix) {
            Some(node) => node.digest(),
            None => self.view(prefix).digest(),
        }
    }

    /// Every identifier starting with `prefix`.
    #[must_use]
    pub fn elements_under(&self, prefix: &Prefix) -> BTreeSet<KeyIdentifier> {
        let quantum = self.params.bit_quantum();

        let mut elements = BTreeSet::new();
        let mut stack = vec![Prefix::ROOT];

        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };

            if let Some(leaf) = node.elements() {
                if prefix.covers(&current) {
                    elements.extend(leaf.iter().copied());
                } else {
                    elements.extend(leaf.iter().filter(|id| prefix.contains(id)).copied());
                }
                continue;
            }

            for index in 0..self.params.fanout() {
                let child = current.child(index, quantum);
                if prefix.covers(&child) || child.covers(prefix) {
                    stack.push(child);
                }
            }
        }

        elements
    }

    /// Prefixes from the root down to the leaf that holds, or would hold, `id`.
    ///
    /// The last entry is either an existing leaf or an empty child slot.
    fn path_to(&self, id: &KeyIdentifier) -> Vec<Prefix> {
        let quantum = self.params.bit_quantum();

        let mut path = vec![Prefix::ROOT];
        let mut current = Prefix::ROOT;

        while let Some(node) = self.nodes.get(&current) {
            if node.is_leaf() {
                break;
            }
            current = current.child(current.child_index(id, quantum), quantum);
            path.push(current);
        }

        path
    }

    /// Existing nodes at and below `prefix`.
    fn subtree(&self, prefix: Prefix) -> Vec<Prefix> {
        let quantum = self.params.bit_quantum();

        let mut found = vec![];
        let mut stack = vec![prefix];

        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };

            found.push(current);

            if !node.is_leaf() {
                stack.extend((0..self.params.fanout()).map(|index| current.child(index, quantum)));
            }
        }

        found
    }

    fn leaf_total(&self) -> u64 {
        self.nodes
            .values()
            .filter_map(|node| node.elements())
            .map(|elements| elements.len() as u64)
            .sum()
    }

    fn replace_subtree(
        &mut self,
        prefix: Prefix,
        elements: BTreeSet<KeyIdentifier>,
        delta: &mut TreeDelta,
    ) {
        for stale in self.subtree(prefix) {
            let _removed = self.nodes.remove(&stale);
            delta.remove(stale);
        }

        let _node = self.build_subtree(prefix, elements, None, delta);
    }

    /// Recomputes the internal nodes at `ancestors`, deepest first.
    fn refresh(&mut self, ancestors: &[Prefix], delta: &mut TreeDelta) {
        let quantum = self.params.bit_quantum();

        for &prefix in ancestors.iter().rev() {
            let children = (0..self.params.fanout())
                .map(|index| self.nodes.get(&prefix.child(index, quantum)).cloned())
                .collect::<Vec<_>>();

            let node = PrefixNode::internal(prefix, &children, &self.params);

            let _previous = self.nodes.insert(prefix, Arc::new(node));
            delta.upsert(prefix);
        }
    }

    /// Builds the canonical subtree for `elements` at `prefix`.
    ///
    /// Returns `None` for an empty non-root subtree, and stops early once `cancel`
    /// fires, leaving the arena incomplete.
    fn build_subtree(
        &mut self,
        prefix: Prefix,
        elements: BTreeSet<KeyIdentifier>,
        cancel: Option<&CancellationToken>,
        delta: &mut TreeDelta,
    ) -> Option<Arc<PrefixNode>> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return None;
        }

        if elements.is_empty() && !prefix.is_root() {
            return None;
        }

        let params = Arc::clone(&self.params);

        let node = if params.should_split(&prefix, elements.len() as u64) {
            let quantum = params.bit_quantum();

            let mut buckets = vec![BTreeSet::new(); params.fanout()];
            for id in elements {
                let _new = buckets[prefix.child_index(&id, quantum)].insert(id);
            }

            let children = buckets
                .into_iter()
                .enumerate()
                .map(|(index, bucket)| {
                    self.build_subtree(prefix.child(index, quantum), bucket, cancel, delta)
                })
                .collect::<Vec<_>>();

            PrefixNode::internal(prefix, &children, &params)
        } else {
            PrefixNode::leaf(prefix, elements, &params)
        };

        let node = Arc::new(node);

        let _previous = self.nodes.insert(prefix, Arc::clone(&node));
        delta.upsert(prefix);

        Some(node)
    }
}
