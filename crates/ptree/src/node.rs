use std::collections::BTreeSet;
use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use keysync_primitives::{KeyIdentifier, Prefix};
use sha2::{Digest, Sha256};

use crate::config::TreeParams;
use crate::svalue::SValues;

pub type NodeDigest = [u8; 32];

const DIGEST_DOMAIN: &[u8] = b"keysync-node";

/// Digest of a subtree from its element count and svalues.
#[must_use]
pub fn node_digest(num_elements: u64, svalues: &SValues) -> NodeDigest {
    let mut hasher = Sha256::new();

    hasher.update(DIGEST_DOMAIN);
    hasher.update(num_elements.to_be_bytes());
    for value in svalues.as_slice() {
        hasher.update(value.to_be_bytes());
    }

    hasher.finalize().into()
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum NodeKind {
    Leaf { elements: BTreeSet<KeyIdentifier> },
    Internal { child_hashes: Vec<NodeDigest> },
}

/// A node of the prefix tree.
///
/// The prefix is the node's address in the arena and its storage key, so it is
/// not part of the persisted body.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PrefixNode {
    #[borsh(skip)]
    prefix: Prefix,
    num_elements: u64,
    svalues: SValues,
    kind: NodeKind,
}

impl PrefixNode {
    pub(crate) fn leaf(prefix: Prefix, elements: BTreeSet<KeyIdentifier>, params: &TreeParams) -> Self {
        let svalues = SValues::of_elements(&elements, params.sample_points());

        Self {
            prefix,
            num_elements: elements.len() as u64,
            svalues,
            kind: NodeKind::Leaf { elements },
        }
    }

    /// An internal node over `children`, one slot per child index.
    pub(crate) fn internal(
        prefix: Prefix,
        children: &[Option<Arc<Self>>],
        params: &TreeParams,
    ) -> Self {
        let mut num_elements = 0;
        let mut svalues = params.empty_svalues();
        let mut child_hashes = Vec::with_capacity(children.len());

        for child in children {
            match child {
                Some(child) => {
                    num_elements += child.num_elements;
                    svalues.combine(&child.svalues);
                    child_hashes.push(child.digest());
                }
                None => child_hashes.push(*params.empty_digest()),
            }
        }

        Self {
            prefix,
            num_elements,
            svalues,
            kind: NodeKind::Internal { child_hashes },
        }
    }

    #[must_use]
    pub const fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    #[must_use]
    pub const fn num_elements(&self) -> u64 {
        self.num_elements
    }

    #[must_use]
    pub const fn svalues(&self) -> &SValues {
        &self.svalues
    }

    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Elements of a leaf, `None` for internal nodes.
    #[must_use]
    pub const fn elements(&self) -> Option<&BTreeSet<KeyIdentifier>> {
        match &self.kind {
            NodeKind::Leaf { elements } => Some(elements),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Child digests of an internal node, empty for leaves.
    #[must_use]
    pub fn child_hashes(&self) -> &[NodeDigest] {
        match &self.kind {
            NodeKind::Leaf { .. } => &[],
            NodeKind::Internal { child_hashes } => child_hashes,
        }
    }

    #[must_use]
    pub fn digest(&self) -> NodeDigest {
        node_digest(self.num_elements, &self.svalues)
    }

    #[must_use]
    pub fn view(&self) -> NodeView {
        NodeView {
            prefix: self.prefix,
            num_elements: self.num_elements,
            svalues: self.svalues.clone(),
            child_hashes: self.child_hashes().to_vec(),
            is_leaf: self.is_leaf(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, std::io::Error> {
        borsh::to_vec(self)
    }

    pub fn decode(prefix: Prefix, bytes: &[u8]) -> Result<Self, std::io::Error> {
        let mut node = borsh::from_slice::<Self>(bytes)?;
        node.prefix = prefix;
        Ok(node)
    }
}

/// What one side of a reconciliation knows about the subtree under a prefix.
///
/// Either an actual node, or a leaf-shaped summary of the elements under a
/// prefix the tree has no node for (a sub-range of a leaf, or empty).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeView {
    pub prefix: Prefix,
    pub num_elements: u64,
    pub svalues: SValues,
    pub child_hashes: Vec<NodeDigest>,
    pub is_leaf: bool,
}

impl NodeView {
    #[must_use]
    pub fn of_elements<'a>(
        prefix: Prefix,
        elements: impl ExactSizeIterator<Item = &'a KeyIdentifier>,
        params: &TreeParams,
    ) -> Self {
        let num_elements = elements.len() as u64;

        Self {
            prefix,
            num_elements,
            svalues: SValues::of_elements(elements, params.sample_points()),
            child_hashes: vec![],
            is_leaf: true,
        }
    }

    #[must_use]
    pub fn empty(prefix: Prefix, params: &TreeParams) -> Self {
        Self {
            prefix,
            num_elements: 0,
            svalues: params.empty_svalues(),
            child_hashes: vec![],
            is_leaf: true,
        }
    }

    #[must_use]
    pub fn digest(&self) -> NodeDigest {
        node_digest(self.num_elements, &self.svalues)
    }

    /// Whether both sides summarise the same element set.
    #[must_use]
    pub fn matches(&self, num_elements: u64, svalues: &SValues) -> bool {
        self.num_elements == num_elements && self.svalues == *svalues
    }
}
