//! Persistent, concurrently readable prefix tree.
//!
//! Readers take [`TreeSnapshot`]s: a pointer copy of the current tree that no
//! later mutation can change. Mutations copy-on-write the arena (cheaply, only
//! node pointers are cloned, and only while a snapshot is outstanding), persist
//! the nodes they touched in one batch, and never hold the reader lock across I/O.

use core::fmt;
use core::ops::Deref;
use std::sync::Arc;
use std::time::Instant;

use borsh::{BorshDeserialize, BorshSerialize};
use keysync_primitives::{KeyIdentifier, Prefix};
use keysync_store::db::Column;
use keysync_store::tx::Transaction;
use keysync_store::Store;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TreeParams;
use crate::errors::TreeError;
use crate::node::{NodeDigest, PrefixNode};
use crate::tree::{PrefixTree, TreeDelta};

const PARAMS_KEY: &[u8] = b"prefix-tree/params";

/// The parameters a persisted tree was built with.
#[derive(Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
struct StoredParams {
    bit_quantum: u8,
    split_threshold: u32,
    max_depth: u8,
    sample_points: Vec<u64>,
}

impl From<&TreeParams> for StoredParams {
    fn from(params: &TreeParams) -> Self {
        Self {
            bit_quantum: params.bit_quantum(),
            split_threshold: params.split_threshold(),
            max_depth: params.max_depth(),
            sample_points: params.sample_points().to_vec(),
        }
    }
}

impl fmt::Display for StoredParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(bit_quantum={}, split_threshold={}, max_depth={}, sample_points={:?})",
            self.bit_quantum, self.split_threshold, self.max_depth, self.sample_points
        )
    }
}

/// A node row to write, or to delete when `None`.
type Row = (Prefix, Option<Arc<PrefixNode>>);

pub struct PrefixTreeStore {
    store: Store,
    params: Arc<TreeParams>,
    current: RwLock<Arc<PrefixTree>>,
    /// Serialises writers. Holds the persisted parameters while they differ
    /// from `params`.
    writer: Mutex<Option<String>>,
}

impl fmt::Debug for PrefixTreeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefixTreeStore")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl PrefixTreeStore {
    /// Loads the persisted tree, or initialises an empty one on a fresh store.
    ///
    /// Fails with [`TreeError::ConfigMismatch`] if the tree on disk was built with
    /// different parameters.
    pub fn open(store: Store, params: TreeParams) -> Result<Self, TreeError> {
        Self::load(store, params, false)
    }

    /// Like [`PrefixTreeStore::open`], but a tree persisted with different
    /// parameters is left untouched on disk instead of rejected.
    ///
    /// The store then serves an empty tree and refuses mutations until a
    /// successful [`PrefixTreeStore::rebuild`] replaces the old rows and records
    /// the new parameters in one batch. A failed rebuild leaves the old tree
    /// intact.
    pub fn open_for_rebuild(store: Store, params: TreeParams) -> Result<Self, TreeError> {
        Self::load(store, params, true)
    }

    fn load(store: Store, params: TreeParams, allow_mismatch: bool) -> Result<Self, TreeError> {
        let configured = StoredParams::from(&params);
        let params = Arc::new(params);

        let stored = store
            .get(Column::Meta, PARAMS_KEY)
            .map_err(TreeError::unavailable)?;

        let tree = match stored {
            None => {
                let tree = PrefixTree::new(Arc::clone(&params));

                let mut tx = Transaction::default();

                for key in stale_keys(&store)? {
                    tx.delete(Column::PrefixTree, key);
                }
                tx.put(Column::Meta, PARAMS_KEY.to_vec(), borsh::to_vec(&configured)?);
                tx.put(
                    Column::PrefixTree,
                    Prefix::ROOT.to_key(),
                    tree.root().encode()?,
                );

                store.apply(&tx).map_err(TreeError::unavailable)?;

                tree
            }
            Some(bytes) => {
                let stored = borsh::from_slice::<StoredParams>(&bytes)?;

                if stored != configured {
                    if !allow_mismatch {
                        return Err(TreeError::ConfigMismatch {
                            stored: stored.to_string(),
                            configured: configured.to_string(),
                        });
                    }

                    warn!(%stored, %configured, "Persisted prefix tree awaits rebuild");

                    let tree = PrefixTree::new(Arc::clone(&params));

                    return Ok(Self::with_tree(store, params, tree, Some(stored.to_string())));
                }

                let mut nodes = vec![];

                for entry in store.iter(Column::PrefixTree).map_err(TreeError::unavailable)? {
                    let (key, value) = entry.map_err(TreeError::unavailable)?;

                    let prefix = Prefix::from_key(&key)
                        .map_err(|err| TreeError::Corrupted(format!("bad node key: {err}")))?;

                    nodes.push(PrefixNode::decode(prefix, &value)?);
                }

                PrefixTree::from_nodes(Arc::clone(&params), nodes)?
            }
        };

        info!(
            elements = tree.len(),
            nodes = tree.node_count(),
            "Loaded prefix tree"
        );

        Ok(Self::with_tree(store, params, tree, None))
    }

    fn with_tree(
        store: Store,
        params: Arc<TreeParams>,
        tree: PrefixTree,
        stale_params: Option<String>,
    ) -> Self {
        Self {
            store,
            params,
            current: RwLock::new(Arc::new(tree)),
            writer: Mutex::new(stale_params),
        }
    }

    /// Whether the persisted tree was built with other parameters and still
    /// awaits a rebuild.
    #[must_use]
    pub fn awaits_rebuild(&self) -> bool {
        self.writer.lock().is_some()
    }

    #[must_use]
    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// A point-in-time view of the tree.
    #[must_use]
    pub fn snapshot_root(&self) -> TreeSnapshot {
        TreeSnapshot(Arc::clone(&*self.current.read()))
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.current.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, id: &KeyIdentifier) -> bool {
        self.current.read().contains(id)
    }

    /// Digest of the current root node.
    #[must_use]
    pub fn root_digest(&self) -> NodeDigest {
        self.current.read().root_digest()
    }

    /// Adds `id`. Returns `false` if it was already present.
    pub fn insert(&self, id: KeyIdentifier) -> Result<bool, TreeError> {
        let writer = self.writer.lock();
        self.ensure_current(writer.as_deref())?;

        let Some(rows) = self.mutate(|tree| tree.insert(id)) else {
            return Ok(false);
        };

        if let Err(err) = self.persist(&rows) {
            warn!(%id, %err, "Failed to persist insert, reverting");
            let _reverted = self.mutate(|tree| tree.remove(&id));
            return Err(err);
        }

        debug!(%id, nodes = rows.len(), "Inserted into prefix tree");

        Ok(true)
    }

    /// Removes `id`. Returns `false` if it was absent.
    pub fn remove(&self, id: &KeyIdentifier) -> Result<bool, TreeError> {
        let writer = self.writer.lock();
        self.ensure_current(writer.as_deref())?;

        let Some(rows) = self.mutate(|tree| tree.remove(id)) else {
            return Ok(false);
        };

        if let Err(err) = self.persist(&rows) {
            warn!(%id, %err, "Failed to persist removal, reverting");
            let _reverted = self.mutate(|tree| tree.insert(*id));
            return Err(err);
        }

        debug!(%id, nodes = rows.len(), "Removed from prefix tree");

        Ok(true)
    }

    /// Replaces the tree with one holding exactly `ids`.
    pub fn rebuild(&self, ids: impl IntoIterator<Item = KeyIdentifier>) -> Result<u64, TreeError> {
        self.rebuild_with_cancel(ids, &CancellationToken::new())
    }

    /// Like [`PrefixTreeStore::rebuild`], giving up once `cancel` fires.
    ///
    /// The replacement is built privately and persisted in a single batch, along
    /// with the parameters it was built with, before it is swapped in. On any
    /// error the current tree stays live and the persisted one untouched.
    pub fn rebuild_with_cancel(
        &self,
        ids: impl IntoIterator<Item = KeyIdentifier>,
        cancel: &CancellationToken,
    ) -> Result<u64, TreeError> {
        let started = Instant::now();

        let tree = PrefixTree::build(Arc::clone(&self.params), ids, Some(cancel))?;

        let mut writer = self.writer.lock();

        let mut tx = Transaction::default();

        for key in stale_keys(&self.store)? {
            tx.delete(Column::PrefixTree, key);
        }
        tx.put(
            Column::Meta,
            PARAMS_KEY.to_vec(),
            borsh::to_vec(&StoredParams::from(&*self.params))?,
        );
        for node in tree.nodes() {
            tx.put(Column::PrefixTree, node.prefix().to_key(), node.encode()?);
        }

        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }

        self.store.apply(&tx).map_err(TreeError::unavailable)?;

        let elements = tree.len();
        let nodes = tree.node_count();

        *self.current.write() = Arc::new(tree);
        *writer = None;

        info!(elements, nodes, took = ?started.elapsed(), "Rebuilt prefix tree");

        Ok(elements)
    }

    fn ensure_current(&self, stale_params: Option<&str>) -> Result<(), TreeError> {
        match stale_params {
            None => Ok(()),
            Some(stored) => Err(TreeError::ConfigMismatch {
                stored: stored.to_owned(),
                configured: StoredParams::from(&*self.params).to_string(),
            }),
        }
    }

    /// Applies `op` to the current tree and collects the rows it touched.
    fn mutate(&self, op: impl FnOnce(&mut PrefixTree) -> Option<TreeDelta>) -> Option<Vec<Row>> {
        let mut current = self.current.write();
        let tree = Arc::make_mut(&mut *current);

        let delta = op(tree)?;

        let rows = delta
            .upserted()
            .iter()
            .map(|prefix| (*prefix, tree.node(prefix).cloned()))
            .chain(delta.removed().iter().map(|prefix| (*prefix, None)))
            .collect();

        Some(rows)
    }

    fn persist(&self, rows: &[Row]) -> Result<(), TreeError> {
        let mut tx = Transaction::default();

        for (prefix, node) in rows {
            match node {
                Some(node) => tx.put(Column::PrefixTree, prefix.to_key(), node.encode()?),
                None => tx.delete(Column::PrefixTree, prefix.to_key()),
            }
        }

        self.store.apply(&tx).map_err(TreeError::unavailable)
    }
}

fn stale_keys(store: &Store) -> Result<Vec<Vec<u8>>, TreeError> {
    store
        .iter(Column::PrefixTree)
        .and_then(keysync_store::iter::Iter::keys)
        .map_err(TreeError::unavailable)
}

/// An immutable view of the tree at one point in time.
#[derive(Clone, Debug)]
pub struct TreeSnapshot(Arc<PrefixTree>);

impl TreeSnapshot {
    /// Snapshot of a tree that is not backed by a store.
    #[must_use]
    pub fn from_tree(tree: PrefixTree) -> Self {
        Self(Arc::new(tree))
    }
}

impl Deref for TreeSnapshot {
    type Target = PrefixTree;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
