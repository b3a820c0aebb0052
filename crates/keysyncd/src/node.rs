//! Wiring of the on-disk store, the prefix tree and the coordinator.

use std::sync::Arc;

use camino::Utf8Path;
use eyre::{bail, Result as EyreResult, WrapErr};
use keysync_config::ConfigFile;
use keysync_node::{EmbeddedKeyStore, HttpKeyFetcher, SyncCoordinator, SyncMetrics};
use keysync_ptree::PrefixTreeStore;
use keysync_recon::TcpTransport;
use keysync_store::config::StoreConfig;
use keysync_store::Store;
use keysync_store_rocksdb::RocksDB;
use prometheus_client::registry::Registry;
use tracing::info;

pub struct Node {
    pub config: ConfigFile,
    pub tree: Arc<PrefixTreeStore>,
    pub coordinator: Arc<SyncCoordinator>,
}

impl Node {
    /// Opens the node initialized in `home`, registering its metrics in
    /// `registry`.
    pub fn open(home: &Utf8Path, registry: &mut Registry) -> EyreResult<Self> {
        Self::assemble(home, registry, false)
    }

    /// Opens the node for a one-off operator command.
    pub fn open_offline(home: &Utf8Path) -> EyreResult<Self> {
        Self::assemble(home, &mut Registry::default(), false)
    }

    /// Opens the node for `rebuild-prefix-tree`. A tree persisted with other
    /// parameters stays on disk until the rebuild replaces it.
    pub fn open_for_rebuild(home: &Utf8Path) -> EyreResult<Self> {
        Self::assemble(home, &mut Registry::default(), true)
    }

    fn assemble(home: &Utf8Path, registry: &mut Registry, for_rebuild: bool) -> EyreResult<Self> {
        if !ConfigFile::exists(home) {
            bail!("Node is not initialized in {:?}", home);
        }

        let config = ConfigFile::load(home)?;

        let params = config.tree.params()?;
        let datastore = home.join(&config.datastore.path);

        let store = Store::open::<RocksDB>(&StoreConfig::new(datastore.clone()))
            .wrap_err_with(|| format!("failed to open datastore at {datastore:?}"))?;

        let tree = if for_rebuild {
            PrefixTreeStore::open_for_rebuild(store.clone(), params)?
        } else {
            PrefixTreeStore::open(store.clone(), params).wrap_err(
                "failed to open prefix tree, run `rebuild-prefix-tree` after changing tree parameters",
            )?
        };
        let tree = Arc::new(tree);

        info!(elements = tree.len(), %datastore, "Opened prefix tree");

        let fetcher = HttpKeyFetcher::new(config.sync.fetch_timeout)?;

        let coordinator = SyncCoordinator::new(
            config.sync.into(),
            Arc::clone(&tree),
            Arc::new(EmbeddedKeyStore::new(store)),
            Arc::new(fetcher),
            Arc::new(TcpTransport::new()),
            config.recon.external_peers.clone(),
            SyncMetrics::new(registry),
        );

        Ok(Self {
            config,
            tree,
            coordinator: Arc::new(coordinator),
        })
    }
}
