use core::net::SocketAddr;
use std::fs::create_dir_all;

use clap::Parser;
use eyre::{bail, Result as EyreResult, WrapErr};
use keysync_config::{ConfigFile, DataStoreConfig, ReconConfig};
use keysync_primitives::peer::DEFAULT_RECONCILIATION_PORT;
use keysync_primitives::PeerDescriptor;
use keysync_ptree::config::{
    TreeConfig, DEFAULT_BIT_QUANTUM, DEFAULT_MAX_DEPTH, DEFAULT_NUM_SAMPLES,
    DEFAULT_SPLIT_THRESHOLD,
};
use tracing::{info, warn};

use crate::cli::RootArgs;
use crate::defaults::DEFAULT_DATASTORE_DIR;

/// Initialize node configuration
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Address the reconciliation server listens on
    #[arg(long, value_name = "ADDR")]
    #[arg(default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_RECONCILIATION_PORT)))]
    pub listen: SocketAddr,

    /// External peer as `address,http_port,reconciliation_port`, repeatable
    #[arg(long = "external-peer", value_name = "PEER")]
    pub external_peers: Vec<PeerDescriptor>,

    /// Number of identifier bits per tree level
    #[arg(long, default_value_t = DEFAULT_BIT_QUANTUM)]
    pub bit_quantum: u8,

    /// Element count above which a leaf splits
    #[arg(long, default_value_t = DEFAULT_SPLIT_THRESHOLD)]
    pub split_threshold: u32,

    /// Depth at which leaves stop splitting
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: u8,

    /// Sample points per node
    #[arg(long, default_value_t = DEFAULT_NUM_SAMPLES)]
    pub num_samples: u8,

    /// Overwrite an existing configuration
    #[arg(long, short)]
    pub force: bool,
}

impl InitCommand {
    pub fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let path = root_args.home;

        if ConfigFile::exists(&path) {
            if !self.force {
                bail!("Node is already initialized in {:?}, use --force to overwrite", path);
            }
            warn!(%path, "Overwriting existing configuration");
        }

        let tree = TreeConfig {
            num_samples: self.num_samples,
            bit_quantum: self.bit_quantum,
            split_threshold: self.split_threshold,
            max_depth: self.max_depth,
            sample_points: None,
        };
        let _params = tree.params().wrap_err("invalid tree parameters")?;

        let config = ConfigFile::new(
            ReconConfig::new(self.listen, self.external_peers),
            tree,
            DataStoreConfig::new(DEFAULT_DATASTORE_DIR.into()),
        );

        create_dir_all(path.join(DEFAULT_DATASTORE_DIR))
            .wrap_err_with(|| format!("failed to create directory {path:?}"))?;

        config.save(&path)?;

        info!(%path, peers = config.recon.external_peers.len(), "Initialized node");

        Ok(())
    }
}
