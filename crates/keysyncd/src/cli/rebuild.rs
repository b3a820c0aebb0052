use clap::Parser;
use eyre::Result as EyreResult;
use tracing::info;

use crate::cli::RootArgs;
use crate::node::Node;

/// Rebuild the prefix tree from the key-store
///
/// Also the way to adopt changed tree parameters. The daemon must be stopped.
/// The persisted tree is only replaced once the rebuild succeeds.
#[derive(Debug, Parser)]
pub struct RebuildCommand;

impl RebuildCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let node = Node::open_for_rebuild(&root_args.home)?;

        let elements = node.coordinator.trigger_rebuild().await?;

        info!(elements, "Prefix tree rebuilt");
        println!("{elements}");

        Ok(())
    }
}
