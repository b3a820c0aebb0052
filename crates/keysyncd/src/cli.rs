use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use const_format::concatcp;
use eyre::Result as EyreResult;

use crate::defaults;

mod init;
mod keys;
mod rebuild;
mod reconcile;
mod run;

use init::InitCommand;
use keys::{BlacklistAndDeleteCommand, BlockKeysCommand, ListBlacklistedCommand};
use rebuild::RebuildCommand;
use reconcile::ReconcileCommand;
use run::RunCommand;

pub const EXAMPLES: &str = r"
  # Initialize a node peering with one external keyserver
  $ keysyncd --home data/ init --external-peer keys.example.org,11371,11370

  # Run the reconciliation daemon
  $ keysyncd --home data/ run

  # Blacklist two keys and delete them (daemon stopped)
  $ keysyncd --home data/ blacklist-and-delete-key \
      --fingerprints 0123456789ABCDEF0123456789ABCDEF01234567,89abcdef0123456789abcdef0123456789abcdef \
      --ticket-id SEC-1042
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  KEYSYNC_HOME    Directory for config and data\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Init(InitCommand),
    #[command(alias = "up")]
    Run(RunCommand),
    RebuildPrefixTree(RebuildCommand),
    BlacklistAndDeleteKey(BlacklistAndDeleteCommand),
    BlockKeys(BlockKeysCommand),
    ListBlacklisted(ListBlacklistedCommand),
    Reconcile(ReconcileCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Directory for config and data
    #[arg(long, value_name = "PATH", default_value_t = defaults::default_node_dir())]
    #[arg(env = "KEYSYNC_HOME", hide_env_values = true)]
    pub home: Utf8PathBuf,
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.action {
            SubCommands::Init(init) => init.run(self.args),
            SubCommands::Run(run) => run.run(self.args).await,
            SubCommands::RebuildPrefixTree(rebuild) => rebuild.run(self.args).await,
            SubCommands::BlacklistAndDeleteKey(delete) => delete.run(self.args).await,
            SubCommands::BlockKeys(block) => block.run(self.args).await,
            SubCommands::ListBlacklisted(list) => list.run(self.args),
            SubCommands::Reconcile(reconcile) => reconcile.run(self.args).await,
        }
    }
}
