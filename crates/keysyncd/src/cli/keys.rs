//! Operator actions on the key-store. They take effect on the local tree right
//! away; peers learn about removed keys on their next cycle.

use clap::Parser;
use eyre::Result as EyreResult;
use keysync_primitives::Fingerprint;

use crate::cli::RootArgs;
use crate::node::Node;

fn parse_fingerprints(s: &str) -> EyreResult<Vec<Fingerprint>> {
    Ok(Fingerprint::parse_list(s)?)
}

/// Blacklist keys and delete them from the key-store
#[derive(Debug, Parser)]
pub struct BlacklistAndDeleteCommand {
    /// Comma-separated list of 40 or 64 character hex fingerprints
    #[arg(long, value_name = "FINGERPRINTS")]
    pub fingerprints: String,

    /// Ticket recorded as the reason for the removal
    #[arg(long, value_name = "ID")]
    pub ticket_id: String,
}

impl BlacklistAndDeleteCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let fingerprints = parse_fingerprints(&self.fingerprints)?;

        let node = Node::open_offline(&root_args.home)?;

        let deleted = node
            .coordinator
            .blacklist_and_delete_keys(&fingerprints, &self.ticket_id)
            .await?;

        println!(
            "blacklisted {} fingerprint(s), deleted {} key(s)",
            fingerprints.len(),
            deleted.len()
        );

        Ok(())
    }
}

/// Blacklist keys without deleting them
#[derive(Debug, Parser)]
pub struct BlockKeysCommand {
    /// Comma-separated list of 40 or 64 character hex fingerprints
    #[arg(long, value_name = "FINGERPRINTS")]
    pub fingerprints: String,

    #[arg(long, value_name = "TEXT")]
    pub comment: String,
}

impl BlockKeysCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let fingerprints = parse_fingerprints(&self.fingerprints)?;

        let node = Node::open_offline(&root_args.home)?;

        let blocked = node
            .coordinator
            .block_keys(&fingerprints, &self.comment)
            .await?;

        println!(
            "blocked {} fingerprint(s), {} stored key(s) no longer reconciled",
            fingerprints.len(),
            blocked.len()
        );

        Ok(())
    }
}

/// List blacklisted fingerprints
#[derive(Debug, Parser)]
pub struct ListBlacklistedCommand;

impl ListBlacklistedCommand {
    pub fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let node = Node::open_offline(&root_args.home)?;

        for entry in node.coordinator.list_blacklisted()? {
            println!("{}\t{}", entry.fingerprint, entry.comment);
        }

        Ok(())
    }
}
