use clap::Parser;
use eyre::{bail, Result as EyreResult};
use keysync_node::PeerOutcome;
use keysync_primitives::PeerDescriptor;

use crate::cli::RootArgs;
use crate::node::Node;

/// Reconcile once with one peer, or with every configured peer
#[derive(Debug, Parser)]
pub struct ReconcileCommand {
    /// Peer as `address,http_port,reconciliation_port`
    #[arg(long, value_name = "PEER")]
    pub peer: Option<PeerDescriptor>,
}

impl ReconcileCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let node = Node::open_offline(&root_args.home)?;

        let reports = node.coordinator.trigger_reconciliation_now(self.peer).await;

        if reports.is_empty() {
            bail!("no peers configured");
        }

        let mut failed = 0_usize;

        for report in &reports {
            match &report.outcome {
                PeerOutcome::Synced(stats) => println!(
                    "{}: synced after {} attempt(s), fetched {}, inserted {}, skipped {} blacklisted, {} only held locally",
                    report.peer,
                    report.attempts,
                    stats.fetched,
                    stats.inserted,
                    stats.skipped_blacklisted,
                    stats.to_send,
                ),
                PeerOutcome::Unreachable(err) => {
                    failed += 1;
                    println!("{}: unreachable after {} attempt(s): {err}", report.peer, report.attempts);
                }
                PeerOutcome::Failed(err) => {
                    failed += 1;
                    println!("{}: failed: {err}", report.peer);
                }
            }
        }

        if failed > 0 {
            bail!("{failed} of {} peer(s) failed to reconcile", reports.len());
        }

        Ok(())
    }
}
