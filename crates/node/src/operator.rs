//! Actions exposed to operators.
//!
//! Blacklisting goes through the mutation gate like any other tree change, so
//! a blacklisted key can neither survive in the tree nor come back through a
//! concurrent reconciliation.

use std::sync::Arc;

use keysync_primitives::{Fingerprint, KeyIdentifier, PeerDescriptor};
use tracing::info;

use crate::errors::CoordinatorError;
use crate::keystore::BlacklistEntry;
use crate::sync::{blocking, PeerCycleReport, SyncCoordinator};

impl SyncCoordinator {
    /// Rebuilds the tree from the key-store.
    pub async fn trigger_rebuild(&self) -> Result<u64, CoordinatorError> {
        info!("Rebuild of the prefix tree requested");

        self.rebuild().await
    }

    /// Reconciles right away with `peer`, or with every configured peer.
    pub async fn trigger_reconciliation_now(
        &self,
        peer: Option<PeerDescriptor>,
    ) -> Vec<PeerCycleReport> {
        match peer {
            Some(peer) => vec![self.sync_peer(peer).await],
            None => self.run_cycle().await.peers,
        }
    }

    /// Blacklists `fingerprints` and deletes their keys, recording `ticket_id`
    /// as the reason.
    ///
    /// Returns the identifiers removed from the tree.
    pub async fn blacklist_and_delete_keys(
        &self,
        fingerprints: &[Fingerprint],
        ticket_id: &str,
    ) -> Result<Vec<KeyIdentifier>, CoordinatorError> {
        let _gate = self.lock_mutations().await;

        let deleted = {
            let fingerprints = fingerprints.to_vec();
            let ticket_id = ticket_id.to_owned();

            self.with_keys(move |keys| keys.blacklist_and_delete(&fingerprints, &ticket_id))
                .await?
        };

        let deleted = self.forget(deleted).await?;

        info!(
            requested = fingerprints.len(),
            deleted = deleted.len(),
            %ticket_id,
            "Blacklisted and deleted keys"
        );

        Ok(deleted)
    }

    /// Blacklists `fingerprints` without deleting stored keys.
    ///
    /// Blocked keys stop being reconciled. Returns the identifiers removed from
    /// the tree.
    pub async fn block_keys(
        &self,
        fingerprints: &[Fingerprint],
        comment: &str,
    ) -> Result<Vec<KeyIdentifier>, CoordinatorError> {
        let _gate = self.lock_mutations().await;

        let blocked = {
            let fingerprints = fingerprints.to_vec();
            let comment = comment.to_owned();

            self.with_keys(move |keys| keys.blacklist(&fingerprints, &comment))
                .await?
        };

        let blocked = self.forget(blocked).await?;

        info!(
            requested = fingerprints.len(),
            blocked = blocked.len(),
            "Blocked keys"
        );

        Ok(blocked)
    }

    pub fn list_blacklisted(&self) -> Result<Vec<BlacklistEntry>, CoordinatorError> {
        self.keys()
            .list_blacklisted()
            .map_err(CoordinatorError::key_store)
    }

    /// Removes `ids` from the tree; the caller holds the mutation gate.
    async fn forget(
        &self,
        ids: Vec<KeyIdentifier>,
    ) -> Result<Vec<KeyIdentifier>, CoordinatorError> {
        let tree = Arc::clone(self.tree());

        let ids = blocking(move || {
            for id in &ids {
                let _removed = tree.remove(id)?;
            }

            Ok(ids)
        })
        .await?;

        self.metrics().set_tree_elements(self.tree().len());

        Ok(ids)
    }
}
