//! Retrieval of key material from peers.

mod http;

use async_trait::async_trait;
pub use http::HttpKeyFetcher;
use keysync_primitives::{KeyIdentifier, PeerDescriptor};

use crate::keystore::KeyRecord;

#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetches the keys for `ids` that `peer` can provide.
    ///
    /// Missing keys are left out of the result. Returned records are not
    /// trusted: the caller checks them against the identifiers it asked for.
    async fn fetch(
        &self,
        peer: &PeerDescriptor,
        ids: &[KeyIdentifier],
    ) -> eyre::Result<Vec<KeyRecord>>;
}
