use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use eyre::{eyre, WrapErr};
use keysync_primitives::{Fingerprint, KeyIdentifier, PeerDescriptor};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::KeyFetcher;
use crate::keystore::KeyRecord;

const HASH_QUERY_PATH: &str = "/pks/hashquery";

#[derive(Serialize)]
struct HashQuery<'a> {
    ids: &'a [KeyIdentifier],
}

#[derive(Deserialize)]
struct HashQueryEntry {
    fingerprint: Fingerprint,
    /// Base64 of the key material.
    material: String,
}

/// Fetches keys from a peer's HKP interface.
///
/// Posts the hex identifiers to `/pks/hashquery` and reads back a JSON list of
/// `{fingerprint, material}` objects.
#[derive(Clone, Debug)]
pub struct HttpKeyFetcher {
    client: Client,
}

impl HttpKeyFetcher {
    pub fn new(timeout: Duration) -> eyre::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(
        &self,
        peer: &PeerDescriptor,
        ids: &[KeyIdentifier],
    ) -> eyre::Result<Vec<KeyRecord>> {
        let url = format!("{}{HASH_QUERY_PATH}", peer.http_base_url());

        debug!(%url, count = ids.len(), "Requesting keys");

        let response = self
            .client
            .post(&url)
            .json(&HashQuery { ids })
            .send()
            .await?
            .error_for_status()?;

        let entries = response
            .json::<Vec<HashQueryEntry>>()
            .await
            .wrap_err("invalid hashquery response")?;

        entries
            .into_iter()
            .map(|entry| {
                let material = STANDARD
                    .decode(entry.material)
                    .map_err(|err| eyre!("invalid key material for {}: {err}", entry.fingerprint))?;

                Ok(KeyRecord::new(entry.fingerprint, material))
            })
            .collect()
    }
}
