#[cfg(test)]
#[path = "../tests/keystore.rs"]
mod tests;

use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};
use eyre::{eyre, WrapErr};
use keysync_primitives::{Fingerprint, KeyIdentifier};
use keysync_store::db::Column;
use keysync_store::tx::Transaction;
use keysync_store::Store;
use tracing::info;

use super::{BlacklistEntry, KeyRecord, KeyStore};

#[derive(BorshSerialize, BorshDeserialize)]
struct StoredKey {
    fingerprint: Vec<u8>,
    material: Vec<u8>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct StoredBlacklistEntry {
    comment: String,
}

/// [`KeyStore`] on the node's own datastore.
///
/// Keys are stored under their identifier in [`Column::Keys`], blacklisted
/// fingerprints under their lower-case hex form in [`Column::Blacklist`].
#[derive(Clone, Debug)]
pub struct EmbeddedKeyStore {
    store: Store,
}

impl EmbeddedKeyStore {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    fn blacklist_key(fingerprint: &Fingerprint) -> Vec<u8> {
        fingerprint.to_string().into_bytes()
    }

    fn decode_key(value: &[u8]) -> eyre::Result<KeyRecord> {
        let stored = borsh::from_slice::<StoredKey>(value).wrap_err("corrupt key record")?;

        let fingerprint = Fingerprint::from_bytes(&stored.fingerprint)
            .map_err(|err| eyre!("corrupt key record: {err}"))?;

        Ok(KeyRecord::new(fingerprint, stored.material))
    }

    fn blacklisted(&self) -> eyre::Result<BTreeSet<Vec<u8>>> {
        Ok(self
            .store
            .iter(Column::Blacklist)?
            .keys()?
            .into_iter()
            .collect())
    }

    /// Adds the missing blacklist rows for `fingerprints` to `tx`.
    fn stage_blacklist(
        &self,
        tx: &mut Transaction,
        fingerprints: &[Fingerprint],
        comment: &str,
    ) -> eyre::Result<usize> {
        let mut added = 0;

        for fingerprint in fingerprints {
            let key = Self::blacklist_key(fingerprint);

            if self.store.has(Column::Blacklist, &key)? || tx.get(Column::Blacklist, &key).is_some()
            {
                continue;
            }

            let entry = StoredBlacklistEntry {
                comment: comment.to_owned(),
            };

            tx.put(Column::Blacklist, key, borsh::to_vec(&entry)?);
            added += 1;
        }

        Ok(added)
    }

    fn stored_ids(&self, fingerprints: &[Fingerprint]) -> eyre::Result<Vec<KeyIdentifier>> {
        let mut ids = BTreeSet::new();

        for fingerprint in fingerprints {
            let id = KeyIdentifier::from_fingerprint(fingerprint);

            if self.store.has(Column::Keys, id.as_bytes())? {
                let _new = ids.insert(id);
            }
        }

        Ok(ids.into_iter().collect())
    }
}

impl KeyStore for EmbeddedKeyStore {
    fn enumerate_active_key_identifiers(&self) -> eyre::Result<Vec<KeyIdentifier>> {
        let blacklisted = self.blacklisted()?;

        let mut ids = vec![];

        for entry in self.store.iter(Column::Keys)? {
            let (key, value) = entry?;

            let record = Self::decode_key(&value)?;

            if blacklisted.contains(&Self::blacklist_key(&record.fingerprint)) {
                continue;
            }

            let id = KeyIdentifier::try_from(key.as_slice())
                .map_err(|err| eyre!("corrupt key identifier: {err}"))?;

            ids.push(id);
        }

        Ok(ids)
    }

    fn fetch_key_material(&self, id: &KeyIdentifier) -> eyre::Result<Option<KeyRecord>> {
        self.store
            .get(Column::Keys, id.as_bytes())?
            .map(|value| Self::decode_key(&value))
            .transpose()
    }

    fn insert_key(&self, record: KeyRecord) -> eyre::Result<bool> {
        let id = record.id();

        if self.store.has(Column::Keys, id.as_bytes())? {
            return Ok(false);
        }

        let stored = StoredKey {
            fingerprint: record.fingerprint.as_bytes().to_vec(),
            material: record.material,
        };

        self.store
            .put(Column::Keys, id.as_bytes(), &borsh::to_vec(&stored)?)?;

        Ok(true)
    }

    fn is_blacklisted(&self, fingerprint: &Fingerprint) -> eyre::Result<bool> {
        self.store
            .has(Column::Blacklist, &Self::blacklist_key(fingerprint))
    }

    fn blacklist(
        &self,
        fingerprints: &[Fingerprint],
        comment: &str,
    ) -> eyre::Result<Vec<KeyIdentifier>> {
        let mut tx = Transaction::default();

        let added = self.stage_blacklist(&mut tx, fingerprints, comment)?;
        let blocked = self.stored_ids(fingerprints)?;

        self.store.apply(&tx)?;

        info!(added, blocked = blocked.len(), "Blocked fingerprints");

        Ok(blocked)
    }

    fn blacklist_and_delete(
        &self,
        fingerprints: &[Fingerprint],
        comment: &str,
    ) -> eyre::Result<Vec<KeyIdentifier>> {
        let mut tx = Transaction::default();

        let added = self.stage_blacklist(&mut tx, fingerprints, comment)?;
        let deleted = self.stored_ids(fingerprints)?;

        for id in &deleted {
            tx.delete(Column::Keys, id.as_bytes().to_vec());
        }

        self.store.apply(&tx)?;

        info!(added, deleted = deleted.len(), "Deleted blacklisted keys");

        Ok(deleted)
    }

    fn list_blacklisted(&self) -> eyre::Result<Vec<BlacklistEntry>> {
        let mut entries = vec![];

        for entry in self.store.iter(Column::Blacklist)? {
            let (key, value) = entry?;

            let fingerprint = core::str::from_utf8(&key)
                .ok()
                .and_then(|hex| hex.parse::<Fingerprint>().ok())
                .ok_or_else(|| eyre!("corrupt blacklist key"))?;

            let stored = borsh::from_slice::<StoredBlacklistEntry>(&value)
                .wrap_err("corrupt blacklist entry")?;

            entries.push(BlacklistEntry {
                fingerprint,
                comment: stored.comment,
            });
        }

        Ok(entries)
    }
}
