//! The key-store collaborator.
//!
//! The tree only ever holds identifiers. Key material, and the blacklist that
//! keeps removed keys from coming back through reconciliation, live behind
//! [`KeyStore`].

mod embedded;

pub use embedded::EmbeddedKeyStore;
use keysync_primitives::{Fingerprint, KeyIdentifier};
use serde::Serialize;

/// A key as stored and as exchanged with peers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRecord {
    pub fingerprint: Fingerprint,
    /// The key in its transferable encoding; opaque to this crate.
    pub material: Vec<u8>,
}

impl KeyRecord {
    #[must_use]
    pub fn new(fingerprint: Fingerprint, material: Vec<u8>) -> Self {
        Self {
            fingerprint,
            material,
        }
    }

    #[must_use]
    pub fn id(&self) -> KeyIdentifier {
        KeyIdentifier::from_fingerprint(&self.fingerprint)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlacklistEntry {
    pub fingerprint: Fingerprint,
    pub comment: String,
}

pub trait KeyStore: Send + Sync + 'static {
    /// Identifiers of every stored key that is not blacklisted.
    fn enumerate_active_key_identifiers(&self) -> eyre::Result<Vec<KeyIdentifier>>;

    fn fetch_key_material(&self, id: &KeyIdentifier) -> eyre::Result<Option<KeyRecord>>;

    /// Stores `record`, returning whether it was not stored before.
    fn insert_key(&self, record: KeyRecord) -> eyre::Result<bool>;

    fn is_blacklisted(&self, fingerprint: &Fingerprint) -> eyre::Result<bool>;

    /// Blacklists `fingerprints` without deleting their keys.
    ///
    /// Returns the identifiers of stored keys that are no longer active.
    fn blacklist(
        &self,
        fingerprints: &[Fingerprint],
        comment: &str,
    ) -> eyre::Result<Vec<KeyIdentifier>>;

    /// Blacklists `fingerprints` and deletes their keys.
    ///
    /// Returns the identifiers of the deleted keys.
    fn blacklist_and_delete(
        &self,
        fingerprints: &[Fingerprint],
        comment: &str,
    ) -> eyre::Result<Vec<KeyIdentifier>>;

    fn list_blacklisted(&self) -> eyre::Result<Vec<BlacklistEntry>>;
}
