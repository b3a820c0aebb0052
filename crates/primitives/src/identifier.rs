#[cfg(test)]
#[path = "tests/identifier.rs"]
mod tests;

use core::fmt;
use core::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::fingerprint::Fingerprint;

/// Length of a [`KeyIdentifier`] in bytes.
pub const IDENTIFIER_LEN: usize = 32;

/// Length of a [`KeyIdentifier`] in bits.
pub const IDENTIFIER_BITS: usize = IDENTIFIER_LEN * 8;

/// The element reconciled between keyservers.
///
/// A fixed-length digest of the key's canonical fingerprint. Two servers holding
/// the same key always derive the same identifier, and identifiers are uniformly
/// distributed which keeps the prefix tree balanced.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct KeyIdentifier([u8; IDENTIFIER_LEN]);

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("invalid identifier length")]
    InvalidLength,

    #[error("invalid hex")]
    InvalidHex,
}

impl KeyIdentifier {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; IDENTIFIER_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn from_fingerprint(fingerprint: &Fingerprint) -> Self {
        Self(Sha256::digest(fingerprint.as_bytes()).into())
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; IDENTIFIER_LEN] {
        &self.0
    }

    /// Bit at `index`, most significant bit of the first byte first.
    #[must_use]
    pub const fn bit(&self, index: usize) -> bool {
        (self.0[index / 8] >> (7 - index % 8)) & 1 == 1
    }

    /// Reads `count` bits starting at bit `offset` as an unsigned integer.
    ///
    /// Bits past the end of the identifier read as zero.
    #[must_use]
    pub fn bits(&self, offset: usize, count: u8) -> usize {
        (offset..offset + usize::from(count)).fold(0, |acc, index| {
            let bit = index < IDENTIFIER_BITS && self.bit(index);
            (acc << 1) | usize::from(bit)
        })
    }
}

impl From<[u8; IDENTIFIER_LEN]> for KeyIdentifier {
    fn from(bytes: [u8; IDENTIFIER_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<KeyIdentifier> for [u8; IDENTIFIER_LEN] {
    fn from(id: KeyIdentifier) -> Self {
        id.0
    }
}

impl TryFrom<&[u8]> for KeyIdentifier {
    type Error = IdentifierError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; IDENTIFIER_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| IdentifierError::InvalidLength)
    }
}

impl FromStr for KeyIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != IDENTIFIER_LEN * 2 {
            return Err(IdentifierError::InvalidLength);
        }

        let mut bytes = [0; IDENTIFIER_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| IdentifierError::InvalidHex)?;

        Ok(Self(bytes))
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&hex::encode(self.0))
    }
}

impl fmt::Debug for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyIdentifier")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl serde::Serialize for KeyIdentifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for KeyIdentifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str> as serde::Deserialize>::deserialize(deserializer)?;

        s.parse().map_err(serde::de::Error::custom)
    }
}
