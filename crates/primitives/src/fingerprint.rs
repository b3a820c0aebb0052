#[cfg(test)]
#[path = "tests/fingerprint.rs"]
mod tests;

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// Length in bytes of a v4 key fingerprint (SHA-1).
pub const V4_FINGERPRINT_LEN: usize = 20;

/// Length in bytes of a v6 key fingerprint (SHA-256).
pub const V6_FINGERPRINT_LEN: usize = 32;

/// A validated OpenPGP key fingerprint.
///
/// Accepts exactly 40 or 64 hexadecimal characters. The textual form is always
/// lower case, matching how the key-store records blacklisted fingerprints.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint {
    len: u8,
    bytes: [u8; V6_FINGERPRINT_LEN],
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("invalid fingerprint format: {0:?}")]
    InvalidFormat(String),

    #[error("empty fingerprint list")]
    Empty,
}

impl Fingerprint {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// Whether this is a 32-byte (v6) fingerprint.
    #[must_use]
    pub const fn is_v6(&self) -> bool {
        self.len as usize == V6_FINGERPRINT_LEN
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FingerprintError> {
        if bytes.len() != V4_FINGERPRINT_LEN && bytes.len() != V6_FINGERPRINT_LEN {
            return Err(FingerprintError::InvalidFormat(hex::encode(bytes)));
        }

        let mut buf = [0; V6_FINGERPRINT_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            len: bytes.len() as u8,
            bytes: buf,
        })
    }

    /// Parses a comma-separated list of fingerprints.
    ///
    /// Surrounding whitespace around each entry is ignored. The whole list is
    /// rejected on the first malformed entry.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, FingerprintError> {
        let list = s
            .split(',')
            .map(str::trim)
            .map(str::parse)
            .collect::<Result<Vec<Self>, _>>()?;

        if list.is_empty() {
            return Err(FingerprintError::Empty);
        }

        Ok(list)
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid_len = s.len() == V4_FINGERPRINT_LEN * 2 || s.len() == V6_FINGERPRINT_LEN * 2;

        if !valid_len || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FingerprintError::InvalidFormat(s.to_owned()));
        }

        let bytes = hex::decode(s).map_err(|_| FingerprintError::InvalidFormat(s.to_owned()))?;

        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fingerprint")
            .field(&hex::encode(self.as_bytes()))
            .finish()
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str> as serde::Deserialize>::deserialize(deserializer)?;

        s.parse().map_err(serde::de::Error::custom)
    }
}
