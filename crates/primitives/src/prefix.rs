#[cfg(test)]
#[path = "tests/prefix.rs"]
mod tests;

use core::fmt;

use thiserror::Error;

use crate::identifier::{KeyIdentifier, IDENTIFIER_BITS, IDENTIFIER_LEN};

/// Longest prefix that can be addressed, in bits.
///
/// Bounded by the one-byte length field of the wire frame.
pub const MAX_PREFIX_BITS: u8 = u8::MAX;

/// Leading bits of a [`KeyIdentifier`].
///
/// Addresses a node in the prefix tree: a node at depth `d` of a tree with a bit
/// quantum of `q` has a prefix of `d * q` bits. Bits past `len` are always zero so
/// that equal prefixes compare and hash equal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prefix {
    len: u8,
    bits: [u8; IDENTIFIER_LEN],
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PrefixError {
    #[error("prefix of {len} bits needs {expected} bytes, got {actual}")]
    LengthMismatch {
        len: u8,
        expected: usize,
        actual: usize,
    },

    #[error("prefix has bits set past its length")]
    TrailingBits,

    #[error("empty prefix key")]
    EmptyKey,
}

impl Prefix {
    /// The empty prefix, addressing the root of the tree.
    pub const ROOT: Self = Self {
        len: 0,
        bits: [0; IDENTIFIER_LEN],
    };

    /// The first `len` bits of `id`.
    #[must_use]
    pub fn of(id: &KeyIdentifier, len: u8) -> Self {
        Self::masked(len, *id.as_bytes())
    }

    fn masked(len: u8, mut bits: [u8; IDENTIFIER_LEN]) -> Self {
        let len_bits = usize::from(len).min(IDENTIFIER_BITS);
        let full = len_bits / 8;
        let rem = len_bits % 8;

        if full < IDENTIFIER_LEN {
            if rem != 0 {
                bits[full] &= 0xff << (8 - rem);
                bits[full + 1..].fill(0);
            } else {
                bits[full..].fill(0);
            }
        }

        Self { len, bits }
    }

    /// Decodes a prefix from its bit length and the minimal byte string holding it.
    pub fn from_parts(len: u8, bytes: &[u8]) -> Result<Self, PrefixError> {
        let expected = Self::byte_len_for(len);

        if bytes.len() != expected {
            return Err(PrefixError::LengthMismatch {
                len,
                expected,
                actual: bytes.len(),
            });
        }

        let mut bits = [0; IDENTIFIER_LEN];
        bits[..expected].copy_from_slice(bytes);

        let prefix = Self::masked(len, bits);

        if prefix.bits != bits {
            return Err(PrefixError::TrailingBits);
        }

        Ok(prefix)
    }

    const fn byte_len_for(len: u8) -> usize {
        (len as usize).div_ceil(8)
    }

    /// Length in bits.
    #[must_use]
    pub const fn len(&self) -> u8 {
        self.len
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.len == 0
    }

    /// The minimal byte string holding the prefix bits.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits[..Self::byte_len_for(self.len)]
    }

    /// Whether `id` starts with this prefix.
    #[must_use]
    pub fn contains(&self, id: &KeyIdentifier) -> bool {
        Self::of(id, self.len) == *self
    }

    /// Whether `other` lies at or below this prefix.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other.len >= self.len && Self::masked(self.len, other.bits) == *self
    }

    /// The `index`-th child when descending by `quantum` bits.
    #[must_use]
    pub fn child(&self, index: usize, quantum: u8) -> Self {
        let mut bits = self.bits;

        for offset in 0..usize::from(quantum) {
            let position = usize::from(self.len) + offset;
            if position >= IDENTIFIER_BITS {
                break;
            }
            let shift = usize::from(quantum) - 1 - offset;
            if (index >> shift) & 1 == 1 {
                bits[position / 8] |= 1 << (7 - position % 8);
            }
        }

        Self::masked(self.len.saturating_add(quantum), bits)
    }

    /// Index of the child of this prefix that `id` descends into.
    #[must_use]
    pub fn child_index(&self, id: &KeyIdentifier, quantum: u8) -> usize {
        id.bits(usize::from(self.len), quantum)
    }

    /// The prefix `quantum` bits shorter, or `None` at the root.
    #[must_use]
    pub fn parent(&self, quantum: u8) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        Some(Self::masked(self.len.saturating_sub(quantum), self.bits))
    }

    /// Storage key: the length byte followed by the prefix bytes.
    #[must_use]
    pub fn to_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + Self::byte_len_for(self.len));
        key.push(self.len);
        key.extend_from_slice(self.as_bytes());
        key
    }

    pub fn from_key(key: &[u8]) -> Result<Self, PrefixError> {
        let Some((&len, bytes)) = key.split_first() else {
            return Err(PrefixError::EmptyKey);
        };

        Self::from_parts(len, bytes)
    }
}

impl Default for Prefix {
    fn default() -> Self {
        Self::ROOT
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("<root>");
        }

        let bits = (0..usize::from(self.len))
            .map(|index| {
                if (self.bits[index / 8] >> (7 - index % 8)) & 1 == 1 {
                    '1'
                } else {
                    '0'
                }
            })
            .collect::<String>();

        f.pad(&bits)
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prefix({self})")
    }
}
