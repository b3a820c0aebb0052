#[cfg(test)]
#[path = "tests/svalue.rs"]
mod tests;

use core::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use keysync_primitives::KeyIdentifier;

/// The field modulus, the Mersenne prime 2^61 - 1.
pub const MODULUS: u64 = (1 << 61) - 1;

#[expect(
    clippy::cast_possible_truncation,
    reason = "the remainder is below MODULUS and fits in u64"
)]
fn reduce(value: u128) -> u64 {
    (value % u128::from(MODULUS)) as u64
}

/// `a * b mod p`, for `a, b < p`.
#[must_use]
pub fn mul(a: u64, b: u64) -> u64 {
    reduce(u128::from(a) * u128::from(b))
}

/// `a - b mod p`, for `a, b < p`.
#[must_use]
pub const fn sub(a: u64, b: u64) -> u64 {
    (a + MODULUS - b) % MODULUS
}

/// `p - 1`, `p - 2`, ... as many as requested.
#[must_use]
pub fn default_sample_points(count: usize) -> Vec<u64> {
    (0..count as u64).map(|i| MODULUS - 1 - i).collect()
}

/// Maps an identifier into the field, skipping the sample points so that no
/// element ever contributes a zero factor.
#[must_use]
pub fn element_value(id: &KeyIdentifier, points: &[u64]) -> u64 {
    let mut head = [0; 8];
    head.copy_from_slice(&id.as_bytes()[..8]);

    let mut value = u64::from_be_bytes(head) % MODULUS;

    while points.contains(&value) {
        value = (value + 1) % MODULUS;
    }

    value
}

/// Per-sample-point products of `(s_i - h(id))` over a set of identifiers.
///
/// The empty set evaluates to all ones. The aggregate of a union of disjoint sets
/// is the pointwise product of their aggregates, so a parent is derived from its
/// children without looking at any element.
#[derive(Clone, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct SValues(Vec<u64>);

impl SValues {
    #[must_use]
    pub fn empty(num_samples: usize) -> Self {
        Self(vec![1; num_samples])
    }

    #[must_use]
    pub fn of_elements<'a>(
        ids: impl IntoIterator<Item = &'a KeyIdentifier>,
        points: &[u64],
    ) -> Self {
        let mut acc = Self::empty(points.len());

        for id in ids {
            acc.add_element(id, points);
        }

        acc
    }

    pub fn add_element(&mut self, id: &KeyIdentifier, points: &[u64]) {
        let value = element_value(id, points);

        for (acc, point) in self.0.iter_mut().zip(points) {
            *acc = mul(*acc, sub(*point, value));
        }
    }

    pub fn combine(&mut self, other: &Self) {
        for (acc, value) in self.0.iter_mut().zip(&other.0) {
            *acc = mul(*acc, *value);
        }
    }

    #[must_use]
    pub const fn from_vec(values: Vec<u64>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u64> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every value is a reduced field element.
    #[must_use]
    pub fn is_reduced(&self) -> bool {
        self.0.iter().all(|value| *value < MODULUS)
    }
}

impl fmt::Debug for SValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.0).finish()
    }
}
