//! Tree shape and aggregate parameters.
//!
//! These are protocol-compatibility parameters: two peers can only prune
//! matching subtrees if they split, sample and hash identically. They are
//! configuration rather than constants, and the parameters a tree was built
//! with are persisted next to it so a changed configuration is detected on
//! open instead of silently producing digests no peer agrees with.

#[cfg(test)]
#[path = "tests/config.rs"]
mod tests;

use keysync_primitives::identifier::IDENTIFIER_BITS;
use keysync_primitives::prefix::MAX_PREFIX_BITS;
use keysync_primitives::Prefix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::{node_digest, NodeDigest};
use crate::svalue::{default_sample_points, SValues, MODULUS};

/// Default number of sample points per node.
pub const DEFAULT_NUM_SAMPLES: u8 = 6;

/// Default number of identifier bits consumed per tree level (fanout of 4).
pub const DEFAULT_BIT_QUANTUM: u8 = 2;

/// Default element count above which a leaf splits.
pub const DEFAULT_SPLIT_THRESHOLD: u32 = 50;

/// Default maximum depth; leaves at this depth never split.
pub const DEFAULT_MAX_DEPTH: u8 = 32;

/// Largest supported bit quantum (fanout of 256).
pub const MAX_BIT_QUANTUM: u8 = 8;

/// Largest supported number of sample points.
pub const MAX_NUM_SAMPLES: u8 = 64;

/// Tree parameters as written in the configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeConfig {
    #[serde(default = "default_num_samples")]
    pub num_samples: u8,

    #[serde(default = "default_bit_quantum")]
    pub bit_quantum: u8,

    #[serde(default = "default_split_threshold")]
    pub split_threshold: u32,

    #[serde(default = "default_max_depth")]
    pub max_depth: u8,

    /// Explicit sample points. Defaults to `p - 1, p - 2, ...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_points: Option<Vec<u64>>,
}

const fn default_num_samples() -> u8 {
    DEFAULT_NUM_SAMPLES
}

const fn default_bit_quantum() -> u8 {
    DEFAULT_BIT_QUANTUM
}

const fn default_split_threshold() -> u32 {
    DEFAULT_SPLIT_THRESHOLD
}

const fn default_max_depth() -> u8 {
    DEFAULT_MAX_DEPTH
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            num_samples: DEFAULT_NUM_SAMPLES,
            bit_quantum: DEFAULT_BIT_QUANTUM,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            max_depth: DEFAULT_MAX_DEPTH,
            sample_points: None,
        }
    }
}

impl TreeConfig {
    /// Validates the configuration and derives the runtime parameters.
    pub fn params(&self) -> Result<TreeParams, ConfigError> {
        let sample_points = match &self.sample_points {
            Some(points) => {
                if points.len() != usize::from(self.num_samples) {
                    return Err(ConfigError::SamplePointCount {
                        expected: self.num_samples,
                        actual: points.len(),
                    });
                }
                points.clone()
            }
            None => default_sample_points(usize::from(self.num_samples)),
        };

        TreeParams::new(
            self.bit_quantum,
            self.split_threshold,
            self.max_depth,
            sample_points,
        )
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("bit quantum must be between 1 and 8, got {0}")]
    BitQuantum(u8),

    #[error("split threshold must be at least 1")]
    SplitThreshold,

    #[error("number of sample points must be between 1 and 64, got {0}")]
    NumSamples(usize),

    #[error("max depth {max_depth} at {bit_quantum} bits per level exceeds the prefix limit")]
    MaxDepth { max_depth: u8, bit_quantum: u8 },

    #[error("expected {expected} sample points, got {actual}")]
    SamplePointCount { expected: u8, actual: usize },

    #[error("sample point {0} is not a field element")]
    SamplePointRange(u64),

    #[error("duplicate sample point {0}")]
    DuplicateSamplePoint(u64),
}

/// Validated tree parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeParams {
    bit_quantum: u8,
    split_threshold: u32,
    max_depth: u8,
    sample_points: Vec<u64>,
    empty_digest: NodeDigest,
}

impl TreeParams {
    pub fn new(
        bit_quantum: u8,
        split_threshold: u32,
        max_depth: u8,
        sample_points: Vec<u64>,
    ) -> Result<Self, ConfigError> {
        if !(1..=MAX_BIT_QUANTUM).contains(&bit_quantum) {
            return Err(ConfigError::BitQuantum(bit_quantum));
        }

        if split_threshold == 0 {
            return Err(ConfigError::SplitThreshold);
        }

        if sample_points.is_empty() || sample_points.len() > usize::from(MAX_NUM_SAMPLES) {
            return Err(ConfigError::NumSamples(sample_points.len()));
        }

        let deepest = usize::from(max_depth) * usize::from(bit_quantum);
        if max_depth == 0 || deepest > usize::from(MAX_PREFIX_BITS) || deepest > IDENTIFIER_BITS {
            return Err(ConfigError::MaxDepth {
                max_depth,
                bit_quantum,
            });
        }

        for (index, point) in sample_points.iter().enumerate() {
            if *point >= MODULUS {
                return Err(ConfigError::SamplePointRange(*point));
            }
            if sample_points[..index].contains(point) {
                return Err(ConfigError::DuplicateSamplePoint(*point));
            }
        }

        Ok(Self::unchecked(
            bit_quantum,
            split_threshold,
            max_depth,
            sample_points,
        ))
    }

    fn unchecked(
        bit_quantum: u8,
        split_threshold: u32,
        max_depth: u8,
        sample_points: Vec<u64>,
    ) -> Self {
        let empty_digest = node_digest(0, &SValues::empty(sample_points.len()));

        Self {
            bit_quantum,
            split_threshold,
            max_depth,
            sample_points,
            empty_digest,
        }
    }

    #[must_use]
    pub const fn bit_quantum(&self) -> u8 {
        self.bit_quantum
    }

    /// Number of child slots of an internal node.
    #[must_use]
    pub const fn fanout(&self) -> usize {
        1 << self.bit_quantum
    }

    #[must_use]
    pub const fn split_threshold(&self) -> u32 {
        self.split_threshold
    }

    #[must_use]
    pub const fn max_depth(&self) -> u8 {
        self.max_depth
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.sample_points.len()
    }

    #[must_use]
    pub fn sample_points(&self) -> &[u64] {
        &self.sample_points
    }

    #[must_use]
    pub fn empty_svalues(&self) -> SValues {
        SValues::empty(self.num_samples())
    }

    /// Digest of a subtree holding no elements.
    #[must_use]
    pub const fn empty_digest(&self) -> &NodeDigest {
        &self.empty_digest
    }

    /// Depth of the node addressed by `prefix`.
    #[must_use]
    pub const fn depth_of(&self, prefix: &Prefix) -> u8 {
        prefix.len() / self.bit_quantum
    }

    /// Whether a node holding `count` elements at `prefix` is internal.
    ///
    /// The shape of a tree is a pure function of its element set: a node splits
    /// exactly when it holds more than the threshold and is above the maximum
    /// depth, and collapses back as soon as that stops being true.
    #[must_use]
    pub fn should_split(&self, prefix: &Prefix, count: u64) -> bool {
        count > u64::from(self.split_threshold) && self.depth_of(prefix) < self.max_depth
    }
}

impl Default for TreeParams {
    fn default() -> Self {
        Self::unchecked(
            DEFAULT_BIT_QUANTUM,
            DEFAULT_SPLIT_THRESHOLD,
            DEFAULT_MAX_DEPTH,
            default_sample_points(usize::from(DEFAULT_NUM_SAMPLES)),
        )
    }
}
