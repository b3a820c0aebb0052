use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TreeError {
    #[error("prefix tree store unavailable")]
    StoreUnavailable(#[source] Box<dyn StdError + Send + Sync>),

    #[error("persisted prefix tree is corrupted: {0}")]
    Corrupted(String),

    #[error("failed to encode or decode a prefix tree node")]
    Codec(#[from] std::io::Error),

    #[error(
        "persisted tree parameters {stored} do not match the configured {configured}, rebuild the prefix tree"
    )]
    ConfigMismatch { stored: String, configured: String },

    #[error("prefix tree rebuild was cancelled")]
    Cancelled,
}

impl TreeError {
    pub(crate) fn unavailable(err: eyre::Report) -> Self {
        Self::StoreUnavailable(err.into())
    }
}
