use std::error::Error as StdError;
use std::time::Duration;

use keysync_ptree::TreeError;
use thiserror::Error;

pub(crate) type BoxedError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoordinatorError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("key store failure")]
    KeyStore(#[source] BoxedError),

    #[error("failed to fetch keys from {peer}")]
    Fetch {
        peer: String,
        #[source]
        source: BoxedError,
    },

    #[error("prefix tree rebuild failed")]
    RebuildFailed(#[source] RebuildFailure),
}

impl CoordinatorError {
    pub(crate) fn key_store(err: eyre::Report) -> Self {
        Self::KeyStore(err.into())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RebuildFailure {
    #[error("key enumeration failed")]
    Enumerate(#[source] BoxedError),

    #[error("did not finish within {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Tree(TreeError),

    #[error("rebuild task panicked")]
    Panicked,
}
