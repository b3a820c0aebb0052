//! Request/response exchange with a peer's reconciliation endpoint.
//!
//! The engine only ever talks to a [`GossipTransport`], so the same session
//! logic runs over TCP in production and against an in-process responder in
//! tests.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use keysync_primitives::PeerDescriptor;
use thiserror::Error;

use crate::codec::CodecError;
use crate::messages::Message;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection closed by peer")]
    Closed,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("unknown peer {0}")]
    UnknownPeer(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TransportError {
    /// Whether the peer answered with bytes that are not a valid message.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Codec(err) if err.is_malformed())
    }
}

/// A request/response channel to reconciliation peers.
///
/// Implementations never retry: a failed exchange is reported as is, and the
/// connection it used is discarded so the next call starts from a clean state.
#[async_trait]
pub trait GossipTransport: Send + Sync {
    /// Sends `message` to `peer` and waits at most `timeout` for its response.
    async fn send(
        &self,
        peer: &PeerDescriptor,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, TransportError>;

    /// Drops any connection held for `peer`.
    async fn disconnect(&self, peer: &PeerDescriptor);
}
