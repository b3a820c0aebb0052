use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keysync_primitives::PeerDescriptor;
use keysync_ptree::PrefixTreeStore;
use parking_lot::Mutex;

use crate::messages::Message;
use crate::responder::Responder;
use crate::transport::{GossipTransport, TransportError};

/// Serves peers from prefix-tree stores living in the same process.
///
/// Peers are registered by their reconciliation address. Used by tests and by
/// diagnostics that reconcile two local trees.
#[derive(Debug, Default)]
pub struct InProcessTransport {
    peers: Mutex<HashMap<String, Responder>>,
}

impl InProcessTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: &PeerDescriptor, store: Arc<PrefixTreeStore>) {
        let _previous = self
            .peers
            .lock()
            .insert(peer.reconciliation_addr(), Responder::new(store));
    }

    pub fn unregister(&self, peer: &PeerDescriptor) {
        let _removed = self.peers.lock().remove(&peer.reconciliation_addr());
    }
}

#[async_trait]
impl GossipTransport for InProcessTransport {
    async fn send(
        &self,
        peer: &PeerDescriptor,
        message: Message,
        _timeout: Duration,
    ) -> Result<Message, TransportError> {
        let addr = peer.reconciliation_addr();

        let mut peers = self.peers.lock();

        let Some(responder) = peers.get_mut(&addr) else {
            return Err(TransportError::UnknownPeer(addr));
        };

        Ok(responder.handle(&message))
    }

    async fn disconnect(&self, _peer: &PeerDescriptor) {}
}
