use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use keysync_primitives::PeerDescriptor;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::time;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::codec::ReconCodec;
use crate::messages::Message;
use crate::transport::{GossipTransport, TransportError};

type Connection = Framed<TcpStream, ReconCodec>;

/// TCP transport keeping at most one idle connection per peer.
///
/// A connection is taken out of its slot for the duration of an exchange and
/// only put back once a full response has been read. An exchange that errors,
/// times out, or is cancelled therefore drops its connection, and the next
/// call reconnects.
#[derive(Debug, Default)]
pub struct TcpTransport {
    idle: Mutex<HashMap<String, Connection>>,
}

impl TcpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn connect(addr: &str) -> Result<Connection, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.to_owned(),
                source,
            })?;

        let _ignored = stream.set_nodelay(true);

        debug!(%addr, "Connected to reconciliation peer");

        Ok(Framed::new(stream, ReconCodec::new()))
    }

    async fn exchange(
        addr: &str,
        connection: Option<Connection>,
        message: Message,
    ) -> Result<(Connection, Message), TransportError> {
        let mut connection = match connection {
            Some(connection) => connection,
            None => Self::connect(addr).await?,
        };

        trace!(%addr, kind = message.kind(), prefix = %message.prefix(), "Sending");

        connection.send(message).await?;

        let Some(response) = connection.next().await else {
            return Err(TransportError::Closed);
        };

        Ok((connection, response?))
    }
}

#[async_trait]
impl GossipTransport for TcpTransport {
    async fn send(
        &self,
        peer: &PeerDescriptor,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        let addr = peer.reconciliation_addr();

        let idle = self.idle.lock().remove(&addr);

        let (connection, response) = time::timeout(timeout, Self::exchange(&addr, idle, message))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        let _previous = self.idle.lock().insert(addr, connection);

        Ok(response)
    }

    async fn disconnect(&self, peer: &PeerDescriptor) {
        if self.idle.lock().remove(&peer.reconciliation_addr()).is_some() {
            debug!(%peer, "Dropped reconciliation connection");
        }
    }
}
