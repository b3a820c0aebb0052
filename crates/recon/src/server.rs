use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use keysync_primitives::Prefix;
use keysync_ptree::PrefixTreeStore;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::time;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::ReconCodec;
use crate::messages::{ErrorCode, Message};
use crate::responder::Responder;

/// Connections with no request for this long are closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Answers reconciliation requests from peers on a TCP listener.
#[derive(Debug)]
pub struct ReconServer {
    listener: TcpListener,
    store: Arc<PrefixTreeStore>,
    idle_timeout: Duration,
}

impl ReconServer {
    pub async fn bind(addr: impl ToSocketAddrs, store: Arc<PrefixTreeStore>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            store,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    #[must_use]
    pub const fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves connections until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> io::Result<()> {
        info!(addr = %self.listener.local_addr()?, "Reconciliation server listening");

        loop {
            let (stream, remote) = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "Failed to accept reconciliation connection");
                        continue;
                    }
                },
            };

            let responder = Responder::new(Arc::clone(&self.store));
            let idle_timeout = self.idle_timeout;
            let shutdown = shutdown.child_token();

            drop(tokio::spawn(async move {
                tokio::select! {
                    () = shutdown.cancelled() => {}
                    () = serve(stream, remote, responder, idle_timeout) => {}
                }
            }));
        }

        info!("Reconciliation server stopped");

        Ok(())
    }
}

async fn serve(stream: TcpStream, remote: SocketAddr, mut responder: Responder, idle: Duration) {
    let _ignored = stream.set_nodelay(true);

    let mut framed = Framed::new(stream, ReconCodec::new());

    debug!(%remote, "Accepted reconciliation connection");

    loop {
        let request = match time::timeout(idle, framed.next()).await {
            Err(_) => {
                debug!(%remote, "Closing idle reconciliation connection");
                break;
            }
            Ok(None) => break,
            Ok(Some(Ok(request))) => request,
            Ok(Some(Err(err))) => {
                warn!(%remote, error = %err, "Malformed reconciliation request");

                if err.is_malformed() {
                    let reply = Message::Error {
                        prefix: Prefix::ROOT,
                        code: ErrorCode::Malformed,
                    };
                    let _ignored = framed.send(reply).await;
                }
                break;
            }
        };

        let response = responder.handle(&request);

        if let Err(err) = framed.send(response).await {
            debug!(%remote, error = %err, "Failed to answer reconciliation request");
            break;
        }
    }

    debug!(%remote, "Reconciliation connection closed");
}
