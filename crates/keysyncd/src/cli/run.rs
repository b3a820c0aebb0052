use core::net::SocketAddr;
use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use camino::Utf8Path;
use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use keysync_config::ConfigFile;
use keysync_node::SyncHandle;
use keysync_recon::ReconServer;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::RootArgs;
use crate::node::Node;

/// Run the reconciliation daemon
#[derive(Debug, Parser)]
pub struct RunCommand {
    /// Rebuild the prefix tree from the key-store before serving
    #[arg(long)]
    pub rebuild: bool,
}

impl RunCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let mut registry = Registry::default();

        let node = Node::open(&root_args.home, &mut registry)?;

        if self.rebuild || node.tree.is_empty() {
            let elements = node.coordinator.rebuild().await?;
            info!(elements, "Prefix tree ready");
        }

        let shutdown = CancellationToken::new();

        let server = ReconServer::bind(node.config.recon.listen, Arc::clone(&node.tree))
            .await
            .wrap_err_with(|| {
                format!("failed to bind reconciliation server to {}", node.config.recon.listen)
            })?;
        let server = tokio::spawn(server.run(shutdown.child_token()));

        let metrics = match node.config.metrics.listen {
            Some(addr) => Some(tokio::spawn(serve_metrics(
                addr,
                registry,
                shutdown.child_token(),
            ))),
            None => None,
        };

        let (handle, scheduler) = Arc::clone(&node.coordinator).start(shutdown.child_token());

        info!(
            peers = node.coordinator.peers().len(),
            "Node running, press Ctrl+C to stop, send SIGHUP to reload peers"
        );

        let mut hangup =
            signal(SignalKind::hangup()).wrap_err("failed to listen for reload signal")?;

        loop {
            tokio::select! {
                res = ctrl_c() => {
                    res.wrap_err("failed to listen for shutdown signal")?;
                    break;
                }
                _ = hangup.recv() => reload_peers(&root_args.home, &node, &handle),
            }
        }

        info!("Shutting down");
        shutdown.cancel();

        if let Err(err) = scheduler.await {
            warn!(%err, "Scheduler task ended abnormally");
        }

        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(%err, "Reconciliation server failed"),
            Err(err) => warn!(%err, "Reconciliation server task ended abnormally"),
        }

        if let Some(metrics) = metrics {
            match metrics.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(?err, "Metrics server failed"),
                Err(err) => warn!(%err, "Metrics server task ended abnormally"),
            }
        }

        Ok(())
    }
}

/// Re-reads the peer list from the configuration file and reconciles with the
/// new list right away.
fn reload_peers(home: &Utf8Path, node: &Node, handle: &SyncHandle) {
    let config = match ConfigFile::load(home) {
        Ok(config) => config,
        Err(err) => {
            error!(?err, "Failed to reload configuration, keeping current peers");
            return;
        }
    };

    node.coordinator.reload_peers(config.recon.external_peers);

    if !handle.trigger(None) {
        warn!("Reconciliation already pending, reload picked up on next cycle");
    }
}

async fn serve_metrics(
    addr: SocketAddr,
    registry: Registry,
    shutdown: CancellationToken,
) -> EyreResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind metrics server to {addr}"))?;

    info!("Metrics server listening on {}/metrics", addr);

    let app = Router::new()
        .route("/metrics", get(handle_metrics))
        .layer(Extension(Arc::new(registry)));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

async fn handle_metrics(Extension(registry): Extension<Arc<Registry>>) -> impl IntoResponse {
    let mut buffer = String::new();

    if let Err(err) = encode(&mut buffer, &registry) {
        error!(%err, "Failed to encode metrics");
    }

    buffer
}
