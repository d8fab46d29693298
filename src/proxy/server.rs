//! Accept loop and graceful drain.
//!
//! # Responsibilities
//! - Accept client sockets and give each an upstream link task
//! - Stop accepting on shutdown, kick everyone, then wait for the links
//!   to finish within the configured grace period

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::Instrument;

use crate::net::{ConnectionId, Listener, ListenerError};
use crate::observability::metrics;
use crate::proxy::link::{Link, LinkHandle, Role};
use crate::proxy::upstream::UpstreamHandler;
use crate::proxy::{Connection, ProxyContext};

const SHUTDOWN_MESSAGE: &str = "Proxy shutting down";

/// The proxy's front door.
pub struct ProxyServer {
    ctx: Arc<ProxyContext>,
    listener: Listener,
}

impl ProxyServer {
    pub fn new(ctx: Arc<ProxyContext>, listener: Listener) -> Self {
        Self { ctx, listener }
    }

    pub fn context(&self) -> &Arc<ProxyContext> {
        &self.ctx
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until `shutdown` fires, then drain.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ListenerError> {
        tracing::info!(
            address = ?self.listener.local_addr().ok(),
            online_mode = self.ctx.config().proxy.online_mode,
            servers = ?self.ctx.servers().names(),
            "Proxy accepting players"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr, permit)) => {
                        let id = ConnectionId::new();
                        let guard = self.ctx.tracker().track(id);
                        let (handle, commands) = LinkHandle::channel(Role::Upstream);
                        let conn = Arc::new(Connection::new(id, peer_addr, handle.clone()));
                        self.ctx.directory().insert(&conn);
                        metrics::record_connection_opened();
                        tracing::debug!(connection_id = %id, %peer_addr, "Client connected");

                        let handler = UpstreamHandler::new(Arc::clone(&self.ctx), Arc::clone(&conn), guard, Some(permit));
                        let link = Link::new(&handle, stream, commands, conn, Arc::clone(self.ctx.registry()), handler);
                        let span = tracing::info_span!("connection", connection_id = %id, %peer_addr);
                        tokio::spawn(link.run().instrument(span));
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        let connections = self.ctx.directory().all();
        tracing::info!(count = connections.len(), "Disconnecting players");
        for conn in connections {
            conn.disconnect(SHUTDOWN_MESSAGE);
        }

        let grace = Duration::from_secs(self.ctx.config().timeouts.shutdown_secs);
        if self.ctx.tracker().wait_idle(grace).await {
            tracing::info!("All connections closed");
        } else {
            tracing::warn!(
                remaining = self.ctx.tracker().active_count(),
                "Shutdown grace period expired with connections still open"
            );
        }
    }
}
