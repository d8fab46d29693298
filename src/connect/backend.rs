//! Opening a backend link and logging the player into it.
//!
//! # Responsibilities
//! - TCP connect within the configured timeout
//! - Spawn the downstream link task and make it the connection's active
//!   downstream before its first read
//! - Handshake + Hello, then wait for the downstream handler to report
//!   LoginSuccess (or the backend's refusal)
//! - LoginAcknowledged once the caller has moved the client along

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::connect::{forwarding, ConnectError};
use crate::proxy::downstream::{DownstreamHandler, LoginResult};
use crate::proxy::link::{Link, LinkHandle, Role};
use crate::proxy::{BackendServer, Connection, ProxyContext};
use crate::protocol::packets::{Handshake, Hello, LoginAcknowledged};
use crate::protocol::{ProtocolState, StateSlot, PROTOCOL_VERSION};

/// A freshly opened downstream link that has not finished LOGIN yet.
pub struct BackendLink {
    handle: LinkHandle,
    login: oneshot::Receiver<LoginResult>,
}

impl BackendLink {
    pub fn handle(&self) -> &LinkHandle {
        &self.handle
    }

    /// Connect to `server` and install the link as `conn`'s downstream.
    ///
    /// Any previous downstream is closed. Fails with
    /// [`ConnectError::ClientGone`] without spawning the link if the client
    /// left in the meantime.
    pub async fn open(
        ctx: &Arc<ProxyContext>,
        conn: &Arc<Connection>,
        server: &Arc<BackendServer>,
    ) -> Result<Self, ConnectError> {
        let (host, port) = server.host_port();
        let timeout = Duration::from_secs(ctx.config().timeouts.connect_secs);
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ConnectError::Timeout("backend connect"))??;
        stream.set_nodelay(true)?;

        let (handle, commands) = LinkHandle::channel(Role::Downstream);
        let (login_tx, login) = oneshot::channel();
        let handler = DownstreamHandler::new(
            Arc::clone(ctx),
            Arc::clone(conn),
            handle.id(),
            Arc::clone(server),
            login_tx,
        );

        if let Some(previous) = conn.set_downstream(handle.clone()) {
            ctx.directory().unlink(previous.id());
            previous.close();
        }
        ctx.directory().link(handle.id(), conn.id());

        // The upstream closes its receiver before it tears down the
        // downstream, so either it sees this link or we see it closed.
        if conn.upstream().is_closed() {
            conn.take_downstream_if(handle.id());
            ctx.directory().unlink(handle.id());
            return Err(ConnectError::ClientGone);
        }

        tracing::debug!(
            connection_id = %conn.id(),
            link_id = %handle.id(),
            server = %server.name(),
            address = %server.address(),
            "Backend link open"
        );

        let link = Link::new(&handle, stream, commands, Arc::clone(conn), Arc::clone(ctx.registry()), handler);
        let span = tracing::info_span!("backend", connection_id = %conn.id(), server = %server.name());
        tokio::spawn(link.run().instrument(span));

        Ok(Self { handle, login })
    }

    /// Send Handshake + Hello and wait for LoginSuccess.
    pub async fn login(
        &mut self,
        ctx: &ProxyContext,
        conn: &Connection,
        server: &BackendServer,
    ) -> Result<(), ConnectError> {
        let profile = conn.profile().ok_or(ConnectError::ClientGone)?;
        let (backend_host, port) = server.host_port();
        let host = conn
            .virtual_host()
            .map(|virtual_host| virtual_host.host)
            .unwrap_or_else(|| backend_host.to_string());
        let server_address = forwarding::handshake_address(
            ctx.config().proxy.forwarding,
            &host,
            conn.peer_addr().ip(),
            profile,
        )
        .map_err(|e| ConnectError::Backend(e.to_string()))?;

        let handshake = Handshake {
            protocol_version: PROTOCOL_VERSION,
            server_address,
            server_port: port,
            intent: Handshake::INTENT_LOGIN,
        };
        self.handle.send_and_transition(
            handshake,
            vec![
                (StateSlot::BackendOutbound, ProtocolState::Login),
                (StateSlot::BackendInbound, ProtocolState::Login),
            ],
        );
        self.handle.send_packet(Hello {
            username: profile.name.clone(),
            uuid: profile.id,
        });

        let timeout = Duration::from_secs(ctx.config().timeouts.login_secs);
        match tokio::time::timeout(timeout, &mut self.login).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConnectError::Closed),
            Err(_) => Err(ConnectError::Timeout("backend login")),
        }
    }

    /// Acknowledge the backend's LoginSuccess and replay the client's settings.
    pub fn finish_login(&self, conn: &Connection) {
        self.handle.send_and_transition(
            LoginAcknowledged,
            vec![(StateSlot::BackendOutbound, ProtocolState::Configuration)],
        );
        if let Some(info) = conn.client_info() {
            self.handle.send_packet(info);
        }
    }

    /// Tear the link down after a failed connect.
    pub fn abort(&self, ctx: &ProxyContext, conn: &Connection) {
        conn.take_downstream_if(self.handle.id());
        ctx.directory().unlink(self.handle.id());
        self.handle.close();
    }
}
