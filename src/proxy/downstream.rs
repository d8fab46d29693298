//! Backend-side packet handling.
//!
//! # Responsibilities
//! - Follow the backend's LOGIN phase and report the outcome to the
//!   connect step waiting on it
//! - Relay everything else to the client, tagged with the state it was
//!   decoded in
//! - Ignore everything once this link is no longer the active downstream

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::connect::ConnectError;
use crate::net::LinkId;
use crate::protocol::codec::Passthrough;
use crate::protocol::{Packet, ProtocolState, StateSlot};
use crate::proxy::link::{LinkCommand, LinkHandler, LinkIo};
use crate::proxy::{BackendServer, Connection, HandleResult, ProxyContext, ProxyError};

/// Resolves when the backend accepts or refuses the login.
pub(crate) type LoginResult = Result<(), ConnectError>;

pub(crate) struct DownstreamHandler {
    ctx: Arc<ProxyContext>,
    conn: Arc<Connection>,
    link_id: LinkId,
    server: Arc<BackendServer>,
    login: Option<oneshot::Sender<LoginResult>>,
}

impl DownstreamHandler {
    pub fn new(
        ctx: Arc<ProxyContext>,
        conn: Arc<Connection>,
        link_id: LinkId,
        server: Arc<BackendServer>,
        login: oneshot::Sender<LoginResult>,
    ) -> Self {
        Self {
            ctx,
            conn,
            link_id,
            server,
            login: Some(login),
        }
    }

    fn resolve_login(&mut self, result: LoginResult) {
        if let Some(tx) = self.login.take() {
            let _ = tx.send(result);
        }
    }

    fn forward(&self, packet: Packet) {
        for listener in self.ctx.listeners() {
            if listener.on_clientbound(&self.ctx, &self.conn, &packet) == HandleResult::Consume {
                return;
            }
        }
        let state = self.conn.states().get(StateSlot::BackendInbound);
        self.conn.upstream().send(LinkCommand::Forward { packet, state });
    }
}

impl LinkHandler for DownstreamHandler {
    fn on_packet(&mut self, io: &mut LinkIo<'_>, packet: Packet) -> Result<(), ProxyError> {
        if !self.conn.is_active_downstream(self.link_id) {
            tracing::debug!(link_id = %self.link_id, kind = ?packet.kind(), "Packet from stale backend link");
            io.close();
            return Ok(());
        }

        match packet {
            Packet::SetCompression(compression) => {
                if let Ok(threshold) = usize::try_from(compression.threshold) {
                    io.pipeline().enable_compression(threshold)?;
                }
            }
            Packet::LoginSuccess(success) => {
                tracing::debug!(
                    connection_id = %self.conn.id(),
                    server = %self.server.name(),
                    username = %success.username,
                    "Backend accepted login"
                );
                io.transition(StateSlot::BackendInbound, ProtocolState::Configuration)?;
                self.resolve_login(Ok(()));
            }
            Packet::EncryptionRequest(_) => {
                self.resolve_login(Err(ConnectError::BackendOnlineMode));
                io.close();
            }
            Packet::LoginDisconnect(disconnect) => {
                self.resolve_login(Err(ConnectError::BackendRejected(disconnect.text())));
                io.close();
            }
            Packet::Disconnect(disconnect) => {
                tracing::info!(
                    connection_id = %self.conn.id(),
                    server = %self.server.name(),
                    reason = %disconnect.reason.to_plain(),
                    "Kicked by backend"
                );
                self.conn.kick(disconnect.reason);
                io.close();
            }
            packet @ Packet::StartConfiguration(_) => {
                // the client leaves PLAY as soon as it reads this
                self.conn.upstream().send_and_transition(
                    packet,
                    vec![(StateSlot::ClientOutbound, ProtocolState::Configuration)],
                );
            }
            other => self.forward(other),
        }
        Ok(())
    }

    fn on_passthrough(&mut self, io: &mut LinkIo<'_>, passthrough: Passthrough) -> Result<(), ProxyError> {
        if !self.conn.is_active_downstream(self.link_id) {
            io.close();
            return Ok(());
        }
        let state = self.conn.states().get(StateSlot::BackendInbound);
        self.conn.upstream().send(LinkCommand::ForwardRaw {
            frame: passthrough.to_frame().freeze(),
            state,
        });
        Ok(())
    }

    fn on_error(&mut self, _io: &mut LinkIo<'_>, error: &ProxyError) {
        self.resolve_login(Err(ConnectError::Backend(error.to_string())));
    }

    fn on_closed(&mut self) {
        self.ctx.directory().unlink(self.link_id);
        self.resolve_login(Err(ConnectError::Closed));

        if self.conn.take_downstream_if(self.link_id).is_some() && !self.conn.is_connecting() {
            tracing::info!(
                connection_id = %self.conn.id(),
                server = %self.server.name(),
                "Lost connection to backend"
            );
            self.conn.disconnect(format!("Lost connection to {}", self.server.name()));
        }
    }
}
