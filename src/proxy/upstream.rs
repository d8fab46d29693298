//! Client-side packet handling.
//!
//! # Responsibilities
//! - Answer status pings locally
//! - Run login: offline, or the online-mode key exchange with session
//!   verification off the link task
//! - Register the player and start the initial connect
//! - Track the client's CONFIGURATION/PLAY transitions and relay the rest
//!   to the active backend
//!
//! # Data Flow
//! ```text
//! Handshake ─▶ STATUS: StatusRequest ─▶ StatusResponse, Ping ─▶ Pong, close
//!           └▶ LOGIN:  Hello ─▶ (online) EncryptionRequest
//!                      EncryptionResponse ─▶ cipher on ─▶ verifier task
//!                      Authenticated/offline ─▶ directory ─▶ initial connect
//! ```

use std::sync::Arc;

use crate::auth::{AuthError, GameProfile, HandshakeState};
use crate::connect;
use crate::net::{ConnectionGuard, ConnectionPermit};
use crate::observability::metrics;
use crate::protocol::codec::Passthrough;
use crate::protocol::packets::status::{
    StatusDescription, StatusDocument, StatusPlayers, StatusSample, StatusVersion,
};
use crate::protocol::packets::{
    EncryptionResponse, Handshake, Hello, PongResponse, StatusResponse, TextComponent,
};
use crate::protocol::{CodecError, Packet, ProtocolState, StateSlot, GAME_VERSION, PROTOCOL_VERSION};
use crate::proxy::connection::VirtualHost;
use crate::proxy::link::{LinkCommand, LinkHandler, LinkIo};
use crate::proxy::{Connection, HandleResult, ProxyContext, ProxyError};

/// Players listed in the status sample.
const STATUS_SAMPLE_LEN: usize = 12;

pub(crate) struct UpstreamHandler {
    ctx: Arc<ProxyContext>,
    conn: Arc<Connection>,
    logged_in: bool,
    _guard: ConnectionGuard,
    _permit: Option<ConnectionPermit>,
}

impl UpstreamHandler {
    pub fn new(
        ctx: Arc<ProxyContext>,
        conn: Arc<Connection>,
        guard: ConnectionGuard,
        permit: Option<ConnectionPermit>,
    ) -> Self {
        Self {
            ctx,
            conn,
            logged_in: false,
            _guard: guard,
            _permit: permit,
        }
    }

    fn handshake(&mut self, io: &mut LinkIo<'_>, handshake: Handshake) -> Result<(), ProxyError> {
        let next = ProtocolState::from_intent(handshake.intent).ok_or(CodecError::InvalidValue {
            field: "intent",
            value: i64::from(handshake.intent),
        })?;
        io.transition(StateSlot::ClientInbound, next)?;
        io.transition(StateSlot::ClientOutbound, next)?;

        // Forge and friends append markers after a NUL.
        let host = handshake
            .server_address
            .split('\0')
            .next()
            .unwrap_or_default()
            .trim_end_matches('.')
            .to_string();
        self.conn.set_virtual_host(VirtualHost {
            host,
            port: handshake.server_port,
        });

        tracing::debug!(
            connection_id = %self.conn.id(),
            protocol_version = handshake.protocol_version,
            intent = handshake.intent,
            "Handshake received"
        );

        if next == ProtocolState::Login && handshake.protocol_version != PROTOCOL_VERSION {
            tracing::info!(
                connection_id = %self.conn.id(),
                protocol_version = handshake.protocol_version,
                "Refusing unsupported client version"
            );
            io.disconnect(&TextComponent::plain(format!(
                "Unsupported client version. Please connect with {GAME_VERSION}."
            )));
        }
        Ok(())
    }

    fn status(&self, io: &mut LinkIo<'_>) -> Result<(), ProxyError> {
        let directory = self.ctx.directory();
        let sample = directory
            .players()
            .iter()
            .filter_map(|conn| conn.profile())
            .take(STATUS_SAMPLE_LEN)
            .map(|profile| StatusSample {
                name: profile.name.clone(),
                id: profile.id,
            })
            .collect();
        let settings = &self.ctx.config().proxy;
        let document = StatusDocument {
            version: StatusVersion {
                name: GAME_VERSION.to_string(),
                protocol: PROTOCOL_VERSION,
            },
            players: StatusPlayers {
                max: settings.max_players,
                online: directory.player_count() as u32,
                sample,
            },
            description: StatusDescription {
                text: settings.motd.clone(),
            },
            enforces_secure_chat: false,
        };
        let json = serde_json::to_string(&document)?;
        io.send(&StatusResponse { json }.into())
    }

    fn hello(&mut self, io: &mut LinkIo<'_>, hello: Hello) -> Result<(), ProxyError> {
        if self.logged_in || self.conn.profile().is_some() {
            return Err(ProxyError::Protocol("duplicate login start"));
        }
        tracing::info!(
            connection_id = %self.conn.id(),
            peer_addr = %self.conn.peer_addr(),
            username = %hello.username,
            "Login started"
        );

        if !self.ctx.config().proxy.online_mode {
            metrics::record_login("offline", "success");
            return self.complete_login(io, GameProfile::offline(hello.username, hello.uuid));
        }

        let keys = self.ctx.keys().ok_or(ProxyError::MissingKeys)?;
        let state = HandshakeState::new(hello.username, hello.uuid);
        io.send(&state.encryption_request(keys).into())?;
        self.conn.set_handshake(state);
        Ok(())
    }

    fn encryption_response(&mut self, io: &mut LinkIo<'_>, response: EncryptionResponse) -> Result<(), ProxyError> {
        let state = self.conn.take_handshake().ok_or(AuthError::NoHandshake)?;
        let keys = self.ctx.keys().ok_or(ProxyError::MissingKeys)?;

        let exchange = match state.complete(keys, &response) {
            Ok(exchange) => exchange,
            Err(e) => {
                tracing::warn!(connection_id = %self.conn.id(), username = %state.username, error = %e, "Key exchange failed");
                metrics::record_login("online", "rejected");
                io.disconnect(&TextComponent::plain(e.to_string()));
                return Ok(());
            }
        };

        // Before verification: the client encrypts from its next byte on.
        io.pipeline().enable_encryption(&exchange.shared_secret)?;

        let verifier = Arc::clone(self.ctx.verifier());
        let upstream = self.conn.upstream().clone();
        let connection_id = self.conn.id();
        let username = state.username;
        tokio::spawn(async move {
            match verifier.has_joined(&username, &exchange.server_hash).await {
                Ok(profile) => {
                    metrics::record_login("online", "success");
                    upstream.send(LinkCommand::Authenticated(profile));
                }
                Err(e) => {
                    tracing::warn!(%connection_id, %username, error = %e, "Session verification failed");
                    metrics::record_login("online", "unverified");
                    upstream.send(LinkCommand::Disconnect(TextComponent::plain(e.to_string())));
                }
            }
        });
        Ok(())
    }

    fn complete_login(&mut self, io: &mut LinkIo<'_>, profile: GameProfile) -> Result<(), ProxyError> {
        if let Err(e) = self.ctx.directory().register_player(&self.conn, &profile) {
            tracing::info!(connection_id = %self.conn.id(), username = %profile.name, error = %e, "Duplicate login refused");
            io.disconnect(&TextComponent::plain(e.to_string()));
            return Ok(());
        }
        tracing::info!(
            connection_id = %self.conn.id(),
            username = %profile.name,
            uuid = %profile.id,
            "Player logged in"
        );
        self.conn.set_profile(profile);
        self.logged_in = true;
        metrics::player_joined();

        let default_server = &self.ctx.config().proxy.default_server;
        let Some(server) = self.ctx.servers().get(default_server) else {
            tracing::warn!(server = %default_server, "Default server is not registered");
            io.disconnect(&TextComponent::plain("No server is available to connect to"));
            return Ok(());
        };

        let ctx = Arc::clone(&self.ctx);
        let conn = Arc::clone(&self.conn);
        tokio::spawn(async move {
            // failures are reported to the client by the connect itself
            let _ = connect::connect_initial(&ctx, &conn, server).await;
        });
        Ok(())
    }

    fn configuration_ack(&mut self, io: &mut LinkIo<'_>, packet: Packet) -> Result<(), ProxyError> {
        io.transition(StateSlot::ClientInbound, ProtocolState::Configuration)?;
        if let Some(waiter) = self.conn.take_switch_waiter() {
            // proxy-initiated: the switch orchestrator takes it from here
            let _ = waiter.send(());
            return Ok(());
        }
        // backend-initiated reconfiguration
        if let Some(downstream) = self.conn.downstream() {
            downstream.send_and_transition(
                packet,
                vec![
                    (StateSlot::BackendOutbound, ProtocolState::Configuration),
                    (StateSlot::BackendInbound, ProtocolState::Configuration),
                ],
            );
        }
        Ok(())
    }

    fn finish_configuration_ack(&mut self, io: &mut LinkIo<'_>, packet: Packet) -> Result<(), ProxyError> {
        if let Some(downstream) = self.conn.downstream() {
            downstream.send_and_transition(
                packet,
                vec![
                    (StateSlot::BackendOutbound, ProtocolState::Play),
                    (StateSlot::BackendInbound, ProtocolState::Play),
                ],
            );
        }
        io.transition(StateSlot::ClientInbound, ProtocolState::Play)?;
        io.transition(StateSlot::ClientOutbound, ProtocolState::Play)
    }

    fn forward(&self, packet: Packet) {
        for listener in self.ctx.listeners() {
            if listener.on_serverbound(&self.ctx, &self.conn, &packet) == HandleResult::Consume {
                return;
            }
        }
        let state = self.conn.states().get(StateSlot::ClientInbound);
        match self.conn.downstream() {
            Some(downstream) => {
                downstream.send(LinkCommand::Forward { packet, state });
            }
            None => tracing::trace!(kind = ?packet.kind(), "No backend, dropping packet"),
        }
    }
}

impl LinkHandler for UpstreamHandler {
    fn on_packet(&mut self, io: &mut LinkIo<'_>, packet: Packet) -> Result<(), ProxyError> {
        match packet {
            Packet::Handshake(handshake) => self.handshake(io, handshake),
            Packet::StatusRequest(_) => self.status(io),
            Packet::PingRequest(ping) => {
                io.send(&PongResponse { payload: ping.payload }.into())?;
                io.close();
                Ok(())
            }
            Packet::Hello(hello) => self.hello(io, hello),
            Packet::EncryptionResponse(response) => self.encryption_response(io, response),
            Packet::LoginAcknowledged(_) => io.transition(StateSlot::ClientInbound, ProtocolState::Configuration),
            Packet::ClientInformation(info) => {
                self.conn.set_client_info(info.clone());
                self.forward(Packet::ClientInformation(info));
                Ok(())
            }
            packet @ Packet::FinishConfigurationAck(_) => self.finish_configuration_ack(io, packet),
            packet @ Packet::ConfigurationAck(_) => self.configuration_ack(io, packet),
            other => {
                self.forward(other);
                Ok(())
            }
        }
    }

    fn on_passthrough(&mut self, _io: &mut LinkIo<'_>, passthrough: Passthrough) -> Result<(), ProxyError> {
        let state = self.conn.states().get(StateSlot::ClientInbound);
        if let Some(downstream) = self.conn.downstream() {
            downstream.send(LinkCommand::ForwardRaw {
                frame: passthrough.to_frame().freeze(),
                state,
            });
        }
        Ok(())
    }

    fn on_authenticated(&mut self, io: &mut LinkIo<'_>, profile: GameProfile) -> Result<(), ProxyError> {
        self.complete_login(io, profile)
    }

    fn on_error(&mut self, io: &mut LinkIo<'_>, error: &ProxyError) {
        if error.allows_disconnect_message() {
            io.disconnect(&TextComponent::plain(error.to_string()));
        }
    }

    fn on_closed(&mut self) {
        if let Some(downstream) = self.conn.take_downstream() {
            self.ctx.directory().unlink(downstream.id());
            downstream.close();
        }
        if let Some(server) = self.conn.take_server() {
            server.remove_member(self.conn.id());
        }
        // a pending switch sees its waiter dropped and fails
        drop(self.conn.take_switch_waiter());
        self.ctx.directory().remove(&self.conn);
        if self.logged_in {
            metrics::player_left();
        }
        tracing::info!(connection_id = %self.conn.id(), player = %self.conn, "Client disconnected");
    }
}
