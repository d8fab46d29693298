//! Physical link actor.
//!
//! # Responsibilities
//! - Own one TCP socket together with its [`Pipeline`] and outbound buffer
//! - Decode inbound frames with the current inbound state and hand them to
//!   the side-specific handler
//! - Execute [`LinkCommand`]s posted by other tasks, in order
//! - Flush after every batch of work and resolve pending sync requests only
//!   once the bytes before them have been written
//!
//! # Design Decisions
//! - Commands win over socket reads (`biased`), so a state change queued
//!   by the orchestrator is applied before later inbound traffic is decoded
//! - An encode failure freezes the outbound side: nothing more is written
//!   and the link closes
//! - The command queue is bounded. A peer that reads so slowly that
//!   [`COMMAND_QUEUE_LEN`] commands pile up is dropped instead of buffered
//!   without limit

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::auth::GameProfile;
use crate::net::LinkId;
use crate::observability::metrics;
use crate::pipeline::Pipeline;
use crate::protocol::codec::{self, Inbound, Passthrough};
use crate::protocol::packets::{Disconnect, LoginDisconnect, SystemChat, TextComponent};
use crate::protocol::{Direction, Packet, PacketRegistry, ProtocolState, StateSlot};
use crate::proxy::{Connection, ProxyError};

const READ_BUF_LEN: usize = 16 * 1024;

/// Commands a link may have waiting before it is considered overrun.
pub const COMMAND_QUEUE_LEN: usize = 16 * 1024;

/// Receiving end of a link's command queue.
pub type LinkReceiver = mpsc::Receiver<LinkCommand>;

/// Which side of the proxy a link faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client ↔ proxy.
    Upstream,
    /// Proxy ↔ backend.
    Downstream,
}

impl Role {
    /// Direction and state slot used to decode what arrives on this link.
    pub fn inbound(self) -> (Direction, StateSlot) {
        match self {
            Role::Upstream => (Direction::Serverbound, StateSlot::ClientInbound),
            Role::Downstream => (Direction::Clientbound, StateSlot::BackendInbound),
        }
    }

    /// Direction and state slot used to encode what this link writes.
    pub fn outbound(self) -> (Direction, StateSlot) {
        match self {
            Role::Upstream => (Direction::Clientbound, StateSlot::ClientOutbound),
            Role::Downstream => (Direction::Serverbound, StateSlot::BackendOutbound),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Upstream => "upstream",
            Role::Downstream => "downstream",
        }
    }
}

/// Work posted to a link task.
#[derive(Debug)]
pub enum LinkCommand {
    /// Encode with the current outbound state.
    Send(Packet),
    /// Send, then apply the transitions before anything else is processed.
    SendAndTransition {
        packet: Packet,
        transitions: Vec<(StateSlot, ProtocolState)>,
    },
    /// Relay a packet decoded on the paired link in `state`.
    Forward { packet: Packet, state: ProtocolState },
    /// Relay an unmodelled frame (`varint(id) ++ body`) decoded in `state`.
    ForwardRaw { frame: Bytes, state: ProtocolState },
    Transition(StateSlot, ProtocolState),
    /// Install compression on both flows with this threshold.
    EnableCompression(usize),
    /// Chat line for the player; queued until PLAY.
    Message(String),
    /// Resolved once everything queued before it has been written.
    Sync(oneshot::Sender<()>),
    /// Kick with a reason (upstream), or just close (downstream).
    Disconnect(TextComponent),
    /// Session verification finished for this client.
    Authenticated(GameProfile),
    Close,
}

/// Cloneable address of a link task.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    id: LinkId,
    role: Role,
    tx: mpsc::Sender<LinkCommand>,
    overrun: Arc<AtomicBool>,
}

impl LinkHandle {
    /// New handle plus the receiver its link task will drain.
    pub fn channel(role: Role) -> (Self, LinkReceiver) {
        Self::with_capacity(role, COMMAND_QUEUE_LEN)
    }

    pub fn with_capacity(role: Role, capacity: usize) -> (Self, LinkReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            id: LinkId::new(),
            role,
            tx,
            overrun: Arc::new(AtomicBool::new(false)),
        };
        (handle, rx)
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Post a command. Returns `false` if the link is gone or overrun; an
    /// overrun link closes as soon as its task sees the flag.
    pub fn send(&self, command: LinkCommand) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if !self.overrun.swap(true, Ordering::AcqRel) {
                    tracing::warn!(link_id = %self.id, role = self.role.as_str(), "Link command queue full");
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Whether a command was refused because the queue was full.
    pub fn is_overrun(&self) -> bool {
        self.overrun.load(Ordering::Acquire)
    }

    pub fn send_packet(&self, packet: impl Into<Packet>) -> bool {
        self.send(LinkCommand::Send(packet.into()))
    }

    pub fn send_and_transition(
        &self,
        packet: impl Into<Packet>,
        transitions: Vec<(StateSlot, ProtocolState)>,
    ) -> bool {
        self.send(LinkCommand::SendAndTransition {
            packet: packet.into(),
            transitions,
        })
    }

    pub fn close(&self) {
        self.send(LinkCommand::Close);
    }

    /// Wait until every command posted so far has been executed and flushed.
    ///
    /// Returns `false` if the link closed first.
    pub async fn sync(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if !self.send(LinkCommand::Sync(tx)) {
            return false;
        }
        rx.await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Side-specific behaviour plugged into a [`Link`].
pub(crate) trait LinkHandler: Send + 'static {
    fn on_packet(&mut self, io: &mut LinkIo<'_>, packet: Packet) -> Result<(), ProxyError>;

    fn on_passthrough(&mut self, io: &mut LinkIo<'_>, passthrough: Passthrough) -> Result<(), ProxyError>;

    fn on_authenticated(&mut self, _io: &mut LinkIo<'_>, _profile: GameProfile) -> Result<(), ProxyError> {
        Ok(())
    }

    /// The link is about to close because of `error`.
    fn on_error(&mut self, _io: &mut LinkIo<'_>, _error: &ProxyError) {}

    /// Runs exactly once, after the socket is closed.
    fn on_closed(&mut self);
}

/// What a handler may do to its own link.
pub(crate) struct LinkIo<'a> {
    role: Role,
    conn: &'a Arc<Connection>,
    registry: &'a PacketRegistry,
    pipeline: &'a mut Pipeline,
    out: &'a mut BytesMut,
    closing: &'a mut bool,
    frozen: &'a mut bool,
}

impl LinkIo<'_> {
    pub fn connection(&self) -> &Arc<Connection> {
        self.conn
    }

    pub fn pipeline(&mut self) -> &mut Pipeline {
        self.pipeline
    }

    /// Encode `packet` with the current outbound state.
    pub fn send(&mut self, packet: &Packet) -> Result<(), ProxyError> {
        if *self.frozen {
            return Ok(());
        }
        let (direction, slot) = self.role.outbound();
        let state = self.conn.states().get(slot);
        let payload = match codec::encode_packet(self.registry, direction, state, packet) {
            Ok(payload) => payload,
            Err(e) => {
                *self.frozen = true;
                self.out.clear();
                return Err(ProxyError::Encode(e));
            }
        };
        self.pipeline.encode_frame(&payload, self.out)?;
        tracing::trace!(role = self.role.as_str(), kind = ?packet.kind(), %state, "Packet queued");
        Ok(())
    }

    /// Write an already encoded `varint(id) ++ body` payload.
    pub fn send_raw(&mut self, frame: &[u8]) -> Result<(), ProxyError> {
        if *self.frozen {
            return Ok(());
        }
        self.pipeline.encode_frame(frame, self.out)?;
        Ok(())
    }

    /// Change one of the states owned by this link.
    pub fn transition(&mut self, slot: StateSlot, next: ProtocolState) -> Result<(), ProxyError> {
        self.conn.states().transition(slot, next)?;
        if self.role == Role::Upstream && slot == StateSlot::ClientOutbound && next == ProtocolState::Play {
            for text in self.conn.take_pending_chat() {
                self.send(&SystemChat::text(text).into())?;
            }
        }
        Ok(())
    }

    /// Deliver a chat line now if the client is in PLAY, otherwise queue it.
    pub fn message(&mut self, text: String) -> Result<(), ProxyError> {
        if self.role != Role::Upstream {
            return Ok(());
        }
        if self.conn.states().get(StateSlot::ClientOutbound) == ProtocolState::Play {
            self.send(&SystemChat::text(text).into())
        } else {
            self.conn.queue_chat(text);
            Ok(())
        }
    }

    /// Best-effort kick message for the current client state, then close.
    pub fn disconnect(&mut self, reason: &TextComponent) {
        if self.role == Role::Upstream {
            let packet: Option<Packet> = match self.conn.states().get(StateSlot::ClientOutbound) {
                ProtocolState::Login => Some(LoginDisconnect::from_text(&reason.to_plain()).into()),
                ProtocolState::Configuration | ProtocolState::Play => {
                    Some(Disconnect { reason: reason.clone() }.into())
                }
                ProtocolState::Handshake | ProtocolState::Status => None,
            };
            if let Some(packet) = packet {
                if let Err(e) = self.send(&packet) {
                    tracing::debug!(error = %e, "Failed to queue disconnect message");
                }
            }
        }
        self.close();
    }

    pub fn close(&mut self) {
        *self.closing = true;
    }
}

/// The task state of one physical link.
pub(crate) struct Link<H> {
    id: LinkId,
    role: Role,
    stream: TcpStream,
    commands: LinkReceiver,
    overrun: Arc<AtomicBool>,
    conn: Arc<Connection>,
    registry: Arc<PacketRegistry>,
    pipeline: Pipeline,
    out: BytesMut,
    handler: H,
    pending_syncs: Vec<oneshot::Sender<()>>,
    closing: bool,
    frozen: bool,
}

enum Event {
    Command(Option<LinkCommand>),
    Read(std::io::Result<usize>),
}

impl<H: LinkHandler> Link<H> {
    pub fn new(
        handle: &LinkHandle,
        stream: TcpStream,
        commands: LinkReceiver,
        conn: Arc<Connection>,
        registry: Arc<PacketRegistry>,
        handler: H,
    ) -> Self {
        Self {
            id: handle.id(),
            role: handle.role(),
            stream,
            commands,
            overrun: Arc::clone(&handle.overrun),
            conn,
            registry,
            pipeline: Pipeline::new(),
            out: BytesMut::with_capacity(READ_BUF_LEN),
            handler,
            pending_syncs: Vec::new(),
            closing: false,
            frozen: false,
        }
    }

    fn split(&mut self) -> (&mut H, LinkIo<'_>) {
        (
            &mut self.handler,
            LinkIo {
                role: self.role,
                conn: &self.conn,
                registry: &self.registry,
                pipeline: &mut self.pipeline,
                out: &mut self.out,
                closing: &mut self.closing,
                frozen: &mut self.frozen,
            },
        )
    }

    /// Drive the link until either side closes it.
    pub async fn run(mut self) {
        tracing::debug!(link_id = %self.id, connection_id = %self.conn.id(), role = self.role.as_str(), "Link started");

        let mut read_buf = vec![0u8; READ_BUF_LEN];
        if let Err(error) = self.drive(&mut read_buf).await {
            match &error {
                ProxyError::Io(e) => {
                    tracing::debug!(link_id = %self.id, role = self.role.as_str(), error = %e, "Link I/O error")
                }
                other => {
                    tracing::warn!(link_id = %self.id, role = self.role.as_str(), error = %other, "Closing link")
                }
            }
            let (handler, mut io) = self.split();
            handler.on_error(&mut io, &error);
        }

        if let Err(e) = self.flush().await {
            tracing::trace!(link_id = %self.id, error = %e, "Final flush failed");
        }
        let _ = self.stream.shutdown().await;
        self.commands.close();
        self.pending_syncs.clear();
        self.handler.on_closed();
        tracing::debug!(link_id = %self.id, role = self.role.as_str(), "Link closed");
    }

    async fn drive(&mut self, read_buf: &mut [u8]) -> Result<(), ProxyError> {
        loop {
            let event = tokio::select! {
                biased;
                command = self.commands.recv() => Event::Command(command),
                read = self.stream.read(read_buf) => Event::Read(read),
            };

            match event {
                Event::Command(Some(command)) => {
                    self.apply(command)?;
                    // Take whatever else is already queued before paying for a write.
                    while !self.closing {
                        match self.commands.try_recv() {
                            Ok(command) => self.apply(command)?,
                            Err(_) => break,
                        }
                    }
                    if self.overrun.load(Ordering::Acquire) {
                        return Err(ProxyError::Overrun);
                    }
                }
                Event::Command(None) => self.closing = true,
                Event::Read(read) => {
                    let n = read?;
                    if n == 0 {
                        self.closing = true;
                    } else {
                        self.pipeline.feed(&read_buf[..n]);
                        self.drain_frames()?;
                    }
                }
            }

            self.flush().await?;
            if self.closing {
                return Ok(());
            }
        }
    }

    fn drain_frames(&mut self) -> Result<(), ProxyError> {
        let role = self.role;
        let (direction, slot) = role.inbound();
        while !self.closing {
            let Some(frame) = self.pipeline.next_frame()? else {
                break;
            };
            // Re-read per frame: handling the previous one may have moved it.
            let state = self.conn.states().get(slot);
            let inbound = codec::decode_frame(&self.registry, direction, state, frame)?;
            let (handler, mut io) = self.split();
            match inbound {
                Inbound::Packet(packet) => {
                    tracing::trace!(role = role.as_str(), kind = ?packet.kind(), %state, "Packet received");
                    handler.on_packet(&mut io, packet)?
                }
                Inbound::Passthrough(passthrough) => handler.on_passthrough(&mut io, passthrough)?,
            }
        }
        Ok(())
    }

    fn apply(&mut self, command: LinkCommand) -> Result<(), ProxyError> {
        if self.closing {
            return Ok(());
        }
        let command = match command {
            LinkCommand::Sync(tx) => {
                self.pending_syncs.push(tx);
                return Ok(());
            }
            other => other,
        };
        let (_, out_slot) = self.role.outbound();
        let role = self.role;
        let (handler, mut io) = self.split();
        match command {
            LinkCommand::Send(packet) => io.send(&packet)?,
            LinkCommand::SendAndTransition { packet, transitions } => {
                io.send(&packet)?;
                for (slot, state) in transitions {
                    io.transition(slot, state)?;
                }
            }
            LinkCommand::Forward { packet, state } => {
                let current = io.connection().states().get(out_slot);
                if current == state {
                    io.send(&packet)?;
                    metrics::record_forwarded(role);
                } else {
                    tracing::debug!(kind = ?packet.kind(), decoded_in = %state, outbound = %current, "Dropping forwarded packet");
                }
            }
            LinkCommand::ForwardRaw { frame, state } => {
                let current = io.connection().states().get(out_slot);
                if current == state {
                    io.send_raw(&frame)?;
                    metrics::record_passthrough(role);
                } else {
                    tracing::debug!(decoded_in = %state, outbound = %current, "Dropping forwarded frame");
                }
            }
            LinkCommand::Transition(slot, state) => io.transition(slot, state)?,
            LinkCommand::EnableCompression(threshold) => io.pipeline().enable_compression(threshold)?,
            LinkCommand::Message(text) => io.message(text)?,
            LinkCommand::Sync(_) => {}
            LinkCommand::Disconnect(reason) => io.disconnect(&reason),
            LinkCommand::Authenticated(profile) => handler.on_authenticated(&mut io, profile)?,
            LinkCommand::Close => io.close(),
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ProxyError> {
        if !self.out.is_empty() && !self.frozen {
            self.stream.write_all(&self.out).await?;
            self.out.clear();
        }
        for tx in self.pending_syncs.drain(..) {
            let _ = tx.send(());
        }
        Ok(())
    }
}
