//! The proxy's view of one client.
//!
//! A `Connection` owns its upstream link for life and at most one
//! downstream link at a time. It is shared (`Arc`) between the two link
//! tasks, the orchestrator and the directory; every field is either atomic
//! or behind a short-lived lock that is never held across an `.await`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::oneshot;

use crate::auth::{GameProfile, HandshakeState};
use crate::net::{ConnectionId, LinkId};
use crate::protocol::packets::{ClientInformation, TextComponent};
use crate::protocol::{Packet, ProtocolStates};
use crate::proxy::link::{LinkCommand, LinkHandle};
use crate::proxy::servers::BackendServer;

/// Chat lines kept for a client that is not in PLAY; older ones are dropped.
pub const MAX_PENDING_CHAT: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host and port the client said it was connecting to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHost {
    pub host: String,
    pub port: u16,
}

#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    upstream: LinkHandle,
    downstream: Mutex<Option<LinkHandle>>,
    states: ProtocolStates,
    server: Mutex<Option<Arc<BackendServer>>>,
    profile: OnceLock<GameProfile>,
    virtual_host: Mutex<Option<VirtualHost>>,
    handshake: Mutex<Option<HandshakeState>>,
    switch_waiter: Mutex<Option<oneshot::Sender<()>>>,
    client_info: Mutex<Option<ClientInformation>>,
    pending_chat: Mutex<Vec<String>>,
    connecting: AtomicBool,
}

impl Connection {
    pub fn new(id: ConnectionId, peer_addr: SocketAddr, upstream: LinkHandle) -> Self {
        Self {
            id,
            peer_addr,
            upstream,
            downstream: Mutex::new(None),
            states: ProtocolStates::new(),
            server: Mutex::new(None),
            profile: OnceLock::new(),
            virtual_host: Mutex::new(None),
            handshake: Mutex::new(None),
            switch_waiter: Mutex::new(None),
            client_info: Mutex::new(None),
            pending_chat: Mutex::new(Vec::new()),
            connecting: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn states(&self) -> &ProtocolStates {
        &self.states
    }

    pub fn upstream(&self) -> &LinkHandle {
        &self.upstream
    }

    /// Verified identity; `None` until login completes.
    pub fn profile(&self) -> Option<&GameProfile> {
        self.profile.get()
    }

    /// Set once. Returns `false` if a profile was already set.
    pub(crate) fn set_profile(&self, profile: GameProfile) -> bool {
        self.profile.set(profile).is_ok()
    }

    pub fn username(&self) -> Option<&str> {
        self.profile().map(|profile| profile.name.as_str())
    }

    // --- collaborator surface -------------------------------------------

    /// Send a message to the client with the current client-facing state.
    pub fn send_packet(&self, packet: impl Into<Packet>) -> bool {
        self.upstream.send_packet(packet)
    }

    /// Chat line for the player, delivered once the client is in PLAY.
    pub fn send_message(&self, text: impl Into<String>) -> bool {
        self.upstream.send(LinkCommand::Message(text.into()))
    }

    /// Kick the client with a plain-text reason.
    pub fn disconnect(&self, reason: impl Into<String>) {
        self.upstream.send(LinkCommand::Disconnect(TextComponent::plain(reason)));
    }

    /// Kick the client with a component (for reasons relayed from a backend).
    pub fn kick(&self, reason: TextComponent) {
        self.upstream.send(LinkCommand::Disconnect(reason));
    }

    // --- downstream -----------------------------------------------------

    pub fn downstream(&self) -> Option<LinkHandle> {
        lock(&self.downstream).clone()
    }

    /// Install a new active downstream, returning the one it replaces.
    pub(crate) fn set_downstream(&self, link: LinkHandle) -> Option<LinkHandle> {
        lock(&self.downstream).replace(link)
    }

    pub(crate) fn take_downstream(&self) -> Option<LinkHandle> {
        lock(&self.downstream).take()
    }

    /// Remove the active downstream only if it is `id`.
    pub(crate) fn take_downstream_if(&self, id: LinkId) -> Option<LinkHandle> {
        let mut downstream = lock(&self.downstream);
        if downstream.as_ref().map(LinkHandle::id) == Some(id) {
            downstream.take()
        } else {
            None
        }
    }

    /// Events from any other downstream are stale and must be ignored.
    pub fn is_active_downstream(&self, id: LinkId) -> bool {
        lock(&self.downstream).as_ref().map(LinkHandle::id) == Some(id)
    }

    // --- backend bookkeeping ------------------------------------------

    pub fn server(&self) -> Option<Arc<BackendServer>> {
        lock(&self.server).clone()
    }

    pub(crate) fn set_server(&self, server: Arc<BackendServer>) -> Option<Arc<BackendServer>> {
        lock(&self.server).replace(server)
    }

    pub(crate) fn take_server(&self) -> Option<Arc<BackendServer>> {
        lock(&self.server).take()
    }

    /// Claim the right to run a connect. Only one may be in flight.
    pub(crate) fn try_begin_connect(&self) -> bool {
        self.connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_connect(&self) {
        self.connecting.store(false, Ordering::Release);
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    // --- transient login/switch data ----------------------------------

    pub fn virtual_host(&self) -> Option<VirtualHost> {
        lock(&self.virtual_host).clone()
    }

    pub(crate) fn set_virtual_host(&self, host: VirtualHost) {
        *lock(&self.virtual_host) = Some(host);
    }

    pub(crate) fn set_handshake(&self, state: HandshakeState) {
        *lock(&self.handshake) = Some(state);
    }

    pub(crate) fn take_handshake(&self) -> Option<HandshakeState> {
        lock(&self.handshake).take()
    }

    pub(crate) fn install_switch_waiter(&self, waiter: oneshot::Sender<()>) {
        *lock(&self.switch_waiter) = Some(waiter);
    }

    pub(crate) fn take_switch_waiter(&self) -> Option<oneshot::Sender<()>> {
        lock(&self.switch_waiter).take()
    }

    pub fn client_info(&self) -> Option<ClientInformation> {
        lock(&self.client_info).clone()
    }

    pub(crate) fn set_client_info(&self, info: ClientInformation) {
        *lock(&self.client_info) = Some(info);
    }

    pub(crate) fn queue_chat(&self, text: String) {
        let mut pending = lock(&self.pending_chat);
        if pending.len() >= MAX_PENDING_CHAT {
            pending.remove(0);
            tracing::debug!(connection_id = %self.id, "Chat queue full, dropping oldest line");
        }
        pending.push(text);
    }

    pub(crate) fn take_pending_chat(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.pending_chat))
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.username() {
            Some(name) => write!(f, "[{}|{}]", name, self.peer_addr),
            None => write!(f, "[{}]", self.peer_addr),
        }
    }
}
