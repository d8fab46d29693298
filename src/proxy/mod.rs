//! The proxy proper: links, connections and the packet handling on each side.
//!
//! # Data Flow
//! ```text
//! client socket ─▶ upstream Link task ──decode (client-inbound state)──▶ UpstreamHandler
//!                        ▲                                                   │ forward
//!                        │ LinkCommand::Forward (clientbound)                 ▼
//!                 DownstreamHandler ◀──decode (backend-inbound state)── downstream Link task ◀─ backend socket
//! ```
//!
//! # Design Decisions
//! - One tokio task per physical link owns its socket, pipeline and
//!   outbound buffer. Nothing else touches them; other tasks post
//!   [`LinkCommand`]s
//! - Each of the four protocol states is written only by the task owning
//!   that direction, or by a command executed on that task
//! - Forwarded packets carry the state they were decoded in; the receiving
//!   link drops them if its outbound state has moved on
//! - Packet listeners see every packet the proxy would forward and may
//!   consume it

use std::sync::Arc;

use thiserror::Error;

use crate::auth::AuthError;
use crate::pipeline::PipelineError;
use crate::protocol::{CodecError, Packet, StateError};

pub mod connection;
pub mod context;
pub mod directory;
pub mod downstream;
pub mod link;
pub mod server;
pub mod servers;
pub mod upstream;

pub use connection::Connection;
pub use context::{ProxyContext, ProxyContextBuilder};
pub use directory::{Directory, DirectoryError};
pub use link::{LinkCommand, LinkHandle, Role};
pub use server::ProxyServer;
pub use servers::{BackendServer, ServerRegistry};

/// What a packet listener wants done with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleResult {
    /// Let the proxy forward it.
    Forward,
    /// Swallow it.
    Consume,
}

/// Hook for code outside the core that wants to see relayed packets.
///
/// Listeners run on the link task that decoded the packet and must not
/// block. Spawn anything slow, such as a server switch.
pub trait PacketListener: Send + Sync {
    /// A packet from the client about to go to the backend.
    fn on_serverbound(
        &self,
        _ctx: &Arc<ProxyContext>,
        _connection: &Arc<Connection>,
        _packet: &Packet,
    ) -> HandleResult {
        HandleResult::Forward
    }

    /// A packet from the backend about to go to the client.
    fn on_clientbound(
        &self,
        _ctx: &Arc<ProxyContext>,
        _connection: &Arc<Connection>,
        _packet: &Packet,
    ) -> HandleResult {
        HandleResult::Forward
    }
}

/// Errors that end a physical link.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed inbound data.
    #[error("bad packet: {0}")]
    Codec(#[from] CodecError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A message could not be encoded for the current outbound state.
    #[error("failed to encode outbound packet: {0}")]
    Encode(CodecError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("failed to serialize status: {0}")]
    Json(#[from] serde_json::Error),

    /// A well-formed packet arrived where it makes no sense.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    #[error("online mode is enabled but no server keys are loaded")]
    MissingKeys,

    /// The peer fell too far behind the traffic queued for it.
    #[error("too much traffic queued for this connection")]
    Overrun,
}

impl ProxyError {
    /// Whether the peer may still be told why it is being dropped.
    pub fn allows_disconnect_message(&self) -> bool {
        !matches!(self, ProxyError::Io(_) | ProxyError::Encode(_))
    }
}
