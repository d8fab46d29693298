//! Moving a player onto a backend.
//!
//! # Data Flow
//! ```text
//! Initial connect (after login):
//!     open backend link → backend handshake + login → membership
//!     → SetCompression / LoginSuccess to the client → LoginAcknowledged to the backend
//!
//! Server switch (client in PLAY):
//!     StartConfiguration to the client → wait for ConfigurationAck
//!     → drop old backend link → reset backend states
//!     → open backend link → backend handshake + login → LoginAcknowledged
//!     → membership
//! ```
//!
//! # Design Decisions
//! - Each connect is a [`ConnectRequest`] walking a fixed stage sequence;
//!   the first failing step ends it and runs the failure handler once
//! - Client-facing sends go through the upstream link's command queue,
//!   backend-facing ones through the new downstream's; the orchestrator
//!   itself never touches a socket
//! - Initial connect failures kick the client; switch failures only tell
//!   the player, who stays where the switch left them

use std::sync::Arc;

use thiserror::Error;

use crate::proxy::{Connection, ProxyContext};

pub mod backend;
pub mod forwarding;
mod initial;
pub mod request;
mod switch;

pub use initial::connect_initial;
pub use request::{ConnectKind, ConnectRequest, Stage};
pub use switch::switch_server;

/// Why a connect did not complete.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,

    #[error("already connected to {0}")]
    AlreadyConnected(String),

    #[error("not in game")]
    NotInPlay,

    #[error("no server named {0}")]
    UnknownServer(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The backend refused the login with this reason.
    #[error("{0}")]
    BackendRejected(String),

    #[error("backend is in online mode")]
    BackendOnlineMode,

    /// The backend link failed with this error.
    #[error("{0}")]
    Backend(String),

    #[error("backend closed the connection")]
    Closed,

    #[error("player disconnected")]
    ClientGone,

    #[error("illegal connect stage change {from:?} -> {to:?}")]
    IllegalStage { from: Stage, to: Stage },
}

/// Holds the connection's in-flight flag for as long as it lives.
pub(crate) struct ConnectingGuard<'a> {
    conn: &'a Connection,
}

impl<'a> ConnectingGuard<'a> {
    pub fn acquire(conn: &'a Connection) -> Result<Self, ConnectError> {
        if conn.try_begin_connect() {
            Ok(Self { conn })
        } else {
            Err(ConnectError::AlreadyConnecting)
        }
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.conn.end_connect();
    }
}

/// Fails fast when the client link is already gone.
pub(crate) fn ensure_client(conn: &Arc<Connection>) -> Result<(), ConnectError> {
    if conn.upstream().is_closed() {
        Err(ConnectError::ClientGone)
    } else {
        Ok(())
    }
}

/// Fetch the context's copy of a server by name.
pub(crate) fn resolve_server(
    ctx: &ProxyContext,
    name: &str,
) -> Result<Arc<crate::proxy::BackendServer>, ConnectError> {
    ctx.servers()
        .get(name)
        .ok_or_else(|| ConnectError::UnknownServer(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ConnectionId;
    use crate::proxy::{LinkHandle, Role};

    fn connection() -> Connection {
        let (upstream, _rx) = LinkHandle::channel(Role::Upstream);
        Connection::new(ConnectionId::new(), "127.0.0.1:40000".parse().unwrap(), upstream)
    }

    #[test]
    fn test_guard_is_exclusive() {
        let conn = connection();
        let guard = ConnectingGuard::acquire(&conn).unwrap();
        assert!(conn.is_connecting());
        assert!(matches!(
            ConnectingGuard::acquire(&conn),
            Err(ConnectError::AlreadyConnecting)
        ));
        drop(guard);
        assert!(!conn.is_connecting());
        assert!(ConnectingGuard::acquire(&conn).is_ok());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ConnectError::BackendRejected("You are banned".into()).to_string(),
            "You are banned"
        );
        assert_eq!(
            ConnectError::AlreadyConnected("lobby".into()).to_string(),
            "already connected to lobby"
        );
        assert!(ConnectError::Timeout("backend login").to_string().contains("backend login"));
    }
}
