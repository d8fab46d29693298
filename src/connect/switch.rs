//! Moving a player in game from one backend to another.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::connect::backend::BackendLink;
use crate::connect::request::{self, ConnectKind, ConnectRequest, ConnectSteps};
use crate::connect::{ensure_client, resolve_server, ConnectError, ConnectingGuard};
use crate::protocol::packets::StartConfiguration;
use crate::protocol::{ProtocolState, StateSlot};
use crate::proxy::{BackendServer, Connection, ProxyContext};

/// Move `conn` to the server called `target`.
///
/// Failures are reported to the player as a chat message; the client is
/// not disconnected, even if it had already left PLAY.
pub async fn switch_server(
    ctx: &Arc<ProxyContext>,
    conn: &Arc<Connection>,
    target: &str,
) -> Result<(), ConnectError> {
    let server = match resolve_server(ctx, target) {
        Ok(server) => server,
        Err(e) => return Err(refuse(conn, target, e)),
    };
    let _guard = match ConnectingGuard::acquire(conn) {
        Ok(guard) => guard,
        Err(e) => return Err(refuse(conn, server.name(), e)),
    };
    let request = ConnectRequest::new(ConnectKind::Switch, conn.id(), Arc::clone(&server));
    let mut steps = ServerSwitch {
        ctx,
        conn,
        server,
        backend: None,
    };
    request::run(request, &mut steps).await
}

/// Tell the player why the switch to `target` did not happen.
fn refuse(conn: &Connection, target: &str, error: ConnectError) -> ConnectError {
    conn.send_message(format!("Unable to connect to {target}: {error}"));
    error
}

struct ServerSwitch<'a> {
    ctx: &'a Arc<ProxyContext>,
    conn: &'a Arc<Connection>,
    server: Arc<BackendServer>,
    backend: Option<BackendLink>,
}

impl ServerSwitch<'_> {
    /// Ask the client to leave PLAY and wait for its ConfigurationAck.
    async fn reenter_configuration(&self) -> Result<(), ConnectError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.conn.install_switch_waiter(ack_tx);

        let upstream = self.conn.upstream();
        upstream.send_and_transition(
            StartConfiguration,
            vec![(StateSlot::ClientOutbound, ProtocolState::Configuration)],
        );
        if !upstream.sync().await {
            return Err(ConnectError::ClientGone);
        }

        let timeout = Duration::from_secs(self.ctx.config().timeouts.switch_ack_secs);
        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ConnectError::ClientGone),
            Err(_) => Err(ConnectError::Timeout("configuration acknowledgement")),
        }
    }
}

#[async_trait]
impl ConnectSteps for ServerSwitch<'_> {
    async fn pre_connect(&mut self, _request: &ConnectRequest) -> Result<(), ConnectError> {
        ensure_client(self.conn)?;
        if self.conn.states().get(StateSlot::ClientOutbound) != ProtocolState::Play {
            return Err(ConnectError::NotInPlay);
        }
        if let Some(current) = self.conn.server() {
            if Arc::ptr_eq(&current, &self.server) || current.name().eq_ignore_ascii_case(self.server.name()) {
                return Err(ConnectError::AlreadyConnected(current.name().to_string()));
            }
        }
        tracing::info!(
            connection_id = %self.conn.id(),
            player = %self.conn,
            from = ?self.conn.server().map(|server| server.name().to_string()),
            to = %self.server.name(),
            "Switching server"
        );
        Ok(())
    }

    async fn connect(&mut self, _request: &ConnectRequest) -> Result<(), ConnectError> {
        self.reenter_configuration().await?;

        if let Some(previous) = self.conn.take_downstream() {
            self.ctx.directory().unlink(previous.id());
            previous.close();
        }
        if let Some(previous) = self.conn.take_server() {
            previous.remove_member(self.conn.id());
        }
        self.conn.states().reset_backend();

        let backend = self.backend.insert(BackendLink::open(self.ctx, self.conn, &self.server).await?);
        backend.login(self.ctx, self.conn, &self.server).await?;
        backend.finish_login(self.conn);
        Ok(())
    }

    async fn post_connect(&mut self, _request: &ConnectRequest) -> Result<(), ConnectError> {
        self.server.add_member(self.conn.id());
        self.conn.set_server(Arc::clone(&self.server));
        // A client that left after the ack never saw this server to clean it up.
        if ensure_client(self.conn).is_err() {
            if let Some(server) = self.conn.take_server() {
                server.remove_member(self.conn.id());
            }
            self.server.remove_member(self.conn.id());
            return Err(ConnectError::ClientGone);
        }
        Ok(())
    }

    async fn on_failure(&mut self, _request: &ConnectRequest, error: &ConnectError) {
        drop(self.conn.take_switch_waiter());
        if let Some(backend) = self.backend.take() {
            backend.abort(self.ctx, self.conn);
        }
        self.conn.send_message(format!("Unable to connect to {}: {error}", self.server.name()));
    }
}
