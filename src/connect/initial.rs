//! First backend after login.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connect::backend::BackendLink;
use crate::connect::request::{self, ConnectKind, ConnectRequest, ConnectSteps};
use crate::connect::{ensure_client, ConnectError, ConnectingGuard};
use crate::protocol::packets::{LoginSuccess, SetCompression};
use crate::protocol::{ProtocolState, StateSlot};
use crate::proxy::link::LinkCommand;
use crate::proxy::{BackendServer, Connection, ProxyContext};

/// Put a freshly logged-in player on `server`.
///
/// On failure the client is disconnected with the reason.
pub async fn connect_initial(
    ctx: &Arc<ProxyContext>,
    conn: &Arc<Connection>,
    server: Arc<BackendServer>,
) -> Result<(), ConnectError> {
    let _guard = match ConnectingGuard::acquire(conn) {
        Ok(guard) => guard,
        Err(e) => {
            conn.disconnect(format!("Could not connect to {}: {e}", server.name()));
            return Err(e);
        }
    };
    let request = ConnectRequest::new(ConnectKind::Initial, conn.id(), Arc::clone(&server));
    let mut steps = InitialConnect {
        ctx,
        conn,
        server,
        backend: None,
    };
    request::run(request, &mut steps).await
}

struct InitialConnect<'a> {
    ctx: &'a Arc<ProxyContext>,
    conn: &'a Arc<Connection>,
    server: Arc<BackendServer>,
    backend: Option<BackendLink>,
}

#[async_trait]
impl ConnectSteps for InitialConnect<'_> {
    async fn connect(&mut self, _request: &ConnectRequest) -> Result<(), ConnectError> {
        ensure_client(self.conn)?;
        let backend = self.backend.insert(BackendLink::open(self.ctx, self.conn, &self.server).await?);
        backend.login(self.ctx, self.conn, &self.server).await?;

        self.server.add_member(self.conn.id());
        if let Some(previous) = self.conn.set_server(Arc::clone(&self.server)) {
            previous.remove_member(self.conn.id());
        }
        Ok(())
    }

    async fn post_connect(&mut self, _request: &ConnectRequest) -> Result<(), ConnectError> {
        let upstream = self.conn.upstream();
        let profile = self.conn.profile().ok_or(ConnectError::ClientGone)?;

        let threshold = self.ctx.config().proxy.compression_threshold;
        if let Ok(enabled) = usize::try_from(threshold) {
            upstream.send_packet(SetCompression { threshold });
            upstream.send(LinkCommand::EnableCompression(enabled));
        }
        upstream.send_and_transition(
            LoginSuccess {
                uuid: profile.id,
                username: profile.name.clone(),
                properties: profile.properties.clone(),
            },
            vec![(StateSlot::ClientOutbound, ProtocolState::Configuration)],
        );

        // After the client-side commands: the backend's CONFIGURATION
        // traffic must not reach the upstream queue ahead of LoginSuccess.
        let backend = self.backend.as_ref().ok_or(ConnectError::Closed)?;
        backend.finish_login(self.conn);

        if upstream.sync().await {
            Ok(())
        } else {
            Err(ConnectError::ClientGone)
        }
    }

    async fn on_failure(&mut self, _request: &ConnectRequest, error: &ConnectError) {
        if let Some(backend) = self.backend.take() {
            backend.abort(self.ctx, self.conn);
        }
        if let Some(server) = self.conn.take_server() {
            server.remove_member(self.conn.id());
        }
        self.conn
            .disconnect(format!("Could not connect to {}: {error}", self.server.name()));
    }
}
