//! The connect state machine.
//!
//! ```text
//! Pending → PreConnect → Connect → PostConnect → Succeeded
//!    └──────────┴───────────┴──────────┴───────→ Failed
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::connect::ConnectError;
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::proxy::BackendServer;

/// Where a connect request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    PreConnect,
    Connect,
    PostConnect,
    Succeeded,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }

    fn can_advance_to(self, next: Stage) -> bool {
        match (self, next) {
            (Stage::Pending, Stage::PreConnect)
            | (Stage::PreConnect, Stage::Connect)
            | (Stage::Connect, Stage::PostConnect)
            | (Stage::PostConnect, Stage::Succeeded) => true,
            (from, Stage::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    /// Right after login; failure kicks the client.
    Initial,
    /// From one backend to another while in game.
    Switch,
}

impl ConnectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectKind::Initial => "initial",
            ConnectKind::Switch => "switch",
        }
    }
}

/// One in-flight attempt to put a connection on a backend.
#[derive(Debug)]
pub struct ConnectRequest {
    kind: ConnectKind,
    connection_id: ConnectionId,
    target: Arc<BackendServer>,
    stage: Stage,
    started: Instant,
}

impl ConnectRequest {
    pub fn new(kind: ConnectKind, connection_id: ConnectionId, target: Arc<BackendServer>) -> Self {
        Self {
            kind,
            connection_id,
            target,
            stage: Stage::Pending,
            started: Instant::now(),
        }
    }

    pub fn kind(&self) -> ConnectKind {
        self.kind
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn target(&self) -> &Arc<BackendServer> {
        &self.target
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn advance(&mut self, next: Stage) -> Result<(), ConnectError> {
        if !self.stage.can_advance_to(next) {
            return Err(ConnectError::IllegalStage { from: self.stage, to: next });
        }
        tracing::trace!(connection_id = %self.connection_id, from = ?self.stage, to = ?next, "Connect stage");
        self.stage = next;
        Ok(())
    }

    /// Mark the request failed. Returns `false` if it already ended.
    pub fn fail(&mut self) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        self.stage = Stage::Failed;
        true
    }
}

/// The steps of one kind of connect.
#[async_trait]
pub(crate) trait ConnectSteps: Send {
    async fn pre_connect(&mut self, _request: &ConnectRequest) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn connect(&mut self, request: &ConnectRequest) -> Result<(), ConnectError>;

    async fn post_connect(&mut self, _request: &ConnectRequest) -> Result<(), ConnectError> {
        Ok(())
    }

    /// Runs once, after the first failing step.
    async fn on_failure(&mut self, request: &ConnectRequest, error: &ConnectError);
}

/// Walk `request` through `steps`, stopping at the first failure.
pub(crate) async fn run<S: ConnectSteps>(mut request: ConnectRequest, steps: &mut S) -> Result<(), ConnectError> {
    match drive(&mut request, steps).await {
        Ok(()) => {
            metrics::record_connect(request.kind.as_str(), "success");
            tracing::info!(
                connection_id = %request.connection_id,
                server = %request.target.name(),
                kind = request.kind.as_str(),
                elapsed_ms = request.elapsed().as_millis() as u64,
                "Connected to backend"
            );
            Ok(())
        }
        Err(error) => {
            if request.fail() {
                metrics::record_connect(request.kind.as_str(), "failure");
                tracing::warn!(
                    connection_id = %request.connection_id,
                    server = %request.target.name(),
                    kind = request.kind.as_str(),
                    error = %error,
                    "Connect failed"
                );
                steps.on_failure(&request, &error).await;
            }
            Err(error)
        }
    }
}

async fn drive<S: ConnectSteps>(request: &mut ConnectRequest, steps: &mut S) -> Result<(), ConnectError> {
    request.advance(Stage::PreConnect)?;
    steps.pre_connect(request).await?;
    request.advance(Stage::Connect)?;
    steps.connect(request).await?;
    request.advance(Stage::PostConnect)?;
    steps.post_connect(request).await?;
    request.advance(Stage::Succeeded)
}
