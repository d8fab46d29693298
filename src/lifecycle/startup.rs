//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order from a validated config
//! - Start background tasks (metrics endpoint, server list reload)
//! - Bind the listener last
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::auth::AuthError;
use crate::config::watcher::ConfigWatcher;
use crate::config::{ConfigError, ProxyConfig};
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;
use crate::proxy::{ProxyContext, ProxyContextBuilder, ProxyServer};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("failed to prepare authentication: {0}")]
    Auth(#[from] AuthError),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("invalid metrics address {0}")]
    MetricsAddress(String),

    #[error("failed to watch config file: {0}")]
    Watcher(#[from] notify::Error),
}

/// A bound proxy that has not started accepting yet.
pub struct Running {
    server: ProxyServer,
    _watcher: Option<RecommendedWatcher>,
}

impl Running {
    pub fn context(&self) -> &Arc<ProxyContext> {
        self.server.context()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.server.local_addr()
    }

    /// Accept players until `shutdown` fires, then drain.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) -> Result<(), ListenerError> {
        let Running { server, _watcher: watcher } = self;
        let result = server.run(shutdown).await;
        drop(watcher);
        result
    }
}

/// Bring the proxy up from `config`.
///
/// `watch` names the config file to follow for server list changes.
pub async fn start(config: ProxyConfig, watch: Option<&Path>) -> Result<Running, StartupError> {
    start_with(ProxyContext::builder(config), watch).await
}

/// Like [`start`], with a preconfigured context builder.
pub async fn start_with(builder: ProxyContextBuilder, watch: Option<&Path>) -> Result<Running, StartupError> {
    let ctx = builder.build()?;
    let config = ctx.config();

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let watcher = match watch {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            ctx.servers().watch(updates);
            Some(handle)
        }
        None => None,
    };

    let listener = Listener::bind(&config.listener).await?;
    tracing::info!(
        online_mode = config.proxy.online_mode,
        default_server = %config.proxy.default_server,
        forwarding = ?config.proxy.forwarding,
        "Proxy initialized"
    );

    Ok(Running {
        server: ProxyServer::new(Arc::clone(&ctx), listener),
        _watcher: watcher,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.proxy.online_mode = false;
        config
    }

    #[tokio::test]
    async fn test_start_binds_listener() {
        let running = start(offline_config(), None).await.unwrap();
        let addr = running.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(running.context().keys().is_none());
    }

    #[tokio::test]
    async fn test_bad_bind_address_is_fatal() {
        let mut config = offline_config();
        config.listener.bind_address = "not an address".into();
        assert!(matches!(
            start(config, None).await,
            Err(StartupError::Listener(_))
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let running = start(offline_config(), None).await.unwrap();
        let shutdown = crate::lifecycle::Shutdown::new();
        let rx = shutdown.subscribe();
        shutdown.trigger();
        running.run(rx).await.unwrap();
    }
}
