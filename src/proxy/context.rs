//! Process-wide state handed to every link and orchestrator step.

use std::sync::Arc;

use crate::auth::{AuthError, ServerKeys, SessionService, SessionVerifier};
use crate::config::ProxyConfig;
use crate::net::ConnectionTracker;
use crate::protocol::PacketRegistry;
use crate::proxy::{Directory, PacketListener, ServerRegistry};

/// Everything shared across connections.
///
/// Created once at startup. The registry and keys are read-only from then
/// on; the directory and server registry are the only shared mutable parts.
pub struct ProxyContext {
    config: Arc<ProxyConfig>,
    registry: Arc<PacketRegistry>,
    keys: Option<Arc<ServerKeys>>,
    verifier: Arc<dyn SessionVerifier>,
    directory: Directory,
    servers: Arc<ServerRegistry>,
    listeners: Vec<Arc<dyn PacketListener>>,
    tracker: ConnectionTracker,
}

impl ProxyContext {
    pub fn builder(config: ProxyConfig) -> ProxyContextBuilder {
        ProxyContextBuilder {
            config,
            registry: None,
            keys: None,
            verifier: None,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    /// Present whenever online mode is on.
    pub fn keys(&self) -> Option<&Arc<ServerKeys>> {
        self.keys.as_ref()
    }

    pub fn verifier(&self) -> &Arc<dyn SessionVerifier> {
        &self.verifier
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn servers(&self) -> &Arc<ServerRegistry> {
        &self.servers
    }

    pub fn listeners(&self) -> &[Arc<dyn PacketListener>] {
        &self.listeners
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }
}

impl std::fmt::Debug for ProxyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyContext")
            .field("online_mode", &self.config.proxy.online_mode)
            .field("registered_packets", &self.registry.len())
            .field("connections", &self.directory.len())
            .field("servers", &self.servers.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ProxyContext`]; anything not supplied gets its default.
pub struct ProxyContextBuilder {
    config: ProxyConfig,
    registry: Option<PacketRegistry>,
    keys: Option<Arc<ServerKeys>>,
    verifier: Option<Arc<dyn SessionVerifier>>,
    listeners: Vec<Arc<dyn PacketListener>>,
}

impl ProxyContextBuilder {
    pub fn registry(mut self, registry: PacketRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn keys(mut self, keys: Arc<ServerKeys>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn SessionVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn PacketListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Generates the RSA keypair if online mode needs one and none was given.
    pub fn build(self) -> Result<Arc<ProxyContext>, AuthError> {
        let keys = match (self.keys, self.config.proxy.online_mode) {
            (Some(keys), _) => Some(keys),
            (None, true) => Some(Arc::new(ServerKeys::generate()?)),
            (None, false) => None,
        };
        let verifier = match self.verifier {
            Some(verifier) => verifier,
            None => Arc::new(SessionService::new(&self.config.auth)?),
        };
        let servers = Arc::new(ServerRegistry::from_config(&self.config.servers));

        Ok(Arc::new(ProxyContext {
            config: Arc::new(self.config),
            registry: Arc::new(self.registry.unwrap_or_else(PacketRegistry::standard)),
            keys,
            verifier,
            directory: Directory::new(),
            servers,
            listeners: self.listeners,
            tracker: ConnectionTracker::new(),
        }))
    }
}
