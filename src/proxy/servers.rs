//! Backend servers and who is on them.
//!
//! # Responsibilities
//! - Resolve a server name to its address
//! - Track the connections currently on each server
//! - Swap in a new server list when the configuration file changes
//!
//! # Design Decisions
//! - The name → server map lives behind `ArcSwap`; readers never block and
//!   a reload is one atomic store
//! - A server that survives a reload unchanged keeps its `Arc`, and with it
//!   its membership set

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ProxyConfig, ServerConfig};
use crate::net::ConnectionId;

const DEFAULT_PORT: u16 = 25565;

/// One configured backend.
#[derive(Debug)]
pub struct BackendServer {
    name: String,
    address: String,
    members: DashSet<ConnectionId>,
}

impl BackendServer {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            members: DashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Host and port halves of the address, for the backend handshake.
    pub fn host_port(&self) -> (&str, u16) {
        match self.address.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host.trim_start_matches('[').trim_end_matches(']'), port),
                Err(_) => (self.address.as_str(), DEFAULT_PORT),
            },
            None => (self.address.as_str(), DEFAULT_PORT),
        }
    }

    pub(crate) fn add_member(&self, id: ConnectionId) {
        self.members.insert(id);
    }

    pub(crate) fn remove_member(&self, id: ConnectionId) {
        self.members.remove(&id);
    }

    pub fn has_member(&self, id: ConnectionId) -> bool {
        self.members.contains(&id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Name → server map, hot-reloadable.
#[derive(Debug)]
pub struct ServerRegistry {
    servers: ArcSwap<HashMap<String, Arc<BackendServer>>>,
}

impl ServerRegistry {
    pub fn from_config(servers: &[ServerConfig]) -> Self {
        let map = servers
            .iter()
            .map(|server| {
                (
                    server.name.to_lowercase(),
                    Arc::new(BackendServer::new(&server.name, &server.address)),
                )
            })
            .collect();
        Self {
            servers: ArcSwap::from_pointee(map),
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<Arc<BackendServer>> {
        self.servers.load().get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .servers
            .load()
            .values()
            .map(|server| server.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.servers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.load().is_empty()
    }

    /// Replace the server list.
    ///
    /// Players on a removed server stay connected; it is just no longer a
    /// valid connect target.
    pub fn apply(&self, servers: &[ServerConfig]) {
        let current = self.servers.load_full();
        let mut next = HashMap::with_capacity(servers.len());
        for config in servers {
            let key = config.name.to_lowercase();
            let server = match current.get(&key) {
                Some(existing) if existing.address() == config.address && existing.name() == config.name => {
                    Arc::clone(existing)
                }
                _ => {
                    tracing::info!(server = %config.name, address = %config.address, "Server registered");
                    Arc::new(BackendServer::new(&config.name, &config.address))
                }
            };
            next.insert(key, server);
        }
        for (key, server) in current.iter() {
            if !next.contains_key(key) {
                tracing::info!(server = %server.name(), players = server.member_count(), "Server unregistered");
            }
        }
        self.servers.store(Arc::new(next));
    }

    /// Apply every configuration that arrives on `updates`.
    pub fn watch(self: &Arc<Self>, mut updates: mpsc::UnboundedReceiver<ProxyConfig>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                registry.apply(&config.servers);
                tracing::info!(servers = registry.len(), "Server list reloaded");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str, address: &str) -> ServerConfig {
        ServerConfig {
            name: name.into(),
            address: address.into(),
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ServerRegistry::from_config(&[server("Lobby", "127.0.0.1:25566")]);
        assert_eq!(registry.get("lobby").unwrap().name(), "Lobby");
        assert!(registry.get("survival").is_none());
    }

    #[test]
    fn reload_keeps_unchanged_servers() {
        let registry = ServerRegistry::from_config(&[
            server("lobby", "127.0.0.1:25566"),
            server("survival", "127.0.0.1:25567"),
        ]);
        let lobby = registry.get("lobby").unwrap();
        let id = ConnectionId::new();
        lobby.add_member(id);

        registry.apply(&[
            server("lobby", "127.0.0.1:25566"),
            server("creative", "127.0.0.1:25568"),
        ]);

        let reloaded = registry.get("lobby").unwrap();
        assert!(Arc::ptr_eq(&lobby, &reloaded));
        assert!(reloaded.has_member(id));
        assert!(registry.get("survival").is_none());
        assert!(registry.get("creative").is_some());
        assert_eq!(registry.names(), vec!["creative".to_string(), "lobby".to_string()]);
    }

    #[test]
    fn changed_address_is_a_new_server() {
        let registry = ServerRegistry::from_config(&[server("lobby", "127.0.0.1:25566")]);
        let before = registry.get("lobby").unwrap();
        registry.apply(&[server("lobby", "127.0.0.1:30000")]);
        let after = registry.get("lobby").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.address(), "127.0.0.1:30000");
    }

    #[test]
    fn host_port_split() {
        assert_eq!(BackendServer::new("a", "mc.example.net:25570").host_port(), ("mc.example.net", 25570));
        assert_eq!(BackendServer::new("b", "[::1]:25565").host_port(), ("::1", 25565));
        assert_eq!(BackendServer::new("c", "mc.example.net").host_port(), ("mc.example.net", 25565));
    }

    #[tokio::test]
    async fn watch_applies_updates() {
        let registry = Arc::new(ServerRegistry::from_config(&[server("lobby", "127.0.0.1:25566")]));
        let (tx, rx) = mpsc::unbounded_channel();
        let task = registry.watch(rx);

        let mut config = ProxyConfig::default();
        config.servers = vec![server("lobby", "127.0.0.1:25566"), server("pvp", "127.0.0.1:25569")];
        tx.send(config).unwrap();
        drop(tx);
        task.await.unwrap();

        assert!(registry.get("pvp").is_some());
    }
}
